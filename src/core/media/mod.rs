//! 媒体接收与规范化
//!
//! 一次上传（单图、视频或压缩包）规范化成有序的帧来源序列。
//! 压缩包只展开一层，逐条目对照允许清单，解压累计大小设上限；
//! 任何限制被触发都在提取开始前失败。

use std::io::{Cursor, Read};

use log::info;
use thiserror::Error;

use crate::core::config::IngestConfig;
use crate::models::{MediaKind, MediaPayload, MediaSource};

const IMAGE_EXTS: [&str; 3] = ["jpg", "jpeg", "png"];
const VIDEO_EXTS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];
const ARCHIVE_EXTS: [&str; 1] = ["zip"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("不支持的媒体: {0}")]
    Unsupported(String),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 规范化后的单个帧来源
#[derive(Debug)]
pub struct MediaEntry {
    pub media_id: String,
    pub kind: EntryKind,
}

#[derive(Debug)]
pub enum EntryKind {
    /// 静态截图，待解码
    Image(Vec<u8>),
    /// 视频载体，交给帧采样阶段打开
    Video(MediaPayload),
}

/// 按扩展名判断媒体类型
pub fn kind_from_filename(name: &str) -> Option<MediaKind> {
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    if IMAGE_EXTS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else if ARCHIVE_EXTS.contains(&ext.as_str()) {
        Some(MediaKind::Archive)
    } else {
        None
    }
}

pub struct Ingestor {
    cfg: IngestConfig,
}

impl Ingestor {
    pub fn new(cfg: &IngestConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    pub fn ingest(&self, source: &MediaSource) -> Result<Vec<MediaEntry>, IngestError> {
        match source.kind {
            MediaKind::Image => {
                let bytes = load_bytes(&source.payload)?;
                Ok(vec![MediaEntry {
                    media_id: source.media_id.clone(),
                    kind: EntryKind::Image(bytes),
                }])
            }
            // 视频不在这里落帧，整体交给帧采样阶段
            MediaKind::Video => Ok(vec![MediaEntry {
                media_id: source.media_id.clone(),
                kind: EntryKind::Video(source.payload.clone()),
            }]),
            MediaKind::Archive => {
                let bytes = load_bytes(&source.payload)?;
                self.expand_archive(&source.media_id, &bytes)
            }
        }
    }

    /// 压缩包只展开一层；先按条目元信息做结构预检，再读取内容
    fn expand_archive(
        &self,
        parent_id: &str,
        bytes: &[u8],
    ) -> Result<Vec<MediaEntry>, IngestError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| IngestError::Unsupported(format!("压缩包无法读取: {}", e)))?;

        let mut declared_total: u64 = 0;
        let mut recognized: Vec<(usize, String, MediaKind)> = Vec::new();

        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| IngestError::Unsupported(format!("压缩包条目损坏: {}", e)))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if name.starts_with("__MACOSX") {
                continue;
            }

            match kind_from_filename(&name) {
                Some(MediaKind::Archive) => {
                    return Err(IngestError::Unsupported(format!(
                        "不允许嵌套压缩包: {}",
                        name
                    )));
                }
                Some(kind) => {
                    declared_total += entry.size();
                    if declared_total > self.cfg.max_archive_bytes {
                        return Err(IngestError::Unsupported(format!(
                            "解压累计大小超过上限 {} 字节",
                            self.cfg.max_archive_bytes
                        )));
                    }
                    recognized.push((i, name, kind));
                    if recognized.len() > self.cfg.max_archive_entries {
                        return Err(IngestError::Unsupported(format!(
                            "条目数量超过上限 {}",
                            self.cfg.max_archive_entries
                        )));
                    }
                }
                // 清单外的杂项文件忽略
                None => continue,
            }
        }

        if recognized.is_empty() {
            return Err(IngestError::Unsupported(
                "压缩包内没有可识别的图片或视频".into(),
            ));
        }

        let mut entries = Vec::with_capacity(recognized.len());
        let mut consumed: u64 = 0;
        for (i, name, kind) in recognized {
            let entry = archive
                .by_index(i)
                .map_err(|e| IngestError::Unsupported(format!("压缩包条目损坏: {}", e)))?;
            let mut buf = Vec::new();
            // 条目头可能谎报大小，读取时再卡一次预算
            let budget = self.cfg.max_archive_bytes - consumed;
            entry.take(budget + 1).read_to_end(&mut buf)?;
            consumed += buf.len() as u64;
            if consumed > self.cfg.max_archive_bytes {
                return Err(IngestError::Unsupported(format!(
                    "解压累计大小超过上限 {} 字节",
                    self.cfg.max_archive_bytes
                )));
            }

            let media_id = format!("{}/{}", parent_id, name);
            let kind = match kind {
                MediaKind::Image => EntryKind::Image(buf),
                _ => EntryKind::Video(MediaPayload::Bytes(buf)),
            };
            entries.push(MediaEntry { media_id, kind });
        }

        info!("📦 压缩包展开: {} 个可识别条目", entries.len());
        Ok(entries)
    }
}

fn load_bytes(payload: &MediaPayload) -> Result<Vec<u8>, IngestError> {
    match payload {
        MediaPayload::Bytes(b) => Ok(b.clone()),
        MediaPayload::File(path) => Ok(std::fs::read(path)?),
    }
}
