use std::time::Duration;

use crate::core::video::source::RawFrame;

/// 帧来源：静态截图或视频采样
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Static,
    Sampled,
}

/// 进入流水线的帧
///
/// `index` 在任务内连续递增，插入顺序即时间顺序；
/// `score` 在分类前为 None。
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u32,
    pub media_id: String,
    pub source: SourceKind,
    /// 相对媒体起点的偏移，静态图为 0
    pub timestamp: Duration,
    pub width: u32,
    pub height: u32,
    /// RGBA 像素
    pub data: Vec<u8>,
    pub score: Option<f32>,
    pub accepted: bool,
}

impl Frame {
    pub fn from_raw(index: u32, media_id: &str, source: SourceKind, raw: RawFrame) -> Self {
        Self {
            index,
            media_id: media_id.to_string(),
            source,
            timestamp: Duration::from_millis(raw.timestamp_ms),
            width: raw.width,
            height: raw.height,
            data: raw.data,
            score: None,
            accepted: false,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// 等比缩放到目标尺寸
    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Frame {
        // 像素长度在构造来源处保证与宽高一致
        let Some(img) = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
        else {
            return self.clone();
        };
        let resized = image::imageops::resize(
            &img,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );
        Frame {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
            ..self.clone()
        }
    }

    /// 压缩成 JPEG，供识别服务与对象存储使用
    pub fn to_jpeg(&self, quality: u8) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for chunk in self.data.chunks_exact(4) {
            rgb.extend_from_slice(&chunk[..3]);
        }
        let Some(img) = image::RgbImage::from_raw(self.width, self.height, rgb) else {
            return Vec::new();
        };
        let mut buffer = std::io::Cursor::new(Vec::new());
        if img
            .write_to(&mut buffer, image::ImageOutputFormat::Jpeg(quality))
            .is_ok()
        {
            buffer.into_inner()
        } else {
            Vec::new()
        }
    }
}

/// RGBA 转灰度，顺带返回平均亮度
pub fn rgba_to_luma(data: &[u8]) -> (Vec<u8>, u8) {
    let mut sum = 0u64;
    let gray: Vec<u8> = data
        .chunks_exact(4)
        .map(|rgba| {
            let val =
                (rgba[0] as u32 * 299 + rgba[1] as u32 * 587 + rgba[2] as u32 * 114) / 1000;
            sum += val as u64;
            val as u8
        })
        .collect();
    let mean = if gray.is_empty() {
        0
    } else {
        (sum / gray.len() as u64) as u8
    };
    (gray, mean)
}
