//! 帧来源抽象 - 视频解码由宿主层提供，流水线只消费按序帧

use thiserror::Error;

use crate::models::MediaPayload;

/// 单帧读取失败，调用方跳过继续
#[derive(Debug, Error)]
#[error("读帧失败: {0}")]
pub struct FrameReadError(pub String);

/// 提取阶段的致命错误
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("帧提取超时: 已运行 {elapsed_ms} ms，上限 {limit_ms} ms")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },
    #[error("视频源打开失败: {0}")]
    OpenSource(String),
}

/// 宿主解码层产出的原始帧
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA 像素
    pub data: Vec<u8>,
    pub timestamp_ms: u64,
}

/// 按时间顺序产出解码帧；读完返回 Ok(None)
pub trait VideoSource: Send {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, FrameReadError>;
}

/// 把媒体载体打开成帧序列的宿主回调
pub trait MediaOpener: Send + Sync {
    fn open_video(
        &self,
        media_id: &str,
        payload: &MediaPayload,
    ) -> Result<Box<dyn VideoSource>, ExtractError>;
}

/// 未接入宿主解码层时的占位实现：任何视频媒体都无法打开
pub struct NoVideoOpener;

impl MediaOpener for NoVideoOpener {
    fn open_video(
        &self,
        media_id: &str,
        _payload: &MediaPayload,
    ) -> Result<Box<dyn VideoSource>, ExtractError> {
        Err(ExtractError::OpenSource(format!(
            "宿主未提供视频解码器，无法打开 {}",
            media_id
        )))
    }
}

/// 静态截图解码成单帧
pub fn decode_static_image(bytes: &[u8]) -> Result<RawFrame, FrameReadError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| FrameReadError(format!("图片解码失败: {}", e)))?;
    let rgba = img.to_rgba8();
    Ok(RawFrame {
        width: rgba.width(),
        height: rgba.height(),
        data: rgba.into_raw(),
        timestamp_ms: 0,
    })
}

/// 预先编排好的帧序列，用于测试与离线回放
pub struct ScriptedVideoSource {
    frames: std::vec::IntoIter<Result<RawFrame, FrameReadError>>,
}

impl ScriptedVideoSource {
    pub fn new(frames: Vec<Result<RawFrame, FrameReadError>>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }

    /// 全部可读帧的便捷构造
    pub fn from_frames(frames: Vec<RawFrame>) -> Self {
        Self::new(frames.into_iter().map(Ok).collect())
    }
}

impl VideoSource for ScriptedVideoSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, FrameReadError> {
        match self.frames.next() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
