//! 视频帧采样 - 从录屏/视频中按固定间隔抽取候选帧
//!
//! 核心策略：
//! 1. 固定时间间隔采样，帧数设上限，约束下游成本
//! 2. 帧差预筛 - DCT pHash + 直方图过滤近重复帧
//! 3. 单帧读取失败跳过继续，整个阶段受墙钟超时约束
//! 4. 解码由宿主层负责，流水线只消费按序帧

pub mod diff_filter;
pub mod frame;
pub mod phash;
pub mod sampler;
pub mod source;

pub use diff_filter::FrameDiffFilter;
pub use frame::{rgba_to_luma, Frame, SourceKind};
pub use sampler::{FrameSampler, SampleStats};
pub use source::{
    decode_static_image, ExtractError, FrameReadError, MediaOpener, NoVideoOpener, RawFrame,
    ScriptedVideoSource, VideoSource,
};
