//! 指标提取 - 外部识别服务
//!
//! 每个接受帧向识别服务发一次请求，响应是稀疏的
//! 字段 → {原始文本, 置信度} 映射，允许任意子集缺失。
//! 瞬时失败指数退避重试；重试耗尽只隔离该帧，不拖垮任务。

pub mod client;
pub mod extractor;
pub mod numeric;

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::models::{MetricField, PanelMeta};

pub use client::HttpRecognition;
pub use extractor::{backoff_delay, ExtractionOutcome, MetricExtractor};

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("服务端限流 (429)")]
    RateLimited,
    #[error("服务端状态码 {0}")]
    Status(u16),
    #[error("响应解析失败: {0}")]
    Payload(String),
    #[error("响应为空")]
    Empty,
}

impl RecognitionError {
    /// 瞬时失败（超时、连接、限流、5xx、坏响应）可重试；
    /// 明确的客户端错误不重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            RecognitionError::Http(_) => true,
            RecognitionError::RateLimited => true,
            RecognitionError::Status(code) => *code >= 500,
            RecognitionError::Payload(_) => true,
            RecognitionError::Empty => true,
        }
    }
}

/// 服务对单个字段的观察
#[derive(Debug, Clone)]
pub struct FieldObservation {
    pub raw_value: String,
    pub confidence: f32,
}

/// 单帧的完整识别结果
#[derive(Debug, Clone, Default)]
pub struct PanelReading {
    pub fields: BTreeMap<MetricField, FieldObservation>,
    pub meta: Option<PanelMeta>,
}

impl PanelReading {
    /// 测试/示例用的单字段构造
    pub fn single(field: MetricField, raw: &str, confidence: f32) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            field,
            FieldObservation {
                raw_value: raw.to_string(),
                confidence,
            },
        );
        Self { fields, meta: None }
    }
}

/// 识别服务边界
pub trait RecognitionService: Send + Sync {
    fn recognize(
        &self,
        image_jpeg: &[u8],
        target_fields: &[MetricField],
        locale_hint: Option<&str>,
    ) -> Result<PanelReading, RecognitionError>;
}

/// 按请求图像内容打分的测试服务
pub struct MockRecognition {
    handler: Box<
        dyn Fn(&[u8]) -> Result<PanelReading, RecognitionError> + Send + Sync,
    >,
}

impl MockRecognition {
    pub fn with_fn<F>(handler: F) -> Self
    where
        F: Fn(&[u8]) -> Result<PanelReading, RecognitionError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }

    pub fn always(reading: PanelReading) -> Self {
        Self::with_fn(move |_| Ok(reading.clone()))
    }
}

impl RecognitionService for MockRecognition {
    fn recognize(
        &self,
        image_jpeg: &[u8],
        _target_fields: &[MetricField],
        _locale_hint: Option<&str>,
    ) -> Result<PanelReading, RecognitionError> {
        (self.handler)(image_jpeg)
    }
}

/// 全进程共享的出站并发闸门，首次取用时按配置建池
static OUTBOUND_POOL: OnceCell<rayon::ThreadPool> = OnceCell::new();

pub fn outbound_pool(cap: usize) -> &'static rayon::ThreadPool {
    OUTBOUND_POOL.get_or_init(|| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cap.max(1))
            .thread_name(|i| format!("recognition-{}", i))
            .build()
            .expect("识别线程池构建失败")
    })
}
