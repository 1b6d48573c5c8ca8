//! 流水线配置
//!
//! 所有阈值/上限集中在一个显式结构里，带文档化默认值，
//! 算法本身保持可测试、可调参。

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("采样间隔必须大于 0，当前 {0}")]
    BadInterval(f64),
    #[error("阈值 {name} 必须在 [0,1] 内，当前 {value}")]
    BadThreshold { name: &'static str, value: f32 },
    #[error("{name} 必须大于 0")]
    BadLimit { name: &'static str },
    #[error("识别服务地址为空")]
    EmptyEndpoint,
    #[error("缺少组件: {0}")]
    MissingComponent(&'static str),
}

/// 媒体接收限制
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// 压缩包解压后累计大小上限（字节）
    pub max_archive_bytes: u64,
    /// 压缩包内可识别条目数量上限
    pub max_archive_entries: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_archive_bytes: 512 * 1024 * 1024,
            max_archive_entries: 100,
        }
    }
}

/// 视频采样配置
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// 固定采样间隔（秒）
    pub interval_secs: f64,
    /// 每个任务的采样帧数上限，约束下游分类/识别成本
    pub max_frames: usize,
    /// 相邻采样帧的感知差异阈值，低于该值按近重复丢弃
    pub diff_threshold: f32,
    /// 整个提取阶段的墙钟超时
    pub timeout: Duration,
    /// 高于该高度的帧先等比缩小再进入流水线
    pub max_height: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            max_frames: 150,
            diff_threshold: 0.10,
            timeout: Duration::from_secs(120),
            max_height: 720,
        }
    }
}

impl SamplerConfig {
    /// 快闪内容（story 连播）：采样更密，容忍更小的画面差异
    pub fn for_stories() -> Self {
        Self {
            interval_secs: 1.0,
            diff_threshold: 0.08,
            ..Default::default()
        }
    }

    /// 长录屏：采样更稀，去重更激进
    pub fn for_long_recordings() -> Self {
        Self {
            interval_secs: 3.0,
            diff_threshold: 0.15,
            max_frames: 200,
            ..Default::default()
        }
    }
}

/// 两级帧分类配置
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// 平均亮度低于该值（0-255）直接拒绝，不进模型
    pub darkness_threshold: u8,
    /// 灰度标准差低于该值视为过度均匀（纯色/遮挡），直接拒绝
    pub min_std_dev: f32,
    /// 模型输出概率的接受阈值
    pub accept_threshold: f32,
    /// 模型固定输入尺寸
    pub model_width: u32,
    pub model_height: u32,
    /// 平均亮度低于该值的存活帧，送模型前先做对比度拉伸
    pub dim_boost_below: u8,
    /// 分类推理工作线程数，0 表示按 CPU 数取
    pub workers: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            darkness_threshold: 80,
            min_std_dev: 6.0,
            accept_threshold: 0.65,
            model_width: 224,
            model_height: 224,
            dim_boost_below: 110,
            workers: 0,
        }
    }
}

/// 外部识别服务配置
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// 单次请求超时
    pub request_timeout: Duration,
    /// 瞬时失败的最大重试次数
    pub max_retries: u32,
    /// 指数退避的基础等待
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// 全进程共享的出站并发上限，需尊重服务端限流
    pub max_concurrent_requests: usize,
    /// 发送帧图像的 JPEG 压缩质量
    pub jpeg_quality: u8,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            request_timeout: Duration::from_secs(60),
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_concurrent_requests: 4,
            jpeg_quality: 80,
        }
    }
}

/// 任务调度配置
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// 并发运行的任务数上限，0 表示按 CPU 数取
    pub max_concurrent_jobs: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub sampler: SamplerConfig,
    pub classifier: ClassifierConfig,
    pub recognition: RecognitionConfig,
    pub jobs: JobConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler.interval_secs <= 0.0 {
            return Err(ConfigError::BadInterval(self.sampler.interval_secs));
        }
        for (name, value) in [
            ("diff_threshold", self.sampler.diff_threshold),
            ("accept_threshold", self.classifier.accept_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::BadThreshold { name, value });
            }
        }
        if self.sampler.max_frames == 0 {
            return Err(ConfigError::BadLimit { name: "max_frames" });
        }
        if self.ingest.max_archive_bytes == 0 {
            return Err(ConfigError::BadLimit {
                name: "max_archive_bytes",
            });
        }
        if self.recognition.max_retries == 0 {
            return Err(ConfigError::BadLimit {
                name: "max_retries",
            });
        }
        if self.recognition.max_concurrent_requests == 0 {
            return Err(ConfigError::BadLimit {
                name: "max_concurrent_requests",
            });
        }
        Ok(())
    }

    /// 把 0（自动）解析成实际线程数
    pub fn effective_job_workers(&self) -> usize {
        match self.jobs.max_concurrent_jobs {
            0 => num_cpus::get().clamp(1, 4),
            n => n,
        }
    }

    pub fn effective_classify_workers(&self) -> usize {
        match self.classifier.workers {
            0 => num_cpus::get().min(4),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_interval_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.sampler.interval_secs = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadInterval(_))
        ));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.classifier.accept_threshold = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadThreshold { name: "accept_threshold", .. })
        ));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.recognition.max_retries = 0;
        assert!(cfg.validate().is_err());
    }
}
