use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::metrics::{AggregatedMetrics, MetricField};

/// 任务生命周期状态
///
/// 正常流向单向推进：
/// `Queued → Extracting → Classifying → ExtractingMetrics → Aggregating → Completed`
/// `Partial` 是"完成但降级"的终态；`Failed` 可从任意非终态到达，
/// `Cancelled` 可从任意进行中状态到达。终态一经进入不再变化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Extracting,
    Classifying,
    ExtractingMetrics,
    Aggregating,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// 状态机唯一的合法迁移判定
    pub fn can_transition(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Failed | Cancelled => true,
            Extracting => self == Queued,
            Classifying => self == Extracting,
            ExtractingMetrics => self == Classifying,
            Aggregating => self == ExtractingMetrics,
            Completed | Partial => self == Aggregating,
            Queued => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Extracting => "extracting",
            JobStatus::Classifying => "classifying",
            JobStatus::ExtractingMetrics => "extracting_metrics",
            JobStatus::Aggregating => "aggregating",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 上传时声明的媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Archive,
}

/// 媒体内容载体：内存字节或磁盘路径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MediaPayload {
    Bytes(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSource {
    pub media_id: String,
    pub kind: MediaKind,
    pub payload: MediaPayload,
}

/// 投放活动元信息，随任务一起持久化
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignMeta {
    pub campaign_name: String,
    pub product_name: String,
    pub company: String,
    /// ISO 日期字符串（YYYY-MM-DD）
    pub campaign_date: String,
    /// 截图大概率使用的数字/排版习惯，如 "fa" / "en"
    pub locale_hint: Option<String>,
}

/// 阶段级致命错误的分类，直接映射到 Failed 终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedMedia,
    ExtractionTimeout,
    ModelUnavailable,
    /// 分类后没有任何可用帧
    NoUsableFrames,
    /// 聚合后没有任何可用字段
    NoMetricsRecovered,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedMedia => "unsupported_media",
            FailureKind::ExtractionTimeout => "extraction_timeout",
            FailureKind::ModelUnavailable => "model_unavailable",
            FailureKind::NoUsableFrames => "no_usable_frames",
            FailureKind::NoMetricsRecovered => "no_metrics_recovered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// 一次分析任务。状态只能由任务状态机改写。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub campaign: CampaignMeta,
    pub status: JobStatus,
    pub media: Vec<MediaSource>,
    pub metrics: Option<AggregatedMetrics>,
    pub failure: Option<JobFailure>,
}

impl Job {
    pub fn new(id: String, campaign: CampaignMeta, media: Vec<MediaSource>) -> Self {
        Self {
            id,
            campaign,
            status: JobStatus::Queued,
            media,
            metrics: None,
            failure: None,
        }
    }
}

/// 对外可见的任务状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub status: JobStatus,
    pub error_kind: Option<String>,
    pub available_fields: Vec<MetricField>,
    pub missing_fields: Vec<MetricField>,
}

impl JobReport {
    pub fn from_job(job: &Job) -> Self {
        let (available, missing) = match &job.metrics {
            Some(m) => (m.available_fields(), m.missing_fields()),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            status: job.status,
            error_kind: job.failure.as_ref().map(|f| f.kind.as_str().to_string()),
            available_fields: available,
            missing_fields: missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use JobStatus::*;
        let chain = [
            Queued,
            Extracting,
            Classifying,
            ExtractingMetrics,
            Aggregating,
            Completed,
        ];
        for pair in chain.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_stage_skipping() {
        assert!(!JobStatus::Queued.can_transition(JobStatus::Classifying));
        assert!(!JobStatus::Extracting.can_transition(JobStatus::Aggregating));
        assert!(!JobStatus::Classifying.can_transition(JobStatus::Completed));
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal() {
        use JobStatus::*;
        for s in [Queued, Extracting, Classifying, ExtractingMetrics, Aggregating] {
            assert!(s.can_transition(Failed));
            assert!(s.can_transition(Cancelled));
        }
    }

    #[test]
    fn test_terminal_states_frozen() {
        use JobStatus::*;
        for terminal in [Completed, Partial, Failed, Cancelled] {
            for next in [
                Queued,
                Extracting,
                Classifying,
                ExtractingMetrics,
                Aggregating,
                Completed,
                Partial,
                Failed,
                Cancelled,
            ] {
                assert!(!terminal.can_transition(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_partial_only_from_aggregating() {
        assert!(JobStatus::Aggregating.can_transition(JobStatus::Partial));
        assert!(!JobStatus::ExtractingMetrics.can_transition(JobStatus::Partial));
    }
}
