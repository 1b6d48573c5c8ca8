pub mod job;
pub mod metrics;

pub use job::{
    CampaignMeta, FailureKind, Job, JobFailure, JobReport, JobStatus, MediaKind, MediaPayload,
    MediaSource,
};
pub use metrics::{
    AggregatedMetrics, FieldValue, FrameReadingFailure, MetricField, MetricReading, PanelMeta,
};
