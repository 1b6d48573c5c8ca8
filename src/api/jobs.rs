//! 任务提交门面
//!
//! 请求层（不在本库范围）只接触这里：组装提交、生成可读任务号、
//! 把上传文件名映射成媒体来源。

use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::media::{kind_from_filename, IngestError};
use crate::models::{MediaPayload, MediaSource};

pub use crate::core::job::manager::{JobManager, JobManagerBuilder, JobSubmission};

/// 由公司名与活动名生成可读任务号，如 `acme_summerlaunch_1722945600`
pub fn generate_job_id(company: &str, campaign_name: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!(
        "{}_{}_{}",
        sanitize_component(company),
        sanitize_component(campaign_name),
        timestamp
    )
}

fn sanitize_component(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(15)
        .collect()
}

/// 按上传文件名的扩展名建媒体来源；清单外的类型在这里就拒绝
pub fn media_source_from_upload(
    media_id: &str,
    filename: &str,
    payload: MediaPayload,
) -> Result<MediaSource, IngestError> {
    let kind = kind_from_filename(filename).ok_or_else(|| {
        IngestError::Unsupported(format!("不允许的文件类型: {}", filename))
    })?;
    Ok(MediaSource {
        media_id: media_id.to_string(),
        kind,
        payload,
    })
}
