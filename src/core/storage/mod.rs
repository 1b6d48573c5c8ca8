//! 持久化与对象存储边界
//!
//! 流水线在每个阶段结束后通过这里落盘检查点。接口假定重复投递
//! 是幂等的（至少一次语义由实现方保证）。同一接口下内存实现与
//! 外部数据库实现可互换，按配置选择，不在调用点散落分支。

use std::collections::HashMap;
use std::sync::Mutex;

use log::info;
use thiserror::Error;

use crate::models::{AggregatedMetrics, Job, JobFailure, JobStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("任务不存在: {0}")]
    NotFound(String),
    #[error("任务已存在: {0}")]
    AlreadyExists(String),
    #[error("存储后端错误: {0}")]
    Backend(String),
}

/// 任务记录的持久化协作方
pub trait JobStore: Send + Sync {
    fn create_job(&self, job: &Job) -> Result<(), StoreError>;
    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        failure: Option<&JobFailure>,
    ) -> Result<(), StoreError>;
    fn save_metrics(&self, job_id: &str, metrics: &AggregatedMetrics) -> Result<(), StoreError>;
    fn fetch(&self, job_id: &str) -> Result<Option<Job>, StoreError>;
}

/// 最终产物的对象存储协作方；写入是尽力而为，失败不拖垮任务
pub trait ObjectStore: Send + Sync {
    fn put_metrics(
        &self,
        job_id: &str,
        metrics: &AggregatedMetrics,
        representative_frames: &[(u32, Vec<u8>)],
    ) -> Result<(), StoreError>;
}

/// 内存任务存储，本地运行与测试用
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        info!("任务已创建: {}", job.id);
        Ok(())
    }

    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        failure: Option<&JobFailure>,
    ) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        job.status = status;
        if let Some(failure) = failure {
            job.failure = Some(failure.clone());
        }
        Ok(())
    }

    fn save_metrics(&self, job_id: &str, metrics: &AggregatedMetrics) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        job.metrics = Some(metrics.clone());
        Ok(())
    }

    fn fetch(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(jobs.get(job_id).cloned())
    }
}

/// 内存对象存储，键形如 `{job_id}/{文件名}`
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put_metrics(
        &self,
        job_id: &str,
        metrics: &AggregatedMetrics,
        representative_frames: &[(u32, Vec<u8>)],
    ) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(metrics)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut objects = self
            .objects
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        objects.insert(format!("{}/metrics.json", job_id), json);
        for (index, jpeg) in representative_frames {
            objects.insert(format!("{}/frame_{:06}.jpg", job_id, index), jpeg.clone());
        }
        Ok(())
    }
}

/// 总是失败的对象存储，验证尽力而为语义用
pub struct FailingObjectStore;

impl ObjectStore for FailingObjectStore {
    fn put_metrics(
        &self,
        _job_id: &str,
        _metrics: &AggregatedMetrics,
        _representative_frames: &[(u32, Vec<u8>)],
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("对象存储不可达".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignMeta, FailureKind};

    fn job(id: &str) -> Job {
        Job::new(id.to_string(), CampaignMeta::default(), Vec::new())
    }

    #[test]
    fn test_create_and_fetch() {
        let store = MemoryJobStore::new();
        store.create_job(&job("j1")).unwrap();
        let fetched = store.fetch("j1").unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert!(store.fetch("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let store = MemoryJobStore::new();
        store.create_job(&job("j1")).unwrap();
        assert!(matches!(
            store.create_job(&job("j1")),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_status_update_with_failure() {
        let store = MemoryJobStore::new();
        store.create_job(&job("j1")).unwrap();
        store
            .update_status(
                "j1",
                JobStatus::Failed,
                Some(&JobFailure {
                    kind: FailureKind::ExtractionTimeout,
                    message: "超时".into(),
                }),
            )
            .unwrap();

        let fetched = store.fetch("j1").unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(
            fetched.failure.unwrap().kind,
            FailureKind::ExtractionTimeout
        );
    }

    #[test]
    fn test_save_metrics() {
        let store = MemoryJobStore::new();
        store.create_job(&job("j1")).unwrap();
        store
            .save_metrics("j1", &AggregatedMetrics::default())
            .unwrap();
        assert!(store.fetch("j1").unwrap().unwrap().metrics.is_some());
    }

    #[test]
    fn test_object_store_keys() {
        let store = MemoryObjectStore::new();
        store
            .put_metrics("j1", &AggregatedMetrics::default(), &[(3, vec![0xFF])])
            .unwrap();
        assert!(store.get("j1/metrics.json").is_some());
        assert!(store.get("j1/frame_000003.jpg").is_some());
    }
}
