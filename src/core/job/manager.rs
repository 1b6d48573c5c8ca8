use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::core::classifier::PanelModelLoader;
use crate::core::config::{ConfigError, PipelineConfig};
use crate::core::job::runner::JobRunner;
use crate::core::job::CancelHandle;
use crate::core::recognition::RecognitionService;
use crate::core::storage::{
    JobStore, MemoryJobStore, MemoryObjectStore, ObjectStore, StoreError,
};
use crate::core::video::{MediaOpener, NoVideoOpener};
use crate::models::{CampaignMeta, Job, JobReport, MediaSource};

/// 一次任务提交
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub job_id: String,
    pub campaign: CampaignMeta,
    pub media: Vec<MediaSource>,
}

/// 任务管理器
///
/// 持有流水线的全部协作方；任务之间只共享只读资源
/// （模型、配置、服务客户端），没有跨任务可变状态。
pub struct JobManager {
    store: Arc<dyn JobStore>,
    runner: JobRunner,
    jobs_pool: rayon::ThreadPool,
    cancels: Mutex<HashMap<String, CancelHandle>>,
}

pub struct JobManagerBuilder {
    cfg: PipelineConfig,
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    service: Option<Arc<dyn RecognitionService>>,
    model_loader: Option<Arc<dyn PanelModelLoader>>,
    opener: Arc<dyn MediaOpener>,
}

impl JobManager {
    pub fn builder(cfg: PipelineConfig) -> JobManagerBuilder {
        JobManagerBuilder {
            cfg,
            store: Arc::new(MemoryJobStore::new()),
            objects: Arc::new(MemoryObjectStore::new()),
            service: None,
            model_loader: None,
            opener: Arc::new(NoVideoOpener),
        }
    }

    /// 创建任务记录并同步跑完（内嵌与测试场景）
    pub fn run_job(&self, submission: JobSubmission) -> Result<JobReport, StoreError> {
        let (job, cancel) = self.register(submission)?;
        Ok(self.execute(job, cancel))
    }

    /// 创建任务记录并异步执行，并发度受任务池上限约束
    pub fn submit(self: &Arc<Self>, submission: JobSubmission) -> Result<(), StoreError> {
        let (job, cancel) = self.register(submission)?;
        let manager = Arc::clone(self);
        self.jobs_pool.spawn(move || {
            manager.execute(job, cancel);
        });
        Ok(())
    }

    /// 请求取消；在下一个阶段边界生效
    pub fn cancel(&self, job_id: &str) -> bool {
        let cancels = match self.cancels.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        match cancels.get(job_id) {
            Some(handle) => {
                info!("收到取消请求: {}", job_id);
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// 对外状态快照，任何时刻可查，不会是裸错误或静默空结果
    pub fn report(&self, job_id: &str) -> Option<JobReport> {
        match self.store.fetch(job_id) {
            Ok(job) => job.map(|j| JobReport::from_job(&j)),
            Err(e) => {
                warn!("查询任务 {} 失败: {}", job_id, e);
                None
            }
        }
    }

    fn register(
        &self,
        submission: JobSubmission,
    ) -> Result<(Job, CancelHandle), StoreError> {
        let job = Job::new(submission.job_id, submission.campaign, submission.media);
        self.store.create_job(&job)?;

        let cancel = CancelHandle::new();
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(job.id.clone(), cancel.clone());
        }
        Ok((job, cancel))
    }

    fn execute(&self, job: Job, cancel: CancelHandle) -> JobReport {
        let job_id = job.id.clone();
        let report = self.runner.run(job, &cancel);
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.remove(&job_id);
        }
        report
    }
}

impl JobManagerBuilder {
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = store;
        self
    }

    pub fn objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = objects;
        self
    }

    pub fn service(mut self, service: Arc<dyn RecognitionService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn model_loader(mut self, loader: Arc<dyn PanelModelLoader>) -> Self {
        self.model_loader = Some(loader);
        self
    }

    pub fn opener(mut self, opener: Arc<dyn MediaOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn build(self) -> Result<JobManager, ConfigError> {
        self.cfg.validate()?;
        let service = self
            .service
            .ok_or(ConfigError::MissingComponent("识别服务"))?;
        let model_loader = self
            .model_loader
            .ok_or(ConfigError::MissingComponent("分类模型加载器"))?;

        let job_workers = self.cfg.effective_job_workers();
        let jobs_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(job_workers)
            .thread_name(|i| format!("job-{}", i))
            .build()
            .map_err(|_| ConfigError::MissingComponent("任务线程池"))?;
        let classify_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.cfg.effective_classify_workers())
            .thread_name(|i| format!("classify-{}", i))
            .build()
            .map_err(|_| ConfigError::MissingComponent("分类线程池"))?;

        info!(
            "任务管理器就绪: 任务并发 {}，分类线程 {}，出站并发 {}",
            job_workers,
            self.cfg.effective_classify_workers(),
            self.cfg.recognition.max_concurrent_requests
        );

        let runner = JobRunner::new(
            self.cfg,
            Arc::clone(&self.store),
            self.objects,
            service,
            model_loader,
            self.opener,
            Arc::new(classify_pool),
        );

        Ok(JobManager {
            store: self.store,
            runner,
            jobs_pool,
            cancels: Mutex::new(HashMap::new()),
        })
    }
}
