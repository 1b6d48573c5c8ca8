use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};

use crate::core::aggregate::aggregate;
use crate::core::classifier::{FrameClassifier, PanelModelLoader};
use crate::core::config::PipelineConfig;
use crate::core::job::state::JobState;
use crate::core::job::CancelHandle;
use crate::core::media::{EntryKind, Ingestor};
use crate::core::recognition::{MetricExtractor, RecognitionService};
use crate::core::storage::{JobStore, ObjectStore};
use crate::core::video::source::ExtractError;
use crate::core::video::{decode_static_image, Frame, FrameSampler, MediaOpener, SourceKind};
use crate::models::{FailureKind, Job, JobFailure, JobReport, JobStatus};

/// 对象存储上传的代表帧数量（按分类得分取最高）
const REPRESENTATIVE_FRAMES: usize = 3;

/// 单个任务的阶段编排器
///
/// 致命错误（媒体不支持、提取超时、模型不可用）直接进 Failed；
/// 帧级读取失败只累积，最终以 Partial 收尾。
pub struct JobRunner {
    cfg: PipelineConfig,
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    service: Arc<dyn RecognitionService>,
    model_loader: Arc<dyn PanelModelLoader>,
    opener: Arc<dyn MediaOpener>,
    classify_pool: Arc<rayon::ThreadPool>,
}

impl JobRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: PipelineConfig,
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        service: Arc<dyn RecognitionService>,
        model_loader: Arc<dyn PanelModelLoader>,
        opener: Arc<dyn MediaOpener>,
        classify_pool: Arc<rayon::ThreadPool>,
    ) -> Self {
        Self {
            cfg,
            store,
            objects,
            service,
            model_loader,
            opener,
            classify_pool,
        }
    }

    /// 跑完一个任务的全部阶段，返回对外状态快照
    pub fn run(&self, mut job: Job, cancel: &CancelHandle) -> JobReport {
        let mut state = JobState::new();
        info!("🎬 任务开始: {}", job.id);

        // ---- 提取 ----
        if self.bail_if_cancelled(&mut job, &mut state, cancel) {
            return JobReport::from_job(&job);
        }
        self.advance(&mut job, &mut state, JobStatus::Extracting);
        let mut frames = match self.extract_stage(&job) {
            Ok(frames) => frames,
            Err(failure) => return self.fail(&mut job, &mut state, failure),
        };
        info!("任务 {}: 提取 {} 帧", job.id, frames.len());

        // ---- 分类 ----
        if self.bail_if_cancelled(&mut job, &mut state, cancel) {
            return JobReport::from_job(&job);
        }
        self.advance(&mut job, &mut state, JobStatus::Classifying);
        // fail-closed：模型装不上就不让任何任务带病跑
        let model = match self.model_loader.load() {
            Ok(model) => model,
            Err(e) => {
                return self.fail(
                    &mut job,
                    &mut state,
                    JobFailure {
                        kind: FailureKind::ModelUnavailable,
                        message: e.to_string(),
                    },
                );
            }
        };
        let classifier = FrameClassifier::new(model, &self.cfg.classifier);
        classifier.classify_all(&mut frames, &self.classify_pool);

        // ---- 指标提取 ----
        if self.bail_if_cancelled(&mut job, &mut state, cancel) {
            return JobReport::from_job(&job);
        }
        self.advance(&mut job, &mut state, JobStatus::ExtractingMetrics);
        let accepted: Vec<&Frame> = frames.iter().filter(|f| f.accepted).collect();
        if accepted.is_empty() {
            return self.fail(
                &mut job,
                &mut state,
                JobFailure {
                    kind: FailureKind::NoUsableFrames,
                    message: "分类后没有任何可用帧".into(),
                },
            );
        }
        let extractor = MetricExtractor::new(Arc::clone(&self.service), &self.cfg.recognition);
        let locale_hint = job.campaign.locale_hint.clone();
        let outcome = extractor.extract_all(&accepted, locale_hint.as_deref());

        // ---- 聚合 ----
        if self.bail_if_cancelled(&mut job, &mut state, cancel) {
            return JobReport::from_job(&job);
        }
        self.advance(&mut job, &mut state, JobStatus::Aggregating);
        let metrics = aggregate(&outcome.readings);
        if metrics.is_empty() {
            return self.fail(
                &mut job,
                &mut state,
                JobFailure {
                    kind: FailureKind::NoMetricsRecovered,
                    message: "聚合后没有任何可用字段".into(),
                },
            );
        }
        job.metrics = Some(metrics.clone());
        if let Err(e) = self.store.save_metrics(&job.id, &metrics) {
            error!("任务 {}: 指标落盘失败: {}", job.id, e);
        }

        // 对象存储是尽力而为，失败只记日志
        let representatives = representative_frames(&frames, self.cfg.recognition.jpeg_quality);
        if let Err(e) = self.objects.put_metrics(&job.id, &metrics, &representatives) {
            warn!("📤 任务 {}: 对象存储写入失败（忽略）: {}", job.id, e);
        }

        let final_status = if outcome.failures.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::Partial
        };
        self.advance(&mut job, &mut state, final_status);
        info!(
            "✅ 任务 {} 收尾: {}，可用字段 {}，缺失字段 {}",
            job.id,
            final_status,
            metrics.values.len(),
            metrics.unavailable.len()
        );
        JobReport::from_job(&job)
    }

    /// 接收 + 采帧。帧序号在这里连续分配，插入顺序即时间顺序。
    fn extract_stage(&self, job: &Job) -> Result<Vec<Frame>, JobFailure> {
        let ingestor = Ingestor::new(&self.cfg.ingest);
        let started = Instant::now();
        let mut frames: Vec<Frame> = Vec::new();
        let mut sampled_total = 0usize;

        for source in &job.media {
            let entries = ingestor.ingest(source).map_err(|e| JobFailure {
                kind: FailureKind::UnsupportedMedia,
                message: e.to_string(),
            })?;

            for entry in entries {
                if started.elapsed() > self.cfg.sampler.timeout {
                    return Err(JobFailure {
                        kind: FailureKind::ExtractionTimeout,
                        message: format!(
                            "帧提取超时: 上限 {} ms",
                            self.cfg.sampler.timeout.as_millis()
                        ),
                    });
                }

                match entry.kind {
                    EntryKind::Image(bytes) => match decode_static_image(&bytes) {
                        Ok(raw) => {
                            let index = frames.len() as u32;
                            frames.push(Frame::from_raw(
                                index,
                                &entry.media_id,
                                SourceKind::Static,
                                raw,
                            ));
                        }
                        Err(e) => {
                            warn!("跳过不可解码的截图 {}: {}", entry.media_id, e);
                        }
                    },
                    EntryKind::Video(payload) => {
                        let mut video = self
                            .opener
                            .open_video(&entry.media_id, &payload)
                            .map_err(|e| JobFailure {
                                kind: FailureKind::UnsupportedMedia,
                                message: e.to_string(),
                            })?;
                        let mut sampler = FrameSampler::new(&self.cfg.sampler);
                        let (raws, stats) = sampler
                            .sample(video.as_mut(), started, sampled_total)
                            .map_err(|e| match e {
                                ExtractError::Timeout { .. } => JobFailure {
                                    kind: FailureKind::ExtractionTimeout,
                                    message: e.to_string(),
                                },
                                ExtractError::OpenSource(_) => JobFailure {
                                    kind: FailureKind::UnsupportedMedia,
                                    message: e.to_string(),
                                },
                            })?;
                        sampled_total += stats.sampled;
                        info!(
                            "媒体 {}: 读 {} 帧，采 {} 帧，近重复 {}，坏帧 {}",
                            entry.media_id,
                            stats.read,
                            stats.sampled,
                            stats.near_duplicates,
                            stats.read_failures
                        );
                        for raw in raws {
                            let index = frames.len() as u32;
                            frames.push(Frame::from_raw(
                                index,
                                &entry.media_id,
                                SourceKind::Sampled,
                                raw,
                            ));
                        }
                    }
                }
            }
        }
        Ok(frames)
    }

    /// 取消只在阶段边界生效；帧缓存随作用域释放，不发布任何指标
    fn bail_if_cancelled(
        &self,
        job: &mut Job,
        state: &mut JobState,
        cancel: &CancelHandle,
    ) -> bool {
        if !cancel.is_cancelled() {
            return false;
        }
        info!("🛑 任务 {} 已取消", job.id);
        self.advance(job, state, JobStatus::Cancelled);
        true
    }

    fn advance(&self, job: &mut Job, state: &mut JobState, next: JobStatus) {
        match state.advance(next) {
            Ok(status) => {
                job.status = status;
                if let Err(e) =
                    self.store
                        .update_status(&job.id, status, job.failure.as_ref())
                {
                    error!("任务 {}: 状态检查点落盘失败: {}", job.id, e);
                }
            }
            Err(e) => error!("任务 {}: {}", job.id, e),
        }
    }

    fn fail(&self, job: &mut Job, state: &mut JobState, failure: JobFailure) -> JobReport {
        error!(
            "❌ 任务 {} 失败 [{}]: {}",
            job.id,
            failure.kind.as_str(),
            failure.message
        );
        job.failure = Some(failure);
        self.advance(job, state, JobStatus::Failed);
        JobReport::from_job(&job)
    }
}

/// 按分类得分取最高的几帧作为代表帧
fn representative_frames(frames: &[Frame], jpeg_quality: u8) -> Vec<(u32, Vec<u8>)> {
    let mut accepted: Vec<&Frame> = frames.iter().filter(|f| f.accepted).collect();
    accepted.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .total_cmp(&a.score.unwrap_or(0.0))
            .then(a.index.cmp(&b.index))
    });
    accepted
        .into_iter()
        .take(REPRESENTATIVE_FRAMES)
        .map(|f| (f.index, f.to_jpeg(jpeg_quality)))
        .collect()
}
