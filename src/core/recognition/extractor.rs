use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::core::config::RecognitionConfig;
use crate::core::recognition::{numeric, outbound_pool, RecognitionService};
use crate::core::video::Frame;
use crate::models::{FrameReadingFailure, MetricField, MetricReading, PanelMeta};

/// 一个阶段的提取产出：读数 + 按帧隔离的失败记录
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// 帧序升序
    pub readings: Vec<MetricReading>,
    pub failures: Vec<FrameReadingFailure>,
    pub metas: Vec<(u32, PanelMeta)>,
}

/// 指数退避：base * multiplier^attempt，封顶 max_delay
pub fn backoff_delay(attempt: u32, cfg: &RecognitionConfig) -> Duration {
    let multiplier = cfg.backoff_multiplier.powi(attempt as i32);
    let ms = (cfg.base_delay.as_millis() as f64 * multiplier) as u64;
    Duration::from_millis(ms).min(cfg.max_delay)
}

pub struct MetricExtractor {
    service: Arc<dyn RecognitionService>,
    cfg: RecognitionConfig,
}

enum FrameResult {
    Extracted {
        readings: Vec<MetricReading>,
        meta: Option<PanelMeta>,
    },
    Failed(FrameReadingFailure),
}

impl MetricExtractor {
    pub fn new(service: Arc<dyn RecognitionService>, cfg: &RecognitionConfig) -> Self {
        Self {
            service,
            cfg: cfg.clone(),
        }
    }

    /// 并发提取一批接受帧；出站并发被全进程共享的线程池封顶
    pub fn extract_all(&self, frames: &[&Frame], locale_hint: Option<&str>) -> ExtractionOutcome {
        let pool = outbound_pool(self.cfg.max_concurrent_requests);
        let results: Vec<FrameResult> = pool.install(|| {
            frames
                .par_iter()
                .map(|frame| self.extract_frame(frame, locale_hint))
                .collect()
        });

        let mut outcome = ExtractionOutcome::default();
        for result in results {
            match result {
                FrameResult::Extracted { readings, meta } => {
                    if let Some(meta) = meta {
                        if let Some(first) = readings.first() {
                            outcome.metas.push((first.frame_index, meta));
                        }
                    }
                    outcome.readings.extend(readings);
                }
                FrameResult::Failed(failure) => outcome.failures.push(failure),
            }
        }
        info!(
            "指标提取完成: {} 条读数，{} 帧失败",
            outcome.readings.len(),
            outcome.failures.len()
        );
        outcome
    }

    fn extract_frame(&self, frame: &Frame, locale_hint: Option<&str>) -> FrameResult {
        let jpeg = frame.to_jpeg(self.cfg.jpeg_quality);
        if jpeg.is_empty() {
            return FrameResult::Failed(FrameReadingFailure {
                frame_index: frame.index,
                fields: MetricField::ALL.to_vec(),
                reason: "JPEG 编码失败".into(),
            });
        }

        let mut last_error = String::new();
        for attempt in 0..self.cfg.max_retries {
            match self
                .service
                .recognize(&jpeg, &MetricField::ALL, locale_hint)
            {
                Ok(panel) => {
                    let mut readings = Vec::with_capacity(panel.fields.len());
                    for (field, obs) in panel.fields {
                        match numeric::normalize(&obs.raw_value) {
                            Some(n) => {
                                let confidence = if n.clean {
                                    obs.confidence
                                } else {
                                    // 残留字符，格式校验不过，降权
                                    obs.confidence * 0.5
                                };
                                readings.push(MetricReading {
                                    frame_index: frame.index,
                                    field,
                                    raw: obs.raw_value,
                                    value: n.value,
                                    confidence: confidence.clamp(0.0, 1.0),
                                    locale: n
                                        .locale
                                        .map(str::to_string)
                                        .or_else(|| locale_hint.map(str::to_string)),
                                });
                            }
                            None => {
                                debug!(
                                    "帧 {} 字段 {} 原始值不可解析: {:?}",
                                    frame.index, field, obs.raw_value
                                );
                            }
                        }
                    }
                    return FrameResult::Extracted {
                        readings,
                        meta: panel.meta,
                    };
                }
                Err(e) => {
                    last_error = e.to_string();
                    if !e.is_retryable() {
                        warn!("帧 {} 提取失败且不可重试: {}", frame.index, e);
                        break;
                    }
                    if attempt + 1 < self.cfg.max_retries {
                        let delay = backoff_delay(attempt, &self.cfg);
                        warn!(
                            "帧 {} 第 {} 次提取失败（{}），{} ms 后重试",
                            frame.index,
                            attempt + 1,
                            e,
                            delay.as_millis()
                        );
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        FrameResult::Failed(FrameReadingFailure {
            frame_index: frame.index,
            fields: MetricField::ALL.to_vec(),
            reason: last_error,
        })
    }
}
