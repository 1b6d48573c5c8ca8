use std::time::Instant;

use log::{debug, info, warn};

use crate::core::config::SamplerConfig;
use crate::core::video::diff_filter::FrameDiffFilter;
use crate::core::video::source::{ExtractError, RawFrame, VideoSource};

/// 采样统计
#[derive(Debug, Clone, Default)]
pub struct SampleStats {
    pub read: u64,
    pub sampled: usize,
    pub near_duplicates: usize,
    pub read_failures: u32,
}

/// 固定间隔采样器
///
/// 命中采样点的帧先过差异预筛：近重复帧被丢弃，
/// 但其时间窗口视作已覆盖（采样点不回退）。
pub struct FrameSampler {
    cfg: SamplerConfig,
    diff: FrameDiffFilter,
}

impl FrameSampler {
    pub fn new(cfg: &SamplerConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            diff: FrameDiffFilter::with_threshold(cfg.diff_threshold),
        }
    }

    /// 从单个视频源采样，`started` 是提取阶段的起始时刻，
    /// 同一任务多个视频共享同一个墙钟预算。
    pub fn sample(
        &mut self,
        source: &mut dyn VideoSource,
        started: Instant,
        already_sampled: usize,
    ) -> Result<(Vec<RawFrame>, SampleStats), ExtractError> {
        let interval_ms = (self.cfg.interval_secs * 1000.0).round().max(1.0) as u64;
        let limit_ms = self.cfg.timeout.as_millis() as u64;
        let budget = self.cfg.max_frames.saturating_sub(already_sampled);

        let mut stats = SampleStats::default();
        let mut out: Vec<RawFrame> = Vec::new();
        let mut next_due: u64 = 0;

        if budget == 0 {
            return Ok((out, stats));
        }

        loop {
            let elapsed = started.elapsed();
            if elapsed > self.cfg.timeout {
                return Err(ExtractError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    limit_ms,
                });
            }

            let raw = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    // 个别坏帧不终止整段提取
                    warn!("跳过不可读帧: {}", e);
                    stats.read_failures += 1;
                    continue;
                }
            };
            stats.read += 1;

            if raw.timestamp_ms < next_due {
                continue;
            }
            while next_due <= raw.timestamp_ms {
                next_due += interval_ms;
            }

            let raw = downscale_if_needed(raw, self.cfg.max_height);
            let (gray, _) = crate::core::video::frame::rgba_to_luma(&raw.data);
            if !self.diff.should_process(&gray, raw.width, raw.height) {
                debug!("近重复帧丢弃 @ {} ms", raw.timestamp_ms);
                stats.near_duplicates += 1;
                continue;
            }

            out.push(raw);
            if out.len() >= budget {
                info!("采样达到上限 {} 帧，停止", self.cfg.max_frames);
                break;
            }
        }

        stats.sampled = out.len();
        Ok((out, stats))
    }

    pub fn reset(&mut self) {
        self.diff.reset();
    }
}

/// 超过高度上限的帧等比缩小，降低哈希/分类成本
fn downscale_if_needed(raw: RawFrame, max_height: u32) -> RawFrame {
    if max_height == 0 || raw.height <= max_height {
        return raw;
    }
    let Some(img) = image::RgbaImage::from_raw(raw.width, raw.height, raw.data.clone()) else {
        return raw;
    };
    let scale = max_height as f32 / raw.height as f32;
    let new_w = ((raw.width as f32 * scale).round() as u32).max(1);
    let resized =
        image::imageops::resize(&img, new_w, max_height, image::imageops::FilterType::Triangle);
    RawFrame {
        width: new_w,
        height: max_height,
        data: resized.into_raw(),
        timestamp_ms: raw.timestamp_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::source::{FrameReadError, ScriptedVideoSource};
    use std::time::Duration;

    fn uniform(fill: u8, timestamp_ms: u64) -> RawFrame {
        RawFrame {
            width: 64,
            height: 64,
            data: vec![fill; 64 * 64 * 4],
            timestamp_ms,
        }
    }

    /// 每秒一帧、亮度各异的 60 秒素材
    fn one_minute_clip() -> Vec<RawFrame> {
        (0..60).map(|i| uniform((i * 4) as u8, i * 1000)).collect()
    }

    fn config(interval_secs: f64) -> SamplerConfig {
        SamplerConfig {
            interval_secs,
            ..Default::default()
        }
    }

    #[test]
    fn test_two_second_interval_yields_thirty_frames() {
        let mut sampler = FrameSampler::new(&config(2.0));
        let mut source = ScriptedVideoSource::from_frames(one_minute_clip());
        let (frames, stats) = sampler.sample(&mut source, Instant::now(), 0).unwrap();

        assert_eq!(frames.len(), 30);
        assert_eq!(stats.near_duplicates, 0);
        let timestamps: Vec<u64> = frames.iter().map(|f| f.timestamp_ms).collect();
        let expected: Vec<u64> = (0..30).map(|i| i * 2000).collect();
        assert_eq!(timestamps, expected);
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let run = || {
            let mut sampler = FrameSampler::new(&config(2.0));
            let mut source = ScriptedVideoSource::from_frames(one_minute_clip());
            let (frames, _) = sampler.sample(&mut source, Instant::now(), 0).unwrap();
            frames.iter().map(|f| f.timestamp_ms).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_near_duplicates_skipped_but_window_covered() {
        // 全部同画面：只留第一帧，其余按近重复丢弃
        let frames: Vec<RawFrame> = (0..10).map(|i| uniform(128, i * 1000)).collect();
        let mut sampler = FrameSampler::new(&config(1.0));
        let mut source = ScriptedVideoSource::from_frames(frames);
        let (kept, stats) = sampler.sample(&mut source, Instant::now(), 0).unwrap();

        assert_eq!(kept.len(), 1);
        assert_eq!(stats.near_duplicates, 9);
    }

    #[test]
    fn test_unreadable_frames_skipped() {
        let script: Vec<Result<RawFrame, FrameReadError>> = vec![
            Ok(uniform(10, 0)),
            Err(FrameReadError("坏帧".into())),
            Ok(uniform(200, 2000)),
        ];
        let mut sampler = FrameSampler::new(&config(2.0));
        let mut source = ScriptedVideoSource::new(script);
        let (kept, stats) = sampler.sample(&mut source, Instant::now(), 0).unwrap();

        assert_eq!(kept.len(), 2);
        assert_eq!(stats.read_failures, 1);
    }

    #[test]
    fn test_timeout_aborts_extraction() {
        let cfg = SamplerConfig {
            interval_secs: 2.0,
            timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let mut sampler = FrameSampler::new(&cfg);
        let mut source = ScriptedVideoSource::from_frames(one_minute_clip());
        let started = Instant::now();
        std::thread::sleep(Duration::from_millis(5));

        let result = sampler.sample(&mut source, started, 0);
        assert!(matches!(result, Err(ExtractError::Timeout { .. })));
    }

    #[test]
    fn test_frame_budget_respected() {
        let cfg = SamplerConfig {
            interval_secs: 1.0,
            max_frames: 5,
            ..Default::default()
        };
        let mut sampler = FrameSampler::new(&cfg);
        let mut source = ScriptedVideoSource::from_frames(one_minute_clip());
        let (kept, _) = sampler.sample(&mut source, Instant::now(), 0).unwrap();
        assert_eq!(kept.len(), 5);

        // 预算已被前一个视频用掉一部分
        let mut sampler = FrameSampler::new(&cfg);
        let mut source = ScriptedVideoSource::from_frames(one_minute_clip());
        let (kept, _) = sampler.sample(&mut source, Instant::now(), 3).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_tall_frames_downscaled() {
        let tall = RawFrame {
            width: 720,
            height: 1280,
            data: vec![90; 720 * 1280 * 4],
            timestamp_ms: 0,
        };
        let out = downscale_if_needed(tall, 720);
        assert_eq!(out.height, 720);
        assert_eq!(out.width, 405);
    }
}
