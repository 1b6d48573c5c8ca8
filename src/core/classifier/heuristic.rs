//! 第一级启发式过滤 - 纯函数、零模型开销
//!
//! 过暗或过度均匀（纯色、遮挡、转场黑屏）的帧在这里直接拒绝，
//! 不占用模型推理额度。

use crate::core::config::ClassifierConfig;

#[derive(Debug, Clone, Copy)]
pub struct LumaStats {
    pub mean: f32,
    pub std_dev: f32,
}

/// 两遍整数累加求均值/标准差
pub fn luma_stats(gray: &[u8]) -> LumaStats {
    if gray.is_empty() {
        return LumaStats {
            mean: 0.0,
            std_dev: 0.0,
        };
    }

    let mut sum = 0u64;
    for &p in gray {
        sum += p as u64;
    }
    let mean = sum as f32 / gray.len() as f32;

    let mut sum_squared_diff = 0f64;
    for &p in gray {
        let diff = p as f64 - mean as f64;
        sum_squared_diff += diff * diff;
    }
    let variance = sum_squared_diff / gray.len() as f64;

    LumaStats {
        mean,
        std_dev: variance.sqrt() as f32,
    }
}

/// 通过返回 true；拒绝的帧不会进入模型
pub fn stage_a_passes(stats: &LumaStats, cfg: &ClassifierConfig) -> bool {
    if stats.mean < cfg.darkness_threshold as f32 {
        return false;
    }
    if stats.std_dev < cfg.min_std_dev {
        return false;
    }
    true
}
