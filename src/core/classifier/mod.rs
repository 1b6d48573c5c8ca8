//! 两级帧质量分类
//!
//! 第一级：亮度/均匀度启发式，快速、确定、不占模型额度；
//! 第二级：学习模型给出"可读面板"概率，按阈值接受。
//! 模型加载失败整个任务 fail-closed；单帧推理失败只拒绝该帧。

pub mod heuristic;
pub mod model;

use log::{info, warn};
use rayon::prelude::*;
use std::sync::Arc;

use crate::core::config::ClassifierConfig;
use crate::core::video::frame::{rgba_to_luma, Frame};

pub use heuristic::{luma_stats, stage_a_passes, LumaStats};
pub use model::{
    prepare_input, ClassifyError, MockPanelModel, ModelInput, PanelModel, PanelModelLoader,
    StaticModelLoader, UnavailableModelLoader,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyStats {
    pub total: usize,
    pub accepted: usize,
    pub rejected_heuristic: usize,
    pub rejected_model: usize,
    pub inference_errors: usize,
}

enum Outcome {
    Accepted,
    RejectedHeuristic,
    RejectedModel,
    InferenceError,
}

/// 对一批帧跑完两级过滤，就地写回 score/accepted
pub struct FrameClassifier {
    model: Arc<dyn PanelModel>,
    cfg: ClassifierConfig,
}

impl FrameClassifier {
    pub fn new(model: Arc<dyn PanelModel>, cfg: &ClassifierConfig) -> Self {
        Self {
            model,
            cfg: cfg.clone(),
        }
    }

    pub fn classify_all(&self, frames: &mut [Frame], pool: &rayon::ThreadPool) -> ClassifyStats {
        let total = frames.len();
        let outcomes: Vec<Outcome> = pool.install(|| {
            frames
                .par_iter_mut()
                .map(|frame| self.classify_one(frame))
                .collect()
        });

        let mut stats = ClassifyStats {
            total,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Accepted => stats.accepted += 1,
                Outcome::RejectedHeuristic => stats.rejected_heuristic += 1,
                Outcome::RejectedModel => stats.rejected_model += 1,
                Outcome::InferenceError => stats.inference_errors += 1,
            }
        }
        info!(
            "✅ 分类完成: {} 帧，接受 {}，启发式拒绝 {}，模型拒绝 {}，推理失败 {}",
            stats.total,
            stats.accepted,
            stats.rejected_heuristic,
            stats.rejected_model,
            stats.inference_errors
        );
        stats
    }

    fn classify_one(&self, frame: &mut Frame) -> Outcome {
        let (gray, _) = rgba_to_luma(&frame.data);
        let stats = luma_stats(&gray);

        if !stage_a_passes(&stats, &self.cfg) {
            frame.accepted = false;
            return Outcome::RejectedHeuristic;
        }

        let input = prepare_input(frame, &self.cfg);
        match self.model.score(&input) {
            Ok(p) => {
                let p = p.clamp(0.0, 1.0);
                frame.score = Some(p);
                frame.accepted = p >= self.cfg.accept_threshold;
                if frame.accepted {
                    Outcome::Accepted
                } else {
                    Outcome::RejectedModel
                }
            }
            Err(e) => {
                // 单帧失败按一级拒绝处理，任务继续
                warn!("帧 {} 推理失败，按拒绝处理: {}", frame.index, e);
                frame.accepted = false;
                Outcome::InferenceError
            }
        }
    }
}
