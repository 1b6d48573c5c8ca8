//! 第二级学习模型 - 作为黑盒打分函数消费
//!
//! 模型的训练与结构不在本库范围内；这里只定义固定的输入契约
//! （RGB、缩放到固定尺寸、归一化到 [0,1]）和打分接口。

use std::sync::Arc;

use thiserror::Error;

use crate::core::config::ClassifierConfig;
use crate::core::video::frame::{rgba_to_luma, Frame};

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// 任务启动时模型不可用，按 fail-closed 处理
    #[error("分类模型不可用: {0}")]
    ModelUnavailable(String),
    /// 单帧推理失败，调用方拒绝该帧后继续
    #[error("推理失败: {0}")]
    Inference(String),
}

/// 模型的固定输入：RGB，行优先，归一化到 [0,1]
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

/// "是否为可读面板"的概率打分器
///
/// 实现必须可跨线程共享；底层推理机制若不可重入，
/// 需要在实现内部自行串行化，不得依赖调用方加锁。
pub trait PanelModel: Send + Sync {
    fn score(&self, input: &ModelInput) -> Result<f32, ClassifyError>;
}

/// 模型加载入口，任务启动时调用一次
pub trait PanelModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn PanelModel>, ClassifyError>;
}

/// 按模型契约准备输入：偏暗帧先做对比度拉伸，再缩放归一化
pub fn prepare_input(frame: &Frame, cfg: &ClassifierConfig) -> ModelInput {
    let (_, mean) = rgba_to_luma(&frame.data);

    let source = if mean < cfg.dim_boost_below {
        boost_contrast(frame, 1.5, 40.0)
    } else {
        frame.clone()
    };

    let resized = source.resize_to(cfg.model_width, cfg.model_height);
    let pixels: Vec<f32> = resized
        .data
        .chunks_exact(4)
        .flat_map(|rgba| {
            [
                rgba[0] as f32 / 255.0,
                rgba[1] as f32 / 255.0,
                rgba[2] as f32 / 255.0,
            ]
        })
        .collect();

    ModelInput {
        width: cfg.model_width,
        height: cfg.model_height,
        pixels,
    }
}

/// p' = clamp(alpha * p + beta)，暗帧增强
fn boost_contrast(frame: &Frame, alpha: f32, beta: f32) -> Frame {
    let mut boosted = frame.clone();
    for chunk in boosted.data.chunks_exact_mut(4) {
        for p in chunk.iter_mut().take(3) {
            *p = (*p as f32 * alpha + beta).clamp(0.0, 255.0) as u8;
        }
    }
    boosted
}

/// 测试用打分器：按闭包或固定值打分
pub struct MockPanelModel {
    scorer: Box<dyn Fn(&ModelInput) -> Result<f32, ClassifyError> + Send + Sync>,
}

impl MockPanelModel {
    pub fn with_score(score: f32) -> Self {
        Self {
            scorer: Box::new(move |_| Ok(score)),
        }
    }

    pub fn with_fn<F>(scorer: F) -> Self
    where
        F: Fn(&ModelInput) -> Result<f32, ClassifyError> + Send + Sync + 'static,
    {
        Self {
            scorer: Box::new(scorer),
        }
    }

    /// 每次推理都报错的打分器
    pub fn failing() -> Self {
        Self {
            scorer: Box::new(|_| Err(ClassifyError::Inference("模拟推理失败".into()))),
        }
    }
}

impl PanelModel for MockPanelModel {
    fn score(&self, input: &ModelInput) -> Result<f32, ClassifyError> {
        (self.scorer)(input)
    }
}

/// 已就绪模型的直通加载器
pub struct StaticModelLoader {
    model: Arc<dyn PanelModel>,
}

impl StaticModelLoader {
    pub fn new(model: Arc<dyn PanelModel>) -> Self {
        Self { model }
    }
}

impl PanelModelLoader for StaticModelLoader {
    fn load(&self) -> Result<Arc<dyn PanelModel>, ClassifyError> {
        Ok(Arc::clone(&self.model))
    }
}

/// 始终加载失败的加载器，模拟模型文件缺失
pub struct UnavailableModelLoader {
    reason: String,
}

impl UnavailableModelLoader {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PanelModelLoader for UnavailableModelLoader {
    fn load(&self) -> Result<Arc<dyn PanelModel>, ClassifyError> {
        Err(ClassifyError::ModelUnavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::source::RawFrame;
    use crate::core::video::SourceKind;

    fn frame(fill: u8) -> Frame {
        Frame::from_raw(
            0,
            "m1",
            SourceKind::Static,
            RawFrame {
                width: 32,
                height: 32,
                data: vec![fill; 32 * 32 * 4],
                timestamp_ms: 0,
            },
        )
    }

    #[test]
    fn test_input_contract_dimensions() {
        let cfg = ClassifierConfig::default();
        let input = prepare_input(&frame(180), &cfg);
        assert_eq!(input.width, 224);
        assert_eq!(input.height, 224);
        assert_eq!(input.pixels.len(), 224 * 224 * 3);
        assert!(input.pixels.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_dim_frame_gets_boosted() {
        let cfg = ClassifierConfig::default();
        // 均亮 100 < dim_boost_below(110)：拉伸后应为 100*1.5+40=190
        let input = prepare_input(&frame(100), &cfg);
        let expected = 190.0 / 255.0;
        assert!((input.pixels[0] - expected).abs() < 0.02);
    }

    #[test]
    fn test_bright_frame_untouched() {
        let cfg = ClassifierConfig::default();
        let input = prepare_input(&frame(180), &cfg);
        assert!((input.pixels[0] - 180.0 / 255.0).abs() < 0.02);
    }

    #[test]
    fn test_loaders() {
        let loader = StaticModelLoader::new(Arc::new(MockPanelModel::with_score(0.9)));
        assert!(loader.load().is_ok());

        let loader = UnavailableModelLoader::new("模型文件缺失");
        assert!(matches!(
            loader.load(),
            Err(ClassifyError::ModelUnavailable(_))
        ));
    }
}
