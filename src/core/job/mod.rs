//! 任务状态机与编排
//!
//! 状态机是唯一有权改写任务状态的组件；各阶段严格串行，
//! 阶段结束后通过持久化协作方落检查点。取消只在阶段边界生效，
//! 不会打断半写的帧或指标记录。

pub mod manager;
pub mod runner;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use manager::{JobManager, JobManagerBuilder, JobSubmission};
pub use runner::JobRunner;
pub use state::{InvalidTransition, JobState};

/// 任务取消句柄；置位后在下一个阶段边界生效
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
