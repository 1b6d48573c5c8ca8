use thiserror::Error;

use crate::models::JobStatus;

#[derive(Debug, Error)]
#[error("非法状态迁移: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// 单个任务的状态跟踪器，把迁移表封装成唯一入口
#[derive(Debug)]
pub struct JobState {
    current: JobStatus,
}

impl JobState {
    pub fn new() -> Self {
        Self {
            current: JobStatus::Queued,
        }
    }

    pub fn current(&self) -> JobStatus {
        self.current
    }

    /// 迁移成功返回新状态；终态一经进入，任何迁移都被拒绝
    pub fn advance(&mut self, next: JobStatus) -> Result<JobStatus, InvalidTransition> {
        if !self.current.can_transition(next) {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        Ok(next)
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}
