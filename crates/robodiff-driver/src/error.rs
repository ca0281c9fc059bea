//! 驱动层错误类型定义

use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 执行线程启动失败
    #[error("Failed to spawn executor thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// 执行线程已因硬件错误停机
    #[error("Executor thread faulted: {0}")]
    ExecutorFaulted(String),

    /// 执行线程未在宽限期内退出
    #[error("Executor thread failed to stop within {timeout_ms} ms")]
    StopTimeout { timeout_ms: u64 },
}
