//! 会话层错误类型定义

use robodiff_core::{ConfigError, EnvError, PolicyError};
use robodiff_driver::DriverError;
use thiserror::Error;

/// 控制会话错误
///
/// 只有策略/硬件调用失败会升级为会话错误；时序异常（超预算、过期
/// 指令）都在调度器与执行器内部局部消化，操作员发起的终止走正常
/// 返回路径而不是错误路径。
#[derive(Error, Debug)]
pub enum SessionError {
    /// 配置非法
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 机器人环境错误
    #[error(transparent)]
    Env(#[from] EnvError),

    /// 策略调用失败（致命，不重试）
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// 执行线程错误
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_error_is_transparent() {
        let err: SessionError = PolicyError::Inference("cuda OOM".to_string()).into();
        assert!(format!("{err}").contains("cuda OOM"));
    }
}
