//! 核心层错误类型定义

use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 字段值非法
    #[error("Invalid config field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    /// 配置文件读取失败
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML 解析失败
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 机器人环境错误
#[derive(Error, Debug)]
pub enum EnvError {
    /// 后端（机器人/相机驱动）错误
    #[error("Environment backend error: {0}")]
    Backend(String),

    /// 环境尚未产出观测（历史缓冲为空）
    #[error("Observation buffer empty")]
    EmptyObservation,

    /// IO 错误
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// 策略调用错误
///
/// 策略调用失败是致命错误：跳过一次推理会让机器人在超出控制预算的
/// 时间内失去指令，上层不做重试，直接终止控制会话。
#[derive(Error, Debug)]
pub enum PolicyError {
    /// 推理失败
    #[error("Policy inference failed: {0}")]
    Inference(String),

    /// 动作维度不匹配
    #[error("Unexpected action dim: expected {expected}, got {actual}")]
    BadActionDim { expected: usize, actual: usize },

    /// 返回的动作批行数不足一个推理视界
    #[error("Action batch too short: need {needed} rows, got {actual}")]
    ShortBatch { needed: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            field: "frequency",
            reason: "must be positive".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("frequency") && msg.contains("must be positive"));
    }

    #[test]
    fn test_policy_error_display() {
        let err = PolicyError::ShortBatch {
            needed: 6,
            actual: 4,
        };
        assert_eq!(
            format!("{err}"),
            "Action batch too short: need 6 rows, got 4"
        );
    }
}
