//! 运行时配置
//!
//! 支持 TOML 配置文件加载与字段校验。默认值对应实验中常用的
//! 5Hz 控制频率 / 6 步推理视界配置。

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// 评估会话配置
///
/// # Example
///
/// ```
/// use robodiff_core::EvalConfig;
///
/// let config = EvalConfig::default();
/// assert_eq!(config.frequency, 5.0);
/// assert!((config.dt() - 0.2).abs() < 1e-12);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// 控制频率（Hz）
    pub frequency: f64,

    /// 从采样输入设备到命令期望执行之间预留的采样提前量（秒）
    ///
    /// 人控模式下设备在 `t_cycle_end - command_latency` 被采样。
    pub command_latency: f64,

    /// 单个策略回合的最大时长（秒），超时自动终止
    pub max_duration: f64,

    /// 每次推理消费的控制节拍数（action horizon）
    pub steps_per_inference: usize,

    /// 位置控制灵敏度，(0, 1] 越小越平滑
    pub pos_sensitivity: f64,

    /// 旋转控制灵敏度，(0, 1]
    pub rot_sensitivity: f64,

    /// 末端最大线速度（单位/秒）
    pub max_pos_speed: f64,

    /// 末端最大角速度（弧度/秒）
    pub max_rot_speed: f64,

    /// 动作时间戳相对观测时间戳的节拍偏移
    pub action_offset: usize,

    /// 策略输出是否为增量动作（false = 绝对位姿）
    pub delta_action: bool,

    /// 执行链路延迟余量（秒）
    ///
    /// 新鲜度过滤时，截止时刻必须超过
    /// `latest_executed_time + exec_latency_allowance` 才被保留。
    pub exec_latency_allowance: f64,

    /// 策略回合启动延迟（秒），用于对齐回合起点与首帧观测
    pub start_delay: f64,

    /// 相机帧延迟补偿（秒），等待时提前该量以取到最近的帧
    pub frame_latency: f64,

    /// 打印推理循环的实测频率等额外诊断
    pub verbose: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            frequency: 5.0,
            command_latency: 0.01,
            max_duration: 5.0,
            steps_per_inference: 6,
            pos_sensitivity: 1.0,
            rot_sensitivity: 1.0,
            max_pos_speed: 128.0,
            max_rot_speed: 0.75,
            action_offset: 0,
            delta_action: true,
            exec_latency_allowance: 0.01,
            start_delay: 1.0,
            frame_latency: 1.0 / 30.0,
            verbose: false,
        }
    }
}

impl EvalConfig {
    /// 控制周期（秒）
    #[inline]
    pub fn dt(&self) -> f64 {
        1.0 / self.frequency
    }

    /// 字段校验
    ///
    /// 所有时间/频率字段必须为正，灵敏度必须在 (0, 1] 内。
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be positive and finite, got {value}"),
                })
            }
        }

        positive("frequency", self.frequency)?;
        positive("max_duration", self.max_duration)?;
        positive("max_pos_speed", self.max_pos_speed)?;
        positive("max_rot_speed", self.max_rot_speed)?;
        positive("start_delay", self.start_delay)?;

        if self.steps_per_inference == 0 {
            return Err(ConfigError::Invalid {
                field: "steps_per_inference",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.command_latency < 0.0 || self.command_latency >= self.dt() {
            return Err(ConfigError::Invalid {
                field: "command_latency",
                reason: format!(
                    "must be in [0, dt): got {}, dt = {}",
                    self.command_latency,
                    self.dt()
                ),
            });
        }
        for (field, value) in [
            ("pos_sensitivity", self.pos_sensitivity),
            ("rot_sensitivity", self.rot_sensitivity),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be in (0, 1], got {value}"),
                });
            }
        }
        if self.exec_latency_allowance < 0.0 {
            return Err(ConfigError::Invalid {
                field: "exec_latency_allowance",
                reason: "must be non-negative".to_string(),
            });
        }
        if self.frame_latency < 0.0 {
            return Err(ConfigError::Invalid {
                field: "frame_latency",
                reason: "must be non-negative".to_string(),
            });
        }

        Ok(())
    }

    /// 从 TOML 文件加载并校验
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EvalConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}
