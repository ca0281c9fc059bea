//! # robodiff-client
//!
//! robodiff 运行时的控制侧：
//! - [`TeleopSampler`]：人控模式下按节拍采样输入设备并积分目标位姿
//! - [`InferenceScheduler`]：把一次推理的动作批转换为带截止时刻的
//!   指令序列（抖动抑制、新鲜度过滤、超预算降级）
//! - [`EvalSession`]：显式的控制模式状态机（人控 / 策略 / 终止），
//!   驱动整个闭环会话
//!
//! 硬件、策略与操作员输入通过 `robodiff-core` 的 trait 接缝注入；
//! `mock` feature 提供测试与干跑用的模拟协作者。

mod error;
pub mod inference;
#[cfg(feature = "mock")]
pub mod mock;
pub mod session;
pub mod teleop;

pub use error::SessionError;
pub use inference::{InferencePlan, InferenceScheduler, ROTATION_JITTER_EPS};
pub use session::{ControlMode, EvalSession};
pub use teleop::TeleopSampler;
