//! # robodiff-core
//!
//! robodiff 实时运行时的核心类型层：
//! - 位姿表示与旋转合成（欧拉角 ↔ 四元数）
//! - 增量动作（delta action）与指令记录（command record）
//! - 观测快照与机器人状态
//! - 运行时配置（TOML + 校验）
//! - 外部协作者的 trait 接缝（机器人环境、输入设备、策略、操作员输入）
//!
//! 本 crate 不包含任何线程或 IO，全部为纯类型和纯函数，
//! 方便上层（driver/client）在测试中直接复用。

pub mod action;
pub mod config;
pub mod env;
mod error;
pub mod obs;
pub mod pose;

pub use action::{ACTION_DIM, ActionBatch, CommandRecord, DeltaAction};
pub use config::EvalConfig;
pub use env::{MotionDevice, OperatorCommand, OperatorInput, Policy, RobotEnv};
pub use error::{ConfigError, EnvError, PolicyError};
pub use obs::{ImageFrame, Observation, RobotState};
pub use pose::{QuatPose, TargetPose, clamp_gripper, integrate};
