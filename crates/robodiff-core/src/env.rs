//! 外部协作者的 trait 接缝
//!
//! 运行时本身不拥有任何硬件或模型：机器人环境、输入设备、策略和
//! 操作员输入都通过 trait 注入。本模块只定义接口；mock 实现见
//! `robodiff-client` 的 `mock` feature，真实后端由集成方提供。

use crate::action::{ActionBatch, DeltaAction};
use crate::error::{EnvError, PolicyError};
use crate::obs::{Observation, RobotState};
use crate::pose::{QuatPose, TargetPose};

/// 机器人/环境抽象
///
/// # 并发约定
///
/// 同一实例会被主控制循环（观测读取、回合管理）和动作执行线程
/// （`exec_actions`）并发访问，实现必须内部同步。
/// **`exec_actions` 只会被动作执行器调用**，主循环绝不直接下发
/// 指令，避免两个执行单元竞争硬件。
pub trait RobotEnv: Send + Sync {
    /// 采样当前观测（短历史缓冲）
    fn get_obs(&self) -> Result<Observation, EnvError>;

    /// 读取机器人瞬时状态
    fn get_robot_state(&self) -> Result<RobotState, EnvError>;

    /// 下发一批绝对位姿指令
    ///
    /// 相对指令 `delta_actions` 与目标时间戳仅用于记录，
    /// 调用是异步的：不等待物理执行完成。
    fn exec_actions(
        &self,
        actions: &[QuatPose],
        delta_actions: &[DeltaAction],
        timestamps: &[f64],
    ) -> Result<(), EnvError>;

    /// 开启一个回合（录制边界），`start_time` 为 epoch 秒
    fn start_episode(&self, start_time: f64) -> Result<(), EnvError>;

    /// 结束当前回合
    ///
    /// 没有开启中的回合时为空操作（终止路径可能重复调用）。
    fn end_episode(&self) -> Result<(), EnvError>;

    /// 机器人复位（回到初始关节位形）
    fn reset_robot(&self) -> Result<(), EnvError>;

    /// 复位后的末端初始位姿
    fn home_pose(&self) -> TargetPose;

    /// 已录制的回合数（用于诊断输出）
    fn episode_count(&self) -> usize;
}

/// 6 自由度输入设备（如 SpaceMouse）
///
/// 设备驱动负责死区过滤和坐标变换，这里拿到的是
/// 归一化到 [-1, 1] 的运动快照。
pub trait MotionDevice: Send {
    /// 当前运动快照：`[tx, ty, tz, rx, ry, rz]`
    fn motion_state(&self) -> [f64; 6];

    /// 按键状态查询
    fn is_button_pressed(&self, idx: usize) -> bool;
}

/// 学习到的控制策略（黑盒）
pub trait Policy {
    /// 重置策略内部状态（历史缓冲等），回合开始前调用
    fn reset(&mut self);

    /// 一次推理：观测窗口 → 未来动作批
    ///
    /// 返回批的行数必须 ≥ 推理视界（steps_per_inference），
    /// 多出的行会被截断。
    fn predict_action(&mut self, obs: &Observation) -> Result<ActionBatch, PolicyError>;
}

/// 操作员控制命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// 把控制权交给策略（人控 → 策略）
    StartPolicy,
    /// 停止策略回合，收回控制权（策略 → 人控）
    StopPolicy,
    /// 机器人复位并随机化初始位姿（仅人控模式）
    ResetRobot,
    /// 退出程序
    Quit,
}

/// 操作员输入源（按键等），非阻塞轮询
pub trait OperatorInput: Send {
    /// 取出下一条待处理命令，无命令时返回 `None`
    fn poll(&mut self) -> Option<OperatorCommand>;
}
