//! 遥操作采样器
//!
//! 人控模式下每个控制节拍运行一次：读取 6 自由度输入设备，
//! 按灵敏度缩放成一个节拍的相对运动，积分到运行中的绝对目标
//! 位姿上。死区过滤由设备驱动完成，这里拿到的已经是干净的
//! [-1, 1] 运动快照。

use nalgebra::Vector3;
use rand::Rng;
use tracing::debug;

use robodiff_core::{
    CommandRecord, DeltaAction, EvalConfig, MotionDevice, TargetPose, integrate,
};

/// 复位时的平移抖动上限（位置单位）
const HOME_TRANSLATION_JITTER: f64 = 5.0;
/// 复位时的旋转抖动上限（弧度）
const HOME_ROTATION_JITTER: f64 = 0.05;

/// 遥操作采样器
///
/// 持有人控模式下的运行目标位姿；策略模式接管时该位姿被丢弃，
/// 下次回到人控从机器人实际状态重新初始化。
#[derive(Debug, Clone)]
pub struct TeleopSampler {
    /// 运行中的绝对目标位姿
    target: TargetPose,
    /// 夹爪二值目标（false = 开）
    gripper_closed: bool,
    /// 上一节拍的按键状态（用于边沿检测）
    last_buttons: [bool; 2],
}

impl TeleopSampler {
    /// 从初始位姿创建（通常取自 `get_robot_state()`）
    pub fn new(initial: TargetPose) -> Self {
        TeleopSampler {
            target: initial,
            gripper_closed: false,
            last_buttons: [false, false],
        }
    }

    /// 当前目标位姿
    pub fn target(&self) -> &TargetPose {
        &self.target
    }

    /// 采样一个控制节拍
    ///
    /// 返回本节拍实际积分的相对指令；运行目标位姿随之更新。
    ///
    /// 缩放：平移按 `(max_pos_speed / frequency) * pos_sensitivity`，
    /// 旋转按 `(max_rot_speed / frequency) * rot_sensitivity`，并带
    /// `[-1, 1, -1]` 符号翻转（设备轴向到机器人轴向的约定，不可改动）。
    pub fn sample(&mut self, device: &impl MotionDevice, config: &EvalConfig) -> DeltaAction {
        let motion = device.motion_state();

        let pos_scale = (config.max_pos_speed / config.frequency) * config.pos_sensitivity;
        let rot_scale = (config.max_rot_speed / config.frequency) * config.rot_sensitivity;

        let dpos = Vector3::new(motion[0], motion[1], motion[2]) * pos_scale;
        let drot_xyz =
            Vector3::new(-motion[3], motion[4], -motion[5]) * rot_scale;

        // 按键 0 为预留的平移/旋转互斥模式开关，当前未接线
        let buttons = [device.is_button_pressed(0), device.is_button_pressed(1)];
        if buttons[1] && !self.last_buttons[1] {
            // 按键 1 上升沿：夹爪二值目标翻转
            self.gripper_closed = !self.gripper_closed;
            debug!(closed = self.gripper_closed, "Gripper toggled");
        }
        self.last_buttons = buttons;

        let delta = DeltaAction {
            dpos,
            drot_xyz,
            gripper: if self.gripper_closed { 1.0 } else { 0.0 },
        };

        self.target = integrate(&self.target, &delta);
        delta
    }

    /// 把当前目标位姿打包成一条队列记录
    pub fn command_record(&self, raw: DeltaAction, timestamp: f64) -> CommandRecord {
        CommandRecord {
            pose: self.target.to_quat_pose(),
            raw,
            timestamp,
        }
    }

    /// 复位到带随机抖动的初始位姿
    ///
    /// 回合之间随机化初始条件：平移抖动限幅 ±5，旋转抖动限幅
    /// ±0.05 rad。夹爪目标保持不变。
    pub fn reset_to_home(&mut self, home: TargetPose, rng: &mut impl Rng) {
        let mut target = home;
        for i in 0..3 {
            target.position[i] +=
                rng.gen_range(-HOME_TRANSLATION_JITTER..=HOME_TRANSLATION_JITTER);
            target.euler_zyx[i] += rng.gen_range(-HOME_ROTATION_JITTER..=HOME_ROTATION_JITTER);
        }
        target.gripper = self.target.gripper;
        self.target = target;
    }
}
