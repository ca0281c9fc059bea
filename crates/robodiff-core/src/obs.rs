//! 观测快照与机器人状态
//!
//! 环境的 `get_obs()` 返回一个短历史缓冲：每个流的最后 `n_obs_steps`
//! 个采样。图像采集与可视化由环境协作者负责，这里只透传打包好的帧
//! 给策略。

use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::pose::TargetPose;

/// 相机帧（打包的像素缓冲）
///
/// 像素布局（RGB8/BGR8 等）由采集端与策略约定，本层不解释内容。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFrame {
    /// 宽（像素）
    pub width: u32,
    /// 高（像素）
    pub height: u32,
    /// 打包像素数据
    pub data: Vec<u8>,
}

/// 观测快照（短历史缓冲，按时间升序）
///
/// 各 `Vec` 长度一致，末尾为最新采样。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// 各采样的时间戳（epoch 秒，单调递增）
    pub timestamps: Vec<f64>,
    /// 末端位置历史
    pub eef_pos: Vec<Vector3<f64>>,
    /// 末端姿态历史（zyx 欧拉角）
    pub eef_rot: Vec<Vector3<f64>>,
    /// 夹爪状态历史
    pub gripper: Vec<f64>,
    /// 各相机的帧历史（键为相机名，如 `camera_0`）
    pub cameras: BTreeMap<String, Vec<ImageFrame>>,
}

impl Observation {
    /// 最新采样的时间戳
    ///
    /// 空观测返回 `None`（环境尚未产出任何采样）。
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// 最新采样的末端位姿
    pub fn latest_pose(&self) -> Option<TargetPose> {
        Some(TargetPose::new(
            *self.eef_pos.last()?,
            *self.eef_rot.last()?,
            self.gripper.last().copied()?,
        ))
    }
}

/// 机器人瞬时状态（单次读取，无历史）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotState {
    /// 末端位置
    pub eef_pos: Vector3<f64>,
    /// 末端姿态（zyx 欧拉角）
    pub eef_rot: Vector3<f64>,
}

impl RobotState {
    /// 转换为目标位姿（夹爪初始全开）
    pub fn to_target_pose(&self) -> TargetPose {
        TargetPose::new(self.eef_pos, self.eef_rot, 0.0)
    }
}
