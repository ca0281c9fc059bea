//! 动作类型定义
//!
//! - [`DeltaAction`]：单个控制节拍的相对运动指令（平移增量 + 旋转增量 + 夹爪）；
//! - [`ActionBatch`]：一次策略推理返回的动作序列；
//! - [`CommandRecord`]：进入动作队列的带时间戳指令记录。

use nalgebra::Vector3;

use crate::pose::{QuatPose, TargetPose};

/// 动作维度：3 平移 + 3 旋转 + 1 夹爪
pub const ACTION_DIM: usize = 7;

/// 相对运动指令（一个控制节拍）
///
/// 平移与旋转为增量，夹爪为**绝对**指令（不是增量）。
/// 旋转增量使用外旋 xyz 欧拉角。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaAction {
    /// 平移增量
    pub dpos: Vector3<f64>,
    /// 旋转增量（xyz 欧拉角，弧度）
    pub drot_xyz: Vector3<f64>,
    /// 夹爪指令（绝对值）
    pub gripper: f64,
}

impl DeltaAction {
    /// 零动作
    pub const ZERO: Self = DeltaAction {
        dpos: Vector3::new(0.0, 0.0, 0.0),
        drot_xyz: Vector3::new(0.0, 0.0, 0.0),
        gripper: 0.0,
    };

    /// 从 7 维行向量构造：`[dx, dy, dz, rx, ry, rz, gripper]`
    pub fn from_row(row: &[f64; ACTION_DIM]) -> Self {
        DeltaAction {
            dpos: Vector3::new(row[0], row[1], row[2]),
            drot_xyz: Vector3::new(row[3], row[4], row[5]),
            gripper: row[6],
        }
    }

    /// 转回 7 维行向量
    pub fn to_row(&self) -> [f64; ACTION_DIM] {
        [
            self.dpos.x,
            self.dpos.y,
            self.dpos.z,
            self.drot_xyz.x,
            self.drot_xyz.y,
            self.drot_xyz.z,
            self.gripper,
        ]
    }

    /// 把本行解释为**绝对**位姿（非增量模式下使用）
    ///
    /// 行布局同上，但前 6 维是绝对位置和 zyx 欧拉角。
    pub fn as_absolute_pose(&self) -> TargetPose {
        TargetPose::new(self.dpos, self.drot_xyz, self.gripper)
    }

    /// 抑制旋转分量中的推理抖动
    ///
    /// 幅值 ≤ `eps` 的旋转分量归零，防止策略输出的数值噪声
    /// 被当作真实旋转执行。
    pub fn suppress_rotation_jitter(&mut self, eps: f64) {
        for i in 0..3 {
            if self.drot_xyz[i].abs() <= eps {
                self.drot_xyz[i] = 0.0;
            }
        }
    }
}

/// 一次策略推理返回的动作批
///
/// 第 i 行对应最近一次观测时间戳之后的第 i 个控制节拍。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionBatch {
    rows: Vec<DeltaAction>,
}

impl ActionBatch {
    /// 从行向量序列构造
    pub fn from_rows(rows: impl IntoIterator<Item = [f64; ACTION_DIM]>) -> Self {
        ActionBatch {
            rows: rows.into_iter().map(|r| DeltaAction::from_row(&r)).collect(),
        }
    }

    /// 从动作序列构造
    pub fn from_actions(rows: Vec<DeltaAction>) -> Self {
        ActionBatch { rows }
    }

    /// 行数
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 截断到前 `n` 行
    pub fn truncate(&mut self, n: usize) {
        self.rows.truncate(n);
    }

    /// 行访问
    pub fn rows(&self) -> &[DeltaAction] {
        &self.rows
    }

    /// 行的可变访问（用于抖动抑制）
    pub fn rows_mut(&mut self) -> &mut [DeltaAction] {
        &mut self.rows
    }
}

/// 带时间戳的指令记录，动作队列的元素
///
/// 入队后不可变。`timestamp` 是绝对墙钟时间（epoch 秒），
/// 即该指令**应当被执行**的时刻。
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    /// 绝对目标位姿（四元数形式）
    pub pose: QuatPose,
    /// 产生该位姿的原始相对指令（用于记录/观测回放）
    pub raw: DeltaAction,
    /// 计划执行时刻（epoch 秒）
    pub timestamp: f64,
}
