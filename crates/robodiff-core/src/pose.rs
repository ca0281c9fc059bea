//! 位姿表示与旋转合成
//!
//! 末端位姿有两种表示：
//! - [`TargetPose`]：位置 + **ZYX 欧拉角**，积分链内部使用；
//! - [`QuatPose`]：位置 + 单位四元数，跨动作队列边界（执行器/机器人接口）使用。
//!
//! # 欧拉角约定
//!
//! | 用途 | 顺序 | 说明 |
//! |------|------|------|
//! | 增量旋转 | 外旋 xyz | `R = Rz(c)·Ry(b)·Rx(a)` |
//! | 绝对姿态 | 外旋 zyx | `R = Rx(c)·Ry(b)·Rz(a)` |
//!
//! 旋转合成永远在旋转群（四元数）中进行，**绝不**通过欧拉角相加，
//! 欧拉角相加在大角度下不满足旋转合成律。
//!
//! # 合成顺序
//!
//! [`integrate`] 把增量旋转**左乘**到上一姿态上：
//! `new = delta * prev`。左乘与右乘语义不同（固定系 vs 机体系），
//! 不可交换。

use nalgebra::{UnitQuaternion, Vector3};

use crate::action::DeltaAction;

/// 万向节锁判定阈值（|sin(pitch)| 超过此值视为奇异）
const GIMBAL_LOCK_EPS: f64 = 1.0 - 1e-9;

/// 绝对目标位姿（欧拉角形式，积分链内部表示）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPose {
    /// 末端位置
    pub position: Vector3<f64>,
    /// 末端姿态（ZYX 欧拉角，弧度）
    pub euler_zyx: Vector3<f64>,
    /// 夹爪指令，[0, 1]（0 = 全开）
    pub gripper: f64,
}

impl TargetPose {
    /// 创建新的目标位姿
    pub const fn new(position: Vector3<f64>, euler_zyx: Vector3<f64>, gripper: f64) -> Self {
        TargetPose {
            position,
            euler_zyx,
            gripper,
        }
    }

    /// 原点位姿（无旋转，夹爪全开）
    pub const ZERO: Self = TargetPose {
        position: Vector3::new(0.0, 0.0, 0.0),
        euler_zyx: Vector3::new(0.0, 0.0, 0.0),
        gripper: 0.0,
    };

    /// 姿态的四元数形式
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        quat_from_euler_zyx(&self.euler_zyx)
    }

    /// 转换为跨队列边界的四元数形式
    pub fn to_quat_pose(&self) -> QuatPose {
        QuatPose {
            position: self.position,
            orientation: self.orientation(),
            gripper: self.gripper,
        }
    }
}

/// 绝对目标位姿（四元数形式，队列边界表示）
///
/// 执行器和机器人接口只接受此形式，避免欧拉角的歧义传播到硬件层。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuatPose {
    /// 末端位置
    pub position: Vector3<f64>,
    /// 末端姿态（单位四元数）
    pub orientation: UnitQuaternion<f64>,
    /// 夹爪指令，[0, 1]
    pub gripper: f64,
}

impl QuatPose {
    /// 转回欧拉角形式
    pub fn to_target_pose(&self) -> TargetPose {
        TargetPose {
            position: self.position,
            euler_zyx: euler_zyx_from_quat(&self.orientation),
            gripper: self.gripper,
        }
    }
}

/// 从外旋 xyz 欧拉角构造四元数
///
/// `R = Rz(c)·Ry(b)·Rx(a)`，与增量旋转的约定一致。
pub fn quat_from_euler_xyz(euler_xyz: &Vector3<f64>) -> UnitQuaternion<f64> {
    // nalgebra 的 from_euler_angles(roll, pitch, yaw) 即 Rz(yaw)·Ry(pitch)·Rx(roll)
    UnitQuaternion::from_euler_angles(euler_xyz.x, euler_xyz.y, euler_xyz.z)
}

/// 从外旋 zyx 欧拉角构造四元数
///
/// `R = Rx(c)·Ry(b)·Rz(a)`，其中 `(a, b, c) = euler_zyx`。
pub fn quat_from_euler_zyx(euler_zyx: &Vector3<f64>) -> UnitQuaternion<f64> {
    let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), euler_zyx.x);
    let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), euler_zyx.y);
    let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), euler_zyx.z);
    qx * qy * qz
}

/// 从四元数提取外旋 zyx 欧拉角
///
/// [`quat_from_euler_zyx`] 的逆运算。对 `R = Rx(c)·Ry(b)·Rz(a)`：
///
/// ```text
/// m02 = sin(b)
/// m00 = cos(b)·cos(a),  m01 = -cos(b)·sin(a)
/// m22 = cos(c)·cos(b),  m12 = -sin(c)·cos(b)
/// ```
///
/// # 万向节锁
///
/// `|sin(b)| ≈ 1` 时 a 和 c 不再独立，约定 `c = 0` 并把全部绕轴
/// 旋转归入 a。积分链在锁附近会损失一个自由度，这是欧拉角
/// 表示的固有性质。
pub fn euler_zyx_from_quat(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let m = q.to_rotation_matrix().into_inner();

    let sin_b = m[(0, 2)].clamp(-1.0, 1.0);
    if sin_b.abs() >= GIMBAL_LOCK_EPS {
        // 奇异位形：c 置零
        let a = m[(1, 0)].atan2(m[(1, 1)]);
        return Vector3::new(a, sin_b.asin(), 0.0);
    }

    let a = (-m[(0, 1)]).atan2(m[(0, 0)]);
    let b = sin_b.asin();
    let c = (-m[(1, 2)]).atan2(m[(2, 2)]);
    Vector3::new(a, b, c)
}

/// 把一个增量动作积分到上一绝对位姿上
///
/// - 位置：`new.pos = prev.pos + delta.dpos`
/// - 姿态：`new.rot = delta.rot * prev.rot`（增量左乘，旋转群内合成）
/// - 夹爪：`new.gripper = delta.gripper`（**覆盖**，不累加）
///
/// 纯函数，无副作用。遥操作路径和策略路径共用同一实现，
/// 保证两种模式下指令语义完全一致。
pub fn integrate(prev: &TargetPose, delta: &DeltaAction) -> TargetPose {
    let drot = quat_from_euler_xyz(&delta.drot_xyz);
    let rot = drot * quat_from_euler_zyx(&prev.euler_zyx);

    TargetPose {
        position: prev.position + delta.dpos,
        euler_zyx: euler_zyx_from_quat(&rot),
        gripper: delta.gripper,
    }
}

/// 夹爪指令钳位到 [0, 1]
///
/// 幂等：`clamp_gripper(clamp_gripper(x)) == clamp_gripper(x)`。
#[inline]
pub fn clamp_gripper(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-9;

    fn assert_vec3_eq(a: &Vector3<f64>, b: &Vector3<f64>) {
        for i in 0..3 {
            assert!(
                (a[i] - b[i]).abs() < 1e-6,
                "component {} mismatch: {} vs {}",
                i,
                a[i],
                b[i]
            );
        }
    }

    #[test]
    fn test_euler_zyx_round_trip() {
        let cases = [
            Vector3::new(0.3, -0.4, 0.9),
            Vector3::new(-1.2, 0.8, -0.1),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(3.0, 0.2, -2.9),
        ];
        for euler in cases {
            let q = quat_from_euler_zyx(&euler);
            let back = euler_zyx_from_quat(&q);
            // 角度本身可能差 2π，通过旋转等价性比较
            let q2 = quat_from_euler_zyx(&back);
            assert!(
                q.angle_to(&q2) < EPS,
                "round trip changed rotation: {:?} -> {:?}",
                euler,
                back
            );
        }
    }

    #[test]
    fn test_euler_xyz_matches_axis_composition() {
        // 外旋 xyz：R = Rz(c)·Ry(b)·Rx(a)
        let euler = Vector3::new(0.2, -0.5, 1.1);
        let q = quat_from_euler_xyz(&euler);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), euler.z)
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), euler.y)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), euler.x);
        assert!(q.angle_to(&expected) < EPS);
    }

    /// 90° 增量 × 90° 先验：左乘与右乘结果可区分
    #[test]
    fn test_composition_order_is_left() {
        // 先验姿态：绕 z 轴 90°（zyx 欧拉角 (π/2, 0, 0)）
        let prev = TargetPose::new(
            Vector3::zeros(),
            Vector3::new(FRAC_PI_2, 0.0, 0.0),
            0.0,
        );
        // 增量：绕 x 轴 90°（xyz 欧拉角 (π/2, 0, 0)）
        let delta = DeltaAction {
            dpos: Vector3::zeros(),
            drot_xyz: Vector3::new(FRAC_PI_2, 0.0, 0.0),
            gripper: 0.0,
        };

        let result = integrate(&prev, &delta);

        // 左乘 Rx(90°)·Rz(90°) 的 zyx 欧拉角为 (π/2, 0, π/2)
        assert_vec3_eq(
            &result.euler_zyx,
            &Vector3::new(FRAC_PI_2, 0.0, FRAC_PI_2),
        );

        // 右乘结果（Rz·Rx）与之不同，确认顺序语义未被交换
        let right = quat_from_euler_zyx(&prev.euler_zyx) * quat_from_euler_xyz(&delta.drot_xyz);
        let left = result.orientation();
        assert!(left.angle_to(&right) > 0.1);
    }

    #[test]
    fn test_integrate_position_adds() {
        let prev = TargetPose::new(Vector3::new(1.0, 2.0, 3.0), Vector3::zeros(), 0.3);
        let delta = DeltaAction {
            dpos: Vector3::new(0.1, -0.2, 0.3),
            drot_xyz: Vector3::zeros(),
            gripper: 0.3,
        };
        let out = integrate(&prev, &delta);
        assert_vec3_eq(&out.position, &Vector3::new(1.1, 1.8, 3.3));
    }

    #[test]
    fn test_integrate_gripper_overwrites() {
        let prev = TargetPose::new(Vector3::zeros(), Vector3::zeros(), 0.9);
        let delta = DeltaAction {
            dpos: Vector3::zeros(),
            drot_xyz: Vector3::zeros(),
            gripper: 0.2,
        };
        let out = integrate(&prev, &delta);
        // 覆盖而不是 0.9 + 0.2
        assert!((out.gripper - 0.2).abs() < EPS);
    }

    #[test]
    fn test_integrate_zero_delta_is_identity() {
        let prev = TargetPose::new(
            Vector3::new(0.5, -0.1, 0.8),
            Vector3::new(0.4, -0.2, 1.0),
            0.7,
        );
        let delta = DeltaAction {
            dpos: Vector3::zeros(),
            drot_xyz: Vector3::zeros(),
            gripper: prev.gripper,
        };
        let out = integrate(&prev, &delta);
        assert_vec3_eq(&out.position, &prev.position);
        assert!(out.orientation().angle_to(&prev.orientation()) < EPS);
    }

    #[test]
    fn test_clamp_gripper_idempotent() {
        for x in [-3.0, -0.1, 0.0, 0.4, 1.0, 1.5, 42.0, f64::NEG_INFINITY] {
            let once = clamp_gripper(x);
            assert!((0.0..=1.0).contains(&once));
            assert_eq!(clamp_gripper(once), once);
        }
    }

    #[test]
    fn test_quat_pose_round_trip() {
        let pose = TargetPose::new(
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(0.5, -0.3, 0.7),
            0.6,
        );
        let back = pose.to_quat_pose().to_target_pose();
        assert_vec3_eq(&back.position, &pose.position);
        assert!(back.to_quat_pose().orientation.angle_to(&pose.orientation()) < EPS);
        assert!((back.gripper - pose.gripper).abs() < EPS);
    }

    #[test]
    fn test_gimbal_lock_does_not_produce_nan() {
        let euler = Vector3::new(0.3, FRAC_PI_2, 0.4);
        let q = quat_from_euler_zyx(&euler);
        let back = euler_zyx_from_quat(&q);
        assert!(back.iter().all(|v| v.is_finite()));
        // 奇异位形下仍保持旋转等价
        let q2 = quat_from_euler_zyx(&back);
        assert!(q.angle_to(&q2) < 1e-6);
    }
}
