//! 推理调度器
//!
//! 每 `steps_per_inference` 个控制节拍运行一次，把一次策略推理的
//! 动作批转换为带绝对截止时刻的指令序列：
//!
//! 1. 截断到推理视界
//! 2. 抑制旋转分量的数值抖动
//! 3. 增量模式下沿积分链展开为绝对位姿
//! 4. 逐行计算截止时刻并做新鲜度过滤
//! 5. 全部过期时走降级路径（保留末行，重排到下一节拍）
//!
//! 产出的批次由会话层**原子替换**进动作队列：调度器的最新计划
//! 永远整体取代在途的旧计划。
//!
//! # 积分链的种子
//!
//! 回合内第一次推理从观测到的末端位姿起链；之后每次都从上一批
//! **最后一行**的积分结果起链，而不是重新读观测。指令链由此与
//! 可能滞后的观测回读解耦，避免观测噪声逐批累积进目标轨迹。

use smallvec::smallvec;
use tracing::debug;

use robodiff_core::{
    ActionBatch, CommandRecord, EnvError, EvalConfig, Observation, PolicyError, TargetPose,
    clamp_gripper, integrate,
};
use robodiff_driver::RecordBatch;

use crate::error::SessionError;

/// 旋转抖动阈值（弧度）
///
/// 幅值不超过该值的旋转分量视为推理噪声，归零后再积分。
pub const ROTATION_JITTER_EPS: f64 = 0.01;

/// 一次调度的产出
#[derive(Debug, Clone)]
pub struct InferencePlan {
    /// 存活的指令记录，按截止时刻升序
    pub records: RecordBatch,
    /// 本周期是否走了超预算降级路径
    pub over_budget: bool,
    /// 新鲜度过滤丢弃的行数
    pub stale_dropped: usize,
}

/// 推理调度器
#[derive(Debug, Clone)]
pub struct InferenceScheduler {
    config: EvalConfig,
    /// 积分链尾：上一批（过滤前）最后一行的绝对位姿
    chain_tail: Option<TargetPose>,
}

impl InferenceScheduler {
    /// 创建新调度器
    pub fn new(config: EvalConfig) -> Self {
        InferenceScheduler {
            config,
            chain_tail: None,
        }
    }

    /// 重置积分链（每个策略回合开始时调用）
    ///
    /// 下一次 [`plan`](Self::plan) 将从新鲜观测重新起链。
    pub fn reset(&mut self) {
        self.chain_tail = None;
    }

    /// 把一个推理批转换为指令计划
    ///
    /// # 参数
    ///
    /// - `obs`: 本次推理使用的观测（取其最新时间戳作为截止时刻基准）
    /// - `batch`: 策略返回的动作批，行数必须 ≥ 推理视界
    /// - `latest_executed`: 执行前沿（共享时序状态读出）
    /// - `eval_start`: 当前回合起始时刻（epoch 秒）
    /// - `now`: 当前墙钟时刻（epoch 秒）
    ///
    /// # 超预算降级
    ///
    /// 所有行都被新鲜度过滤淘汰说明推理耗尽了整批的时间预算。
    /// 此时保留末行，把它重排到严格晚于 `now` 的下一个节拍边界，
    /// 以一次可见的跳步换取前向进展。这不是错误路径。
    pub fn plan(
        &mut self,
        obs: &Observation,
        mut batch: ActionBatch,
        latest_executed: f64,
        eval_start: f64,
        now: f64,
    ) -> Result<InferencePlan, SessionError> {
        let steps = self.config.steps_per_inference;
        let dt = self.config.dt();

        if batch.len() < steps {
            return Err(PolicyError::ShortBatch {
                needed: steps,
                actual: batch.len(),
            }
            .into());
        }
        batch.truncate(steps);

        let obs_timestamp = obs.latest_timestamp().ok_or(EnvError::EmptyObservation)?;

        for row in batch.rows_mut() {
            row.suppress_rotation_jitter(ROTATION_JITTER_EPS);
        }

        // 展开为绝对位姿
        let poses: Vec<TargetPose> = if self.config.delta_action {
            let seed = match self.chain_tail {
                Some(tail) => tail,
                None => obs.latest_pose().ok_or(EnvError::EmptyObservation)?,
            };
            let mut poses = Vec::with_capacity(steps);
            let mut prev = seed;
            for row in batch.rows() {
                prev = integrate(&prev, row);
                poses.push(prev);
            }
            // 链尾取过滤前的整批末行：下一批由此起链
            self.chain_tail = Some(prev);
            poses
        } else {
            batch.rows().iter().map(|row| row.as_absolute_pose()).collect()
        };

        // 逐行截止时刻：行 i 对应观测之后第 (i + action_offset) 个节拍
        let deadlines: Vec<f64> = (0..steps)
            .map(|i| (i + self.config.action_offset) as f64 * dt + obs_timestamp)
            .collect();

        // 新鲜度过滤：只保留严格晚于执行前沿（含链路余量）的行
        let frontier = latest_executed + self.config.exec_latency_allowance;
        let survivors: Vec<usize> = (0..steps).filter(|&i| deadlines[i] > frontier).collect();

        if survivors.is_empty() {
            // 超预算：重排末行到下一个严格未来的节拍边界
            let mut step_idx = ((now - eval_start) / dt).ceil();
            let mut timestamp = eval_start + step_idx * dt;
            while timestamp <= now {
                step_idx += 1.0;
                timestamp = eval_start + step_idx * dt;
            }

            let mut pose = poses[steps - 1];
            pose.gripper = clamp_gripper(pose.gripper);

            debug!(
                slack_s = timestamp - now,
                "All rows stale, rescheduling final row"
            );

            return Ok(InferencePlan {
                records: smallvec![CommandRecord {
                    pose: pose.to_quat_pose(),
                    raw: batch.rows()[steps - 1],
                    timestamp,
                }],
                over_budget: true,
                stale_dropped: steps - 1,
            });
        }

        let stale_dropped = steps - survivors.len();
        let records: RecordBatch = survivors
            .into_iter()
            .map(|i| {
                let mut pose = poses[i];
                pose.gripper = clamp_gripper(pose.gripper);
                CommandRecord {
                    pose: pose.to_quat_pose(),
                    raw: batch.rows()[i],
                    timestamp: deadlines[i],
                }
            })
            .collect();

        Ok(InferencePlan {
            records,
            over_budget: false,
            stale_dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use robodiff_core::ACTION_DIM;

    fn obs_at(timestamp: f64, pose: TargetPose) -> Observation {
        Observation {
            timestamps: vec![timestamp - 0.033, timestamp],
            eef_pos: vec![pose.position, pose.position],
            eef_rot: vec![pose.euler_zyx, pose.euler_zyx],
            gripper: vec![pose.gripper, pose.gripper],
            ..Default::default()
        }
    }

    fn forward_batch(rows: usize) -> ActionBatch {
        ActionBatch::from_rows((0..rows).map(|_| [0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]))
    }

    fn config_5hz() -> EvalConfig {
        EvalConfig {
            frequency: 5.0,
            steps_per_inference: 6,
            ..Default::default()
        }
    }

    /// 标称情形：6 行前向增量，全部存活
    #[test]
    fn test_plan_integrates_and_schedules_whole_horizon() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs_ts = 1000.0;
        let obs = obs_at(obs_ts, TargetPose::ZERO);

        let plan = scheduler
            .plan(&obs, forward_batch(6), 0.0, obs_ts - 1.0, obs_ts)
            .unwrap();

        assert!(!plan.over_budget);
        assert_eq!(plan.stale_dropped, 0);
        assert_eq!(plan.records.len(), 6);
        for (i, record) in plan.records.iter().enumerate() {
            // 位置沿 x 轴逐行前进 0.1
            let expected_x = 0.1 * (i + 1) as f64;
            assert!(
                (record.pose.position.x - expected_x).abs() < 1e-9,
                "row {i}: {} vs {expected_x}",
                record.pose.position.x
            );
            // 截止时刻从观测时间戳起按 dt = 0.2 等距
            let expected_ts = obs_ts + i as f64 * 0.2;
            assert!((record.timestamp - expected_ts).abs() < 1e-9);
        }
    }

    /// 截止时刻在行号上严格递增
    #[test]
    fn test_deadlines_strictly_increasing() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs = obs_at(500.0, TargetPose::ZERO);
        let plan = scheduler.plan(&obs, forward_batch(6), 0.0, 499.0, 500.0).unwrap();

        for window in plan.records.windows(2) {
            assert!(window[1].timestamp > window[0].timestamp);
        }
    }

    /// 新鲜度过滤：执行前沿越过部分行时只丢前缀
    #[test]
    fn test_freshness_filter_drops_stale_prefix() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs_ts = 1000.0;
        let obs = obs_at(obs_ts, TargetPose::ZERO);

        // 前沿落在第 2、3 行之间：行 0..=2 过期（0.4 + 0.01 余量淘汰行 2）
        let latest_executed = obs_ts + 0.4;
        let plan = scheduler
            .plan(&obs, forward_batch(6), latest_executed, obs_ts - 1.0, obs_ts)
            .unwrap();

        assert!(!plan.over_budget);
        assert_eq!(plan.stale_dropped, 3);
        assert_eq!(plan.records.len(), 3);
        // 存活行保持原截止时刻与原位姿（行 3 的位置是 0.4）
        assert!((plan.records[0].timestamp - (obs_ts + 0.6)).abs() < 1e-9);
        assert!((plan.records[0].pose.position.x - 0.4).abs() < 1e-9);
    }

    /// 全部过期：恰好保留一行，重排到严格未来的节拍边界
    #[test]
    fn test_over_budget_keeps_exactly_one_future_row() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs_ts = 1000.0;
        let obs = obs_at(obs_ts, TargetPose::ZERO);
        let eval_start = obs_ts - 1.0;

        // 前沿越过整批（最后一行截止 obs_ts + 1.0）
        let latest_executed = obs_ts + 2.0;
        let now = obs_ts + 2.3;
        let plan = scheduler
            .plan(&obs, forward_batch(6), latest_executed, eval_start, now)
            .unwrap();

        assert!(plan.over_budget);
        assert_eq!(plan.records.len(), 1);
        let record = &plan.records[0];
        // 严格晚于 now，且落在 eval_start + k*dt 网格上
        assert!(record.timestamp > now);
        let steps_from_start = (record.timestamp - eval_start) / 0.2;
        assert!((steps_from_start - steps_from_start.round()).abs() < 1e-9);
        assert!(record.timestamp - now <= 0.2 + 1e-9);
        // 位姿取整批积分的末行（x = 0.6）
        assert!((record.pose.position.x - 0.6).abs() < 1e-9);
    }

    /// now 恰好落在节拍边界上时，重排仍然严格未来
    #[test]
    fn test_over_budget_on_exact_tick_boundary() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs_ts = 1000.0;
        let obs = obs_at(obs_ts, TargetPose::ZERO);
        let eval_start = obs_ts - 1.0;
        let now = eval_start + 20.0 * 0.2; // 正好第 20 个节拍

        let plan = scheduler
            .plan(&obs, forward_batch(6), obs_ts + 10.0, eval_start, now)
            .unwrap();

        assert!(plan.records[0].timestamp > now);
    }

    /// 第二次推理从上一批链尾起链，而不是重新读观测
    #[test]
    fn test_chain_seeds_from_previous_tail() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs_ts = 1000.0;
        let obs = obs_at(obs_ts, TargetPose::ZERO);
        scheduler.plan(&obs, forward_batch(6), 0.0, obs_ts - 1.0, obs_ts).unwrap();

        // 第二次观测声称末端仍在原点（滞后回读），但链尾在 x = 0.6
        let stale_obs = obs_at(obs_ts + 1.2, TargetPose::ZERO);
        let plan = scheduler
            .plan(&stale_obs, forward_batch(6), 0.0, obs_ts - 1.0, obs_ts + 1.2)
            .unwrap();

        assert!((plan.records[0].pose.position.x - 0.7).abs() < 1e-9);
        assert!((plan.records[5].pose.position.x - 1.2).abs() < 1e-9);
    }

    /// reset 后重新从观测起链
    #[test]
    fn test_reset_reseeds_from_observation() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs = obs_at(1000.0, TargetPose::ZERO);
        scheduler.plan(&obs, forward_batch(6), 0.0, 999.0, 1000.0).unwrap();

        scheduler.reset();
        let obs2 = obs_at(
            2000.0,
            TargetPose::new(Vector3::new(5.0, 0.0, 0.0), Vector3::zeros(), 0.0),
        );
        let plan = scheduler.plan(&obs2, forward_batch(6), 0.0, 1999.0, 2000.0).unwrap();
        assert!((plan.records[0].pose.position.x - 5.1).abs() < 1e-9);
    }

    /// 旋转抖动抑制在积分前生效
    #[test]
    fn test_rotation_jitter_suppressed_before_integration() {
        let mut scheduler = InferenceScheduler::new(EvalConfig {
            steps_per_inference: 1,
            ..config_5hz()
        });
        let obs = obs_at(1000.0, TargetPose::ZERO);
        let batch = ActionBatch::from_rows([[0.0, 0.0, 0.0, 0.009, -0.005, 0.0, 0.0]]);

        let plan = scheduler.plan(&obs, batch, 0.0, 999.0, 1000.0).unwrap();

        let record = &plan.records[0];
        // 姿态不变（抖动被归零），原始动作也携带归零后的值
        assert!(record.pose.orientation.angle() < 1e-12);
        assert_eq!(record.raw.drot_xyz, Vector3::zeros());
    }

    /// 夹爪越界值被钳位，且钳位只作用于位姿
    #[test]
    fn test_gripper_clamped_on_survivors() {
        let mut scheduler = InferenceScheduler::new(EvalConfig {
            steps_per_inference: 2,
            ..config_5hz()
        });
        let obs = obs_at(1000.0, TargetPose::ZERO);
        let batch = ActionBatch::from_rows([
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.7],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -0.3],
        ]);

        let plan = scheduler.plan(&obs, batch, 0.0, 999.0, 1000.0).unwrap();

        assert_eq!(plan.records[0].pose.gripper, 1.0);
        assert_eq!(plan.records[1].pose.gripper, 0.0);
        // 原始动作保持策略原值，用于无损记录
        assert_eq!(plan.records[0].raw.gripper, 1.7);
    }

    /// 行数不足一个视界是策略契约违例
    #[test]
    fn test_short_batch_is_an_error() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs = obs_at(1000.0, TargetPose::ZERO);
        let result = scheduler.plan(&obs, forward_batch(4), 0.0, 999.0, 1000.0);
        assert!(matches!(
            result,
            Err(SessionError::Policy(PolicyError::ShortBatch { needed: 6, actual: 4 }))
        ));
    }

    /// 多余的行被截断
    #[test]
    fn test_long_batch_truncated_to_horizon() {
        let mut scheduler = InferenceScheduler::new(config_5hz());
        let obs = obs_at(1000.0, TargetPose::ZERO);
        let plan = scheduler.plan(&obs, forward_batch(16), 0.0, 999.0, 1000.0).unwrap();
        assert_eq!(plan.records.len(), 6);
        assert!((plan.records[5].pose.position.x - 0.6).abs() < 1e-9);
    }

    /// 绝对模式：行直接作为目标位姿，不积分
    #[test]
    fn test_absolute_mode_skips_integration() {
        let mut scheduler = InferenceScheduler::new(EvalConfig {
            delta_action: false,
            steps_per_inference: 2,
            ..config_5hz()
        });
        let obs = obs_at(
            1000.0,
            TargetPose::new(Vector3::new(9.0, 9.0, 9.0), Vector3::zeros(), 0.0),
        );
        let batch = ActionBatch::from_rows([
            [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.5],
            [4.0, 5.0, 6.0, 0.0, 0.0, 0.0, 0.5],
        ]);

        let plan = scheduler.plan(&obs, batch, 0.0, 999.0, 1000.0).unwrap();

        assert!((plan.records[0].pose.position.x - 1.0).abs() < 1e-12);
        assert!((plan.records[1].pose.position.z - 6.0).abs() < 1e-12);
    }

    const _: () = assert!(ACTION_DIM == 7);
}
