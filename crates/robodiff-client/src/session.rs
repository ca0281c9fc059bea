//! 控制模式状态机与会话循环
//!
//! 会话在三个显式状态之间切换：
//!
//! ```text
//!          StartPolicy              StopPolicy / 超时
//!   Human ─────────────► Policy ──────────────────────► Human
//!     │                     │
//!     │ Quit                │ 中断（Ctrl-C）
//!     ▼                     ▼
//!  Terminated ◄─────────────┘
//! ```
//!
//! 每个转移的副作用（清空队列、关闭回合、重置策略与积分链）都在
//! 转移点显式执行，而不是散落在循环的 break 路径里。
//!
//! # 节拍锚定
//!
//! 两个内层循环都以**绝对时间表**定节拍：目标周期终点取
//! `t_start + k * dt`（策略循环按推理视界步进 k），再精确等待到该
//! 时刻。长时间运行不会累积逐周期漂移。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use spin_sleep::SpinSleeper;
use tracing::{debug, error, info, warn};

use robodiff_core::{
    EvalConfig, MotionDevice, OperatorCommand, OperatorInput, Policy, RobotEnv,
};
use robodiff_driver::{
    ActionExecutor, ActionQueue, ExecutorConfig, RigMetrics, SharedTiming, epoch_now,
    wait_until_epoch,
};

use crate::error::SessionError;
use crate::inference::InferenceScheduler;
use crate::teleop::TeleopSampler;

/// 控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// 操作员通过输入设备控制
    Human,
    /// 策略控制（回合进行中）
    Policy,
    /// 会话结束
    Terminated,
}

/// 人控循环的退出原因
enum HumanExit {
    /// 控制权移交给策略
    StartPolicy,
    /// 退出程序
    Quit,
}

/// 策略回合的退出原因
enum PolicyExit {
    /// 操作员收回控制权
    Stopped,
    /// 回合时长超过上限
    TimedOut,
    /// 操作员中断（Ctrl-C）
    Interrupted,
}

/// 评估会话
///
/// 泛型注入三个协作者：输入设备 `D`、策略 `P`、操作员输入 `O`；
/// 环境以 `Arc<dyn RobotEnv>` 注入（执行线程共享同一实例）。
pub struct EvalSession<D, P, O>
where
    D: MotionDevice,
    P: Policy,
    O: OperatorInput,
{
    env: Arc<dyn RobotEnv>,
    device: D,
    policy: P,
    operator: O,
    config: EvalConfig,
    queue: ActionQueue,
    timing: Arc<SharedTiming>,
    metrics: Arc<RigMetrics>,
    scheduler: InferenceScheduler,
    interrupted: Arc<AtomicBool>,
    executor: Option<ActionExecutor>,
    sleeper: SpinSleeper,
}

impl<D, P, O> EvalSession<D, P, O>
where
    D: MotionDevice,
    P: Policy,
    O: OperatorInput,
{
    /// 创建会话（校验配置）
    pub fn new(
        env: Arc<dyn RobotEnv>,
        device: D,
        policy: P,
        operator: O,
        config: EvalConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let scheduler = InferenceScheduler::new(config.clone());
        Ok(EvalSession {
            env,
            device,
            policy,
            operator,
            config,
            queue: ActionQueue::new(),
            timing: Arc::new(SharedTiming::new()),
            metrics: Arc::new(RigMetrics::new()),
            scheduler,
            interrupted: Arc::new(AtomicBool::new(false)),
            executor: None,
            sleeper: SpinSleeper::default(),
        })
    }

    /// 中断标志句柄（交给 Ctrl-C 处理器置位）
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// 运行时指标句柄
    pub fn metrics(&self) -> Arc<RigMetrics> {
        self.metrics.clone()
    }

    /// 动作队列句柄（诊断用，克隆共享同一底层队列）
    pub fn queue_handle(&self) -> ActionQueue {
        self.queue.clone()
    }

    /// 运行整个会话直到终止
    ///
    /// 执行线程随会话启动一次、停止一次。操作员发起的退出和中断
    /// 都走 `Ok(())`；只有策略/硬件调用失败返回错误。
    pub fn run(&mut self) -> Result<(), SessionError> {
        let executor = ActionExecutor::spawn(
            self.env.clone(),
            self.queue.clone(),
            self.timing.clone(),
            self.metrics.clone(),
            ExecutorConfig::new(self.config.dt()),
        )?;
        self.executor = Some(executor);

        let result = self.run_inner();

        // 无论以何种路径退出都停掉执行线程
        if let Some(mut executor) = self.executor.take()
            && let Err(e) = executor.stop()
        {
            error!("Executor teardown failed: {e}");
        }

        let snapshot = self.metrics.snapshot();
        info!(
            records_executed = snapshot.records_executed,
            batches_planned = snapshot.batches_planned,
            over_budget_cycles = snapshot.over_budget_cycles,
            "Session finished"
        );
        result
    }

    fn run_inner(&mut self) -> Result<(), SessionError> {
        self.warmup()?;
        info!("Ready");

        let mut mode = ControlMode::Human;
        loop {
            mode = match mode {
                ControlMode::Human => match self.human_loop()? {
                    HumanExit::StartPolicy => ControlMode::Policy,
                    HumanExit::Quit => ControlMode::Terminated,
                },
                ControlMode::Policy => match self.policy_episode()? {
                    PolicyExit::Stopped | PolicyExit::TimedOut => ControlMode::Human,
                    PolicyExit::Interrupted => ControlMode::Terminated,
                },
                ControlMode::Terminated => return Ok(()),
            };
        }
    }

    /// 策略预热
    ///
    /// 首次推理包含模型加载/编译等一次性开销，放在控制循环外做，
    /// 避免第一个策略回合吃掉几个周期的预算。
    fn warmup(&mut self) -> Result<(), SessionError> {
        info!("Warming up policy inference");
        let obs = self.env.get_obs()?;
        self.policy.reset();
        let batch = self.policy.predict_action(&obs)?;
        if batch.len() < self.config.steps_per_inference {
            warn!(
                rows = batch.len(),
                horizon = self.config.steps_per_inference,
                "Warmup batch shorter than inference horizon"
            );
        }
        debug!(rows = batch.len(), "Warmup inference done");
        Ok(())
    }

    /// 执行线程健康检查
    fn check_executor(&self) -> Result<(), SessionError> {
        match &self.executor {
            Some(executor) if executor.is_healthy() => Ok(()),
            _ => Err(robodiff_driver::DriverError::ExecutorFaulted(
                "exec_actions failed on the executor thread".to_string(),
            )
            .into()),
        }
    }

    /// 人控循环
    ///
    /// 每节拍：泵送观测 → 处理操作员命令 → 等到采样时刻 → 采样
    /// 设备并积分 → 入队（时间戳提前一个周期）→ 等到节拍终点。
    fn human_loop(&mut self) -> Result<HumanExit, SessionError> {
        info!("Human in control");

        let state = self.env.get_robot_state()?;
        let mut sampler = TeleopSampler::new(state.to_target_pose());
        let mut rng = rand::thread_rng();

        let dt = self.config.dt();
        let t_start = Instant::now();
        let mut iter_idx: u64 = 0;

        loop {
            self.check_executor()?;

            let t_cycle_end = t_start + Duration::from_secs_f64((iter_idx + 1) as f64 * dt);
            let t_sample = t_cycle_end - Duration::from_secs_f64(self.config.command_latency);

            // 泵送观测：驱动环境的录制缓冲前进（可视化由环境协作者负责）
            let _obs = self.env.get_obs()?;

            if self.interrupted.load(Ordering::Acquire) {
                info!("Interrupted");
                self.queue.flush();
                self.env.end_episode()?;
                return Ok(HumanExit::Quit);
            }

            match self.operator.poll() {
                Some(OperatorCommand::Quit) => {
                    self.env.end_episode()?;
                    info!("Quit requested");
                    return Ok(HumanExit::Quit);
                },
                Some(OperatorCommand::StartPolicy) => {
                    return Ok(HumanExit::StartPolicy);
                },
                Some(OperatorCommand::ResetRobot) => {
                    self.env.reset_robot()?;
                    sampler.reset_to_home(self.env.home_pose(), &mut rng);
                    info!("Robot reset, initial pose randomized");
                },
                Some(OperatorCommand::StopPolicy) | None => {},
            }

            self.sleep_until(t_sample);

            let raw = sampler.sample(&self.device, &self.config);
            // 指令时间戳 = 节拍终点再加一个周期：给执行链路留流水线余量
            let timestamp = epoch_now() + secs_until(t_cycle_end) + dt;
            self.queue.push(sampler.command_record(raw, timestamp));

            self.sleep_until(t_cycle_end);
            iter_idx += 1;
        }
    }

    /// 一个策略回合
    ///
    /// 进入时重置策略与积分链、开启回合；退出路径（停止/超时/中断）
    /// 都先清空队列再关闭回合，保证执行线程不会对着已拆除的回合
    /// 继续下发指令。致命错误（策略/环境调用失败）同样先走这套
    /// 拆除流程再向上传播。
    fn policy_episode(&mut self) -> Result<PolicyExit, SessionError> {
        self.policy.reset();
        self.scheduler.reset();

        let dt = self.config.dt();
        let steps = self.config.steps_per_inference;

        let eval_t_start = epoch_now() + self.config.start_delay;
        self.timing.eval_start_time.store(eval_t_start);
        let t_start = Instant::now() + Duration::from_secs_f64(self.config.start_delay);

        self.env.start_episode(eval_t_start)?;
        // 提前 frame_latency 醒来，拿到最贴近回合起点的那一帧
        wait_until_epoch(&self.sleeper, eval_t_start - self.config.frame_latency);
        info!(episode = self.env.episode_count(), "Policy in control");

        let mut iter_idx: usize = 0;
        loop {
            let cycle_begin = Instant::now();
            if let Err(e) = self.check_executor() {
                self.abort_episode();
                return Err(e);
            }

            let t_cycle_end =
                t_start + Duration::from_secs_f64((iter_idx + steps) as f64 * dt);

            let obs = match self.env.get_obs() {
                Ok(obs) => obs,
                Err(e) => {
                    self.abort_episode();
                    return Err(e.into());
                },
            };
            if let Some(obs_ts) = obs.latest_timestamp() {
                debug!(
                    obs_step = (obs_ts - eval_t_start) / dt,
                    "Observation sampled"
                );
            }

            // 策略调用失败是致命错误：跳过一次推理会让机器人在
            // 超出控制预算的时间内失去指令，不做重试
            let batch = match self.policy.predict_action(&obs) {
                Ok(batch) => batch,
                Err(e) => {
                    self.abort_episode();
                    return Err(e.into());
                },
            };

            let latest_executed = self.timing.latest_executed_time.load();
            let plan = match self.scheduler.plan(
                &obs,
                batch,
                latest_executed,
                eval_t_start,
                epoch_now(),
            ) {
                Ok(plan) => plan,
                Err(e) => {
                    self.abort_episode();
                    return Err(e);
                },
            };

            self.metrics.batches_planned.fetch_add(1, Ordering::Relaxed);
            self.metrics
                .stale_rows_dropped
                .fetch_add(plan.stale_dropped as u64, Ordering::Relaxed);
            if plan.over_budget {
                self.metrics.over_budget_cycles.fetch_add(1, Ordering::Relaxed);
                warn!(
                    slack_s = plan.records[0].timestamp - epoch_now(),
                    "Inference over budget, degraded to single rescheduled action"
                );
            }

            // 最新计划整体取代在途旧计划
            let dropped = self.queue.replace(plan.records.clone());
            debug!(
                dropped,
                enqueued = plan.records.len(),
                "Action queue replaced"
            );
            for record in &plan.records {
                debug!(
                    step = (record.timestamp - eval_t_start) / dt,
                    "Action scheduled"
                );
            }

            if self.interrupted.load(Ordering::Acquire) {
                info!("Interrupted");
                self.queue.flush();
                self.env.end_episode()?;
                return Ok(PolicyExit::Interrupted);
            }

            if let Some(OperatorCommand::StopPolicy) = self.operator.poll() {
                self.queue.flush();
                self.env.end_episode()?;
                info!("Stopped, control handed back to human");
                return Ok(PolicyExit::Stopped);
            }

            if Instant::now().saturating_duration_since(t_start).as_secs_f64()
                > self.config.max_duration
            {
                self.queue.flush();
                self.env.end_episode()?;
                warn!("Terminated by episode timeout");
                return Ok(PolicyExit::TimedOut);
            }

            // 等待执行：下一个推理周期在 t_cycle_end - frame_latency
            self.sleep_until(
                t_cycle_end - Duration::from_secs_f64(self.config.frame_latency),
            );
            iter_idx += steps;

            if self.config.verbose {
                debug!(
                    hz = 1.0 / cycle_begin.elapsed().as_secs_f64(),
                    "Inference cycle frequency"
                );
            }
        }
    }

    /// 致命错误路径的回合拆除：清空队列，尽力关闭回合
    fn abort_episode(&mut self) {
        self.queue.flush();
        if let Err(e) = self.env.end_episode() {
            error!("Failed to close episode during abort: {e}");
        }
    }

    /// 精确等待到单调时钟上的目标时刻（已过则立即返回）
    fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            self.sleeper.sleep(deadline - now);
        }
    }
}

/// 当前时刻到目标时刻的带符号秒数（目标在过去时为负）
fn secs_until(deadline: Instant) -> f64 {
    let now = Instant::now();
    if deadline >= now {
        (deadline - now).as_secs_f64()
    } else {
        -(now - deadline).as_secs_f64()
    }
}
