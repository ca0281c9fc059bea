//! 模拟协作者
//!
//! 用于测试与 CLI 干跑（`--mock`）的环境/设备/策略/操作员实现。
//! 环境维护一个跟随已执行指令的末端位姿，观测直接从该位姿合成，
//! 不模拟任何动力学。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use robodiff_core::{
    ACTION_DIM, ActionBatch, DeltaAction, EnvError, MotionDevice, Observation, OperatorCommand,
    OperatorInput, Policy, PolicyError, QuatPose, RobotEnv, RobotState, TargetPose,
};
use robodiff_driver::epoch_now;

/// 一次 `exec_actions` 调用记录下的单条指令
#[derive(Debug, Clone)]
pub struct ExecutedAction {
    pub pose: QuatPose,
    pub raw: DeltaAction,
    pub timestamp: f64,
}

#[derive(Debug)]
struct MockEnvState {
    pose: TargetPose,
    executed: Vec<ExecutedAction>,
    episodes_started: usize,
    episodes_ended: usize,
    episode_open: bool,
}

/// 模拟机器人环境
///
/// 末端位姿在每次 `exec_actions` 后跳到指令目标；观测历史是当前
/// 位姿的 `n_obs_steps` 份拷贝，时间戳取调用时刻。
#[derive(Debug)]
pub struct MockEnv {
    state: Mutex<MockEnvState>,
    home: TargetPose,
    n_obs_steps: usize,
}

impl MockEnv {
    /// 以指定初始/复位位姿创建
    pub fn new(home: TargetPose, n_obs_steps: usize) -> Self {
        MockEnv {
            state: Mutex::new(MockEnvState {
                pose: home,
                executed: Vec::new(),
                episodes_started: 0,
                episodes_ended: 0,
                episode_open: false,
            }),
            home,
            n_obs_steps,
        }
    }

    /// 已执行指令的拷贝
    pub fn executed(&self) -> Vec<ExecutedAction> {
        self.state.lock().executed.clone()
    }

    /// 是否有开启中的回合
    pub fn episode_open(&self) -> bool {
        self.state.lock().episode_open
    }

    /// 已关闭的回合数
    pub fn episodes_ended(&self) -> usize {
        self.state.lock().episodes_ended
    }

    /// 当前末端位姿
    pub fn current_pose(&self) -> TargetPose {
        self.state.lock().pose
    }
}

impl Default for MockEnv {
    fn default() -> Self {
        MockEnv::new(TargetPose::ZERO, 2)
    }
}

impl RobotEnv for MockEnv {
    fn get_obs(&self) -> Result<Observation, EnvError> {
        let state = self.state.lock();
        let now = epoch_now();
        let n = self.n_obs_steps;
        Ok(Observation {
            // 历史采样按 30Hz 间隔向过去铺开
            timestamps: (0..n).map(|i| now - (n - 1 - i) as f64 / 30.0).collect(),
            eef_pos: vec![state.pose.position; n],
            eef_rot: vec![state.pose.euler_zyx; n],
            gripper: vec![state.pose.gripper; n],
            ..Default::default()
        })
    }

    fn get_robot_state(&self) -> Result<RobotState, EnvError> {
        let state = self.state.lock();
        Ok(RobotState {
            eef_pos: state.pose.position,
            eef_rot: state.pose.euler_zyx,
        })
    }

    fn exec_actions(
        &self,
        actions: &[QuatPose],
        delta_actions: &[DeltaAction],
        timestamps: &[f64],
    ) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        for ((pose, raw), &timestamp) in
            actions.iter().zip(delta_actions.iter()).zip(timestamps.iter())
        {
            state.executed.push(ExecutedAction {
                pose: *pose,
                raw: *raw,
                timestamp,
            });
        }
        if let Some(last) = actions.last() {
            state.pose = last.to_target_pose();
        }
        Ok(())
    }

    fn start_episode(&self, _start_time: f64) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        state.episodes_started += 1;
        state.episode_open = true;
        Ok(())
    }

    fn end_episode(&self) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        if state.episode_open {
            state.episode_open = false;
            state.episodes_ended += 1;
        }
        Ok(())
    }

    fn reset_robot(&self) -> Result<(), EnvError> {
        self.state.lock().pose = self.home;
        Ok(())
    }

    fn home_pose(&self) -> TargetPose {
        self.home
    }

    fn episode_count(&self) -> usize {
        self.state.lock().episodes_started
    }
}

/// 模拟输入设备（运动快照与按键可随时设置）
#[derive(Debug, Default)]
pub struct MockDevice {
    motion: Arc<Mutex<[f64; 6]>>,
    buttons: Arc<[AtomicBool; 2]>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 共享句柄：测试线程用它注入输入
    pub fn handle(&self) -> MockDeviceHandle {
        MockDeviceHandle {
            motion: self.motion.clone(),
            buttons: self.buttons.clone(),
        }
    }
}

impl MotionDevice for MockDevice {
    fn motion_state(&self) -> [f64; 6] {
        *self.motion.lock()
    }

    fn is_button_pressed(&self, idx: usize) -> bool {
        self.buttons[idx].load(Ordering::Acquire)
    }
}

/// [`MockDevice`] 的注入句柄
#[derive(Debug, Clone)]
pub struct MockDeviceHandle {
    motion: Arc<Mutex<[f64; 6]>>,
    buttons: Arc<[AtomicBool; 2]>,
}

impl MockDeviceHandle {
    pub fn set_motion(&self, motion: [f64; 6]) {
        *self.motion.lock() = motion;
    }

    pub fn set_button(&self, idx: usize, pressed: bool) {
        self.buttons[idx].store(pressed, Ordering::Release);
    }
}

/// 脚本化策略：每次推理返回同一组行
pub struct ScriptedPolicy {
    rows: Vec<[f64; ACTION_DIM]>,
    calls: usize,
    /// 第 n 次推理（1 起）开始失败，用于致命路径测试
    fail_from_call: Option<usize>,
}

impl ScriptedPolicy {
    /// 每次推理返回 `rows` 的策略
    pub fn constant(rows: Vec<[f64; ACTION_DIM]>) -> Self {
        ScriptedPolicy {
            rows,
            calls: 0,
            fail_from_call: None,
        }
    }

    /// 从第 `call`（1 起）次推理开始返回错误
    pub fn failing_from(rows: Vec<[f64; ACTION_DIM]>, call: usize) -> Self {
        ScriptedPolicy {
            rows,
            calls: 0,
            fail_from_call: Some(call),
        }
    }
}

impl Policy for ScriptedPolicy {
    fn reset(&mut self) {}

    fn predict_action(&mut self, _obs: &Observation) -> Result<ActionBatch, PolicyError> {
        self.calls += 1;
        if let Some(fail_from) = self.fail_from_call
            && self.calls >= fail_from
        {
            return Err(PolicyError::Inference("scripted failure".to_string()));
        }
        Ok(ActionBatch::from_rows(self.rows.iter().copied()))
    }
}

/// 队列式操作员输入：测试线程通过句柄投递命令
#[derive(Debug, Default)]
pub struct QueuedOperator {
    commands: Arc<Mutex<VecDeque<OperatorCommand>>>,
}

impl QueuedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> OperatorHandle {
        OperatorHandle {
            commands: self.commands.clone(),
        }
    }
}

impl OperatorInput for QueuedOperator {
    fn poll(&mut self) -> Option<OperatorCommand> {
        self.commands.lock().pop_front()
    }
}

/// [`QueuedOperator`] 的投递句柄
#[derive(Debug, Clone)]
pub struct OperatorHandle {
    commands: Arc<Mutex<VecDeque<OperatorCommand>>>,
}

impl OperatorHandle {
    pub fn send(&self, command: OperatorCommand) {
        self.commands.lock().push_back(command);
    }
}
