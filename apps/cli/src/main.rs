//! # robodiff CLI
//!
//! 真机策略评估会话的命令行入口。
//!
//! ```bash
//! # 干跑（模拟环境/设备/策略，无硬件依赖）
//! robodiff-cli --mock --frequency 5 --steps-per-inference 6
//!
//! # 从配置文件启动，命令行参数覆盖文件字段
//! robodiff-cli --mock --config rig.toml --verbose
//! ```
//!
//! ## 操作员控制（stdin，回车确认）
//!
//! | 键 | 动作 |
//! |----|------|
//! | `c` | 移交控制权给策略 |
//! | `s` | 停止策略回合，收回控制权 |
//! | `r` | 机器人复位并随机化初始位姿 |
//! | `q` | 退出 |
//!
//! Ctrl-C 触发中断路径：清空队列、关闭回合、停止执行线程后退出。

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use robodiff_client::EvalSession;
use robodiff_client::mock::{MockDevice, MockEnv, ScriptedPolicy};
use robodiff_core::{ACTION_DIM, EvalConfig};

mod input;

use input::StdinOperator;

/// robodiff CLI - 真机策略评估入口
#[derive(Parser, Debug)]
#[command(name = "robodiff-cli")]
#[command(about = "Run a real-robot policy evaluation session", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 控制频率（Hz）
    #[arg(short, long)]
    frequency: Option<f64>,

    /// 设备采样到执行之间的提前量（秒）
    #[arg(long)]
    command_latency: Option<f64>,

    /// 单个策略回合的最大时长（秒）
    #[arg(short = 'd', long)]
    max_duration: Option<f64>,

    /// 每次推理消费的控制节拍数
    #[arg(short, long)]
    steps_per_inference: Option<usize>,

    /// 位置控制灵敏度 (0, 1]
    #[arg(long)]
    pos_sensitivity: Option<f64>,

    /// 旋转控制灵敏度 (0, 1]
    #[arg(long)]
    rot_sensitivity: Option<f64>,

    /// 打印额外诊断信息
    #[arg(long)]
    verbose: bool,

    /// 使用模拟协作者干跑（无硬件）
    #[arg(long)]
    mock: bool,
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("robodiff_client=info".parse().unwrap())
                .add_directive("robodiff_driver=info".parse().unwrap())
                .add_directive("robodiff_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    // 配置文件 + 命令行覆盖
    let mut config = match &cli.config {
        Some(path) => EvalConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EvalConfig::default(),
    };
    if let Some(frequency) = cli.frequency {
        config.frequency = frequency;
    }
    if let Some(command_latency) = cli.command_latency {
        config.command_latency = command_latency;
    }
    if let Some(max_duration) = cli.max_duration {
        config.max_duration = max_duration;
    }
    if let Some(steps) = cli.steps_per_inference {
        config.steps_per_inference = steps;
    }
    if let Some(pos_sensitivity) = cli.pos_sensitivity {
        config.pos_sensitivity = pos_sensitivity;
    }
    if let Some(rot_sensitivity) = cli.rot_sensitivity {
        config.rot_sensitivity = rot_sensitivity;
    }
    config.verbose |= cli.verbose;
    config.validate()?;

    if !cli.mock {
        // 真实后端（机器人环境 / SpaceMouse / 策略推理）由集成方
        // 链接进自己的二进制，本入口只携带模拟协作者
        anyhow::bail!(
            "no robot backend is linked into this binary; run with --mock for a dry run"
        );
    }

    run_mock(config)
}

/// 模拟干跑：零运动设备 + 恒定前向增量策略
fn run_mock(config: EvalConfig) -> Result<()> {
    print_banner();

    let env = Arc::new(MockEnv::default());
    let device = MockDevice::new();
    // 每节拍沿 x 轴前进 0.01 的脚本化策略
    let mut row = [0.0; ACTION_DIM];
    row[0] = 0.01;
    let policy = ScriptedPolicy::constant(vec![row; config.steps_per_inference.max(8)]);
    let operator = StdinOperator::spawn()?;

    let mut session = EvalSession::new(env.clone(), device, policy, operator, config)?;

    // Ctrl-C → 中断标志，会话在下一个节拍走有序终止路径
    let interrupt = session.interrupt_flag();
    ctrlc::set_handler(move || {
        interrupt.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let metrics = session.metrics();
    session.run()?;

    let pose = env.current_pose();
    let snapshot = metrics.snapshot();
    info!(
        executed = snapshot.records_executed,
        over_budget = snapshot.over_budget_cycles,
        episodes = env.episodes_ended(),
        final_x = pose.position.x,
        "Dry run finished"
    );
    Ok(())
}

fn print_banner() {
    println!("================ Human in control ==============");
    println!("Type 'c' + Enter to hand control over to the policy.");
    println!("Type 'r' + Enter to reset the robot with a randomized initial pose.");
    println!("Type 'q' + Enter to quit.");
    println!("================ Policy in control =============");
    println!("Type 's' + Enter to stop the episode and take control back.");
    println!();
}
