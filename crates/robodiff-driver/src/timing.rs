//! 共享时序状态与精确等待
//!
//! 调度器（主循环）和执行线程通过两个原子 f64 标量交换时序信息：
//!
//! | 标量 | 写者 | 读者 | 用途 |
//! |------|------|------|------|
//! | `eval_start_time` | 主循环（每回合一次） | 双方 | 诊断时间戳归一化 |
//! | `latest_executed_time` | 执行线程（每条指令后） | 主循环 | 新鲜度过滤 |
//!
//! f64 不能直接做原子操作，这里按位转存到 `AtomicU64`。
//! 读写都用 `SeqCst`：这两个标量是跨执行单元的唯一反向反馈通道，
//! 顺序一致性保证主循环看到的执行前沿不会回退。

use spin_sleep::SpinSleeper;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 原子 f64 标量（按位存入 AtomicU64）
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// 创建新标量
    pub fn new(value: f64) -> Self {
        AtomicF64 {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// 读取（SeqCst）
    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    /// 写入（SeqCst）
    #[inline]
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::SeqCst);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        AtomicF64::new(0.0)
    }
}

/// 跨线程共享的时序状态
///
/// 生命周期绑定到一次评估会话；`eval_start_time` 在每次进入
/// 策略模式时重置。
#[derive(Debug, Default)]
pub struct SharedTiming {
    /// 当前策略回合的起始时刻（epoch 秒），0 表示尚未开始
    pub eval_start_time: AtomicF64,
    /// 最近一条已执行指令的计划时间戳（epoch 秒）
    pub latest_executed_time: AtomicF64,
}

impl SharedTiming {
    /// 创建新的时序状态（两个标量均为 0）
    pub fn new() -> Self {
        Self::default()
    }
}

/// 当前墙钟时间（epoch 秒）
///
/// 动作时间戳统一使用墙钟，因为录制下来的数据要与相机等
/// 外部时间源对齐。
#[inline]
pub fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before UNIX_EPOCH")
        .as_secs_f64()
}

/// 精确等待到指定墙钟时刻
///
/// 截止时刻已过时立即返回。使用 `spin_sleep` 获得亚毫秒精度，
/// 适用于个位数到几十 Hz 的控制频率。
pub fn wait_until_epoch(sleeper: &SpinSleeper, deadline: f64) {
    let remaining = deadline - epoch_now();
    if remaining > 0.0 {
        sleeper.sleep(Duration::from_secs_f64(remaining));
    }
}
