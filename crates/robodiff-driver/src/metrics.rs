//! 运行时性能指标
//!
//! 零开销原子计数器，调度侧和执行侧共享同一实例。
//! 所有计数器都可以在任何线程安全读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 运行时实时指标
///
/// # 使用示例
///
/// ```
/// use robodiff_driver::RigMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(RigMetrics::default());
/// metrics.records_executed.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.records_executed, 1);
/// ```
#[derive(Debug, Default)]
pub struct RigMetrics {
    /// 执行线程已执行的指令数
    pub records_executed: AtomicU64,

    /// 执行线程开始执行时截止时刻已过的指令数
    ///
    /// 偶发的个位数延迟是正常现象；持续增长说明执行链路
    /// （机器人接口调用）耗时超过控制周期。
    pub deadline_misses: AtomicU64,

    /// 机器人接口调用失败次数
    pub exec_errors: AtomicU64,

    /// 调度器已规划的推理批数
    pub batches_planned: AtomicU64,

    /// 走了超预算降级路径的推理周期数
    pub over_budget_cycles: AtomicU64,

    /// 新鲜度过滤丢弃的过期行数
    pub stale_rows_dropped: AtomicU64,
}

impl RigMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前指标快照
    ///
    /// 各计数器独立原子读取（Relaxed），不同计数器之间可能有
    /// 微小的时间差，监控用途足够。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_executed: self.records_executed.load(Ordering::Relaxed),
            deadline_misses: self.deadline_misses.load(Ordering::Relaxed),
            exec_errors: self.exec_errors.load(Ordering::Relaxed),
            batches_planned: self.batches_planned.load(Ordering::Relaxed),
            over_budget_cycles: self.over_budget_cycles.load(Ordering::Relaxed),
            stale_rows_dropped: self.stale_rows_dropped.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照（普通整数，便于打印/序列化）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub records_executed: u64,
    pub deadline_misses: u64,
    pub exec_errors: u64,
    pub batches_planned: u64,
    pub over_budget_cycles: u64,
    pub stale_rows_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = RigMetrics::new();
        metrics.records_executed.fetch_add(3, Ordering::Relaxed);
        metrics.over_budget_cycles.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_executed, 3);
        assert_eq!(snapshot.over_budget_cycles, 1);
        assert_eq!(snapshot.exec_errors, 0);
    }
}
