//! 动作队列
//!
//! 单生产者/单消费者的 FIFO 指令通道。生产者是当前激活的采样器
//! （遥操作或推理调度器，模式互斥，绝不并发），消费者是动作执行线程。
//!
//! # 原子替换
//!
//! 推理调度器每个周期都用最新批次**整体取代**队列中的旧计划：
//! [`ActionQueue::replace`] 在一次锁内完成清空 + 批量入队。
//! 消费者的任何一次出队要么看到旧计划，要么看到新计划，
//! 绝不会看到旧计划的部分前缀混在新计划之后。混合执行两份计划
//! 会让机器人同时落后于两条轨迹。
//!
//! # 实现说明
//!
//! 内部是 `parking_lot::Mutex<VecDeque>`。持锁区间只有入队/出队/
//! 清空，没有任何阻塞等待，锁竞争窗口在微秒级。

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;

use robodiff_core::CommandRecord;

/// 一个推理周期产生的指令批
///
/// 典型推理视界为 6 步，8 个栈上槽位覆盖常见配置，避免热路径堆分配。
pub type RecordBatch = SmallVec<[CommandRecord; 8]>;

/// 进程内动作队列句柄（clone 共享同一底层队列）
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    inner: Arc<Mutex<VecDeque<CommandRecord>>>,
}

impl ActionQueue {
    /// 创建空队列
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队一条记录（遥操作路径：每节拍一条）
    pub fn push(&self, record: CommandRecord) {
        self.inner.lock().push_back(record);
    }

    /// 非阻塞出队
    pub fn try_pop(&self) -> Option<CommandRecord> {
        self.inner.lock().pop_front()
    }

    /// 清空队列，返回被丢弃的记录数
    pub fn flush(&self) -> usize {
        let mut queue = self.inner.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// 原子地用新批次取代全部未执行记录
    ///
    /// 返回被丢弃的旧记录数。清空与批量入队在同一锁内完成，
    /// 对消费者表现为单个原子操作。
    pub fn replace(&self, batch: RecordBatch) -> usize {
        let mut queue = self.inner.lock();
        let dropped = queue.len();
        queue.clear();
        queue.extend(batch);
        dropped
    }

    /// 当前长度（仅用于诊断，读完即可能失效）
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
