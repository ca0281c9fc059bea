//! 驱动层模块
//!
//! 本模块提供 robodiff 运行时的执行侧基础设施，包括：
//! - 动作队列（单生产者/单消费者，支持原子批量替换）
//! - 共享时序状态（跨线程原子 f64 标量）
//! - 动作执行线程（按绝对时间戳精确执行）
//! - 性能指标（原子计数器）
//!
//! 执行线程是**唯一**向机器人下发指令的执行单元；
//! 主控制循环只通过动作队列与其通信。

mod error;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod timing;

pub use error::DriverError;
pub use executor::{ActionExecutor, ExecutorConfig};
pub use metrics::{MetricsSnapshot, RigMetrics};
pub use queue::{ActionQueue, RecordBatch};
pub use timing::{AtomicF64, SharedTiming, epoch_now, wait_until_epoch};
