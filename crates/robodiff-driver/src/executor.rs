//! 动作执行线程
//!
//! 在独立线程上持续抽取动作队列，并在每条指令的计划墙钟时刻精确
//! 执行。执行线程是唯一调用 `RobotEnv::exec_actions` 的执行单元，
//! 与主循环的变延迟工作（推理、可视化）完全解耦。
//!
//! # 生命周期
//!
//! 随环境会话启动一次、停止一次。停止采用协同标志 + 有界宽限期：
//! `stop()` 置位运行标志后用 watchdog 线程带超时 join；超时则放弃
//! 等待（线程由操作系统在进程退出时回收），队列中未执行的记录
//! 一律废弃。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use spin_sleep::SpinSleeper;
use tracing::{debug, error, info, trace, warn};

use robodiff_core::{CommandRecord, RobotEnv};

use crate::error::DriverError;
use crate::metrics::RigMetrics;
use crate::queue::ActionQueue;
use crate::timing::{SharedTiming, epoch_now, wait_until_epoch};

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // watchdog 线程负责真正的 join，主线程带超时等结果
        std::thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // 超时：watchdog 线程继续运行，进程退出时由 OS 回收
                Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "Thread join timeout",
                )))
            },
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 执行线程配置
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// 控制周期（秒），仅用于诊断输出中的时间戳归一化
    pub dt: f64,

    /// 队列为空时的轮询间隔
    ///
    /// 空队列是推理间隔内的常态，短轮询（默认 50μs）避免忙等
    /// 占满 CPU，同时远小于控制周期，不影响执行时序。
    pub idle_poll: Duration,

    /// 停止时等待线程退出的宽限期
    pub join_timeout: Duration,
}

impl ExecutorConfig {
    /// 以指定控制周期创建默认配置
    pub fn new(dt: f64) -> Self {
        ExecutorConfig {
            dt,
            idle_poll: Duration::from_micros(50),
            join_timeout: Duration::from_secs(2),
        }
    }
}

/// 动作执行器句柄
///
/// Drop 时自动停止执行线程。
pub struct ActionExecutor {
    is_running: Arc<AtomicBool>,
    faulted: Arc<AtomicBool>,
    last_executed: Arc<ArcSwapOption<CommandRecord>>,
    thread: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl ActionExecutor {
    /// 启动执行线程
    pub fn spawn(
        env: Arc<dyn RobotEnv>,
        queue: ActionQueue,
        timing: Arc<SharedTiming>,
        metrics: Arc<RigMetrics>,
        config: ExecutorConfig,
    ) -> Result<Self, DriverError> {
        let is_running = Arc::new(AtomicBool::new(true));
        let faulted = Arc::new(AtomicBool::new(false));
        let last_executed = Arc::new(ArcSwapOption::<CommandRecord>::empty());
        let join_timeout = config.join_timeout;

        let thread = {
            let is_running = is_running.clone();
            let faulted = faulted.clone();
            let last_executed = last_executed.clone();
            std::thread::Builder::new()
                .name("robodiff-exec".to_string())
                .spawn(move || {
                    exec_loop(
                        env,
                        queue,
                        timing,
                        metrics,
                        config,
                        is_running,
                        faulted,
                        last_executed,
                    );
                })?
        };

        info!("Action executor thread started");

        Ok(ActionExecutor {
            is_running,
            faulted,
            last_executed,
            thread: Some(thread),
            join_timeout,
        })
    }

    /// 执行线程是否健康（未因硬件错误停机）
    pub fn is_healthy(&self) -> bool {
        !self.faulted.load(Ordering::Acquire)
    }

    /// 最近一条已执行指令（无锁快照，用于诊断）
    pub fn last_executed(&self) -> Option<Arc<CommandRecord>> {
        self.last_executed.load_full()
    }

    /// 停止执行线程
    ///
    /// 协同停止：置位运行标志，当前迭代结束后线程退出；
    /// 宽限期内未退出则放弃等待并报错。幂等。
    pub fn stop(&mut self) -> Result<(), DriverError> {
        // Release: 之前的全部写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);

        if let Some(handle) = self.thread.take()
            && handle.join_timeout(self.join_timeout).is_err()
        {
            error!(
                "Executor thread failed to shut down within {:?}",
                self.join_timeout
            );
            return Err(DriverError::StopTimeout {
                timeout_ms: self.join_timeout.as_millis() as u64,
            });
        }
        Ok(())
    }
}

impl Drop for ActionExecutor {
    fn drop(&mut self) {
        if self.thread.is_some()
            && let Err(e) = self.stop()
        {
            error!("Executor teardown failed: {e}");
        }
    }
}

/// 执行线程主循环
#[allow(clippy::too_many_arguments)]
fn exec_loop(
    env: Arc<dyn RobotEnv>,
    queue: ActionQueue,
    timing: Arc<SharedTiming>,
    metrics: Arc<RigMetrics>,
    config: ExecutorConfig,
    is_running: Arc<AtomicBool>,
    faulted: Arc<AtomicBool>,
    last_executed: Arc<ArcSwapOption<CommandRecord>>,
) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Executor thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set executor thread priority: {:?}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let sleeper = SpinSleeper::default();

    loop {
        // Acquire: 看到 false 时必须看到其他线程此前的全部清理写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Executor thread: is_running flag is false, exiting");
            break;
        }

        let Some(record) = queue.try_pop() else {
            // 无工作是推理间隔内的常态，短睡避免忙等
            spin_sleep::sleep(config.idle_poll);
            continue;
        };

        let now = epoch_now();
        let eval_start = timing.eval_start_time.load();
        debug!(
            queue_len = queue.len(),
            step = (record.timestamp - eval_start) / config.dt,
            "Executing action"
        );

        if now > record.timestamp {
            metrics.deadline_misses.fetch_add(1, Ordering::Relaxed);
            warn!(
                late_s = now - record.timestamp,
                "Action deadline already passed at execution start"
            );
        }

        if let Err(e) = env.exec_actions(
            std::slice::from_ref(&record.pose),
            std::slice::from_ref(&record.raw),
            std::slice::from_ref(&record.timestamp),
        ) {
            metrics.exec_errors.fetch_add(1, Ordering::Relaxed);
            error!("Executor thread: exec_actions failed, stopping: {e}");
            faulted.store(true, Ordering::Release);
            break;
        }

        timing.latest_executed_time.store(record.timestamp);
        metrics.records_executed.fetch_add(1, Ordering::Relaxed);
        let deadline = record.timestamp;
        last_executed.store(Some(Arc::new(record)));

        // 精确等到计划执行时刻再取下一条
        wait_until_epoch(&sleeper, deadline);
    }

    trace!("Executor thread: loop exited");
}
