//! 操作员输入（专用 stdin 线程）
//!
//! 会话循环不能阻塞在终端读取上，这里用一个专用线程逐行读 stdin，
//! 解析成操作员命令后经 channel 投递；会话侧非阻塞轮询。

use std::io::BufRead;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use robodiff_core::{OperatorCommand, OperatorInput};

/// stdin 操作员输入源
pub struct StdinOperator {
    rx: Receiver<OperatorCommand>,
}

impl StdinOperator {
    /// 启动输入线程
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::Builder::new()
            .name("robodiff-stdin".to_string())
            .spawn(move || read_loop(tx))
            .context("failed to spawn stdin reader thread")?;
        Ok(StdinOperator { rx })
    }
}

impl OperatorInput for StdinOperator {
    fn poll(&mut self) -> Option<OperatorCommand> {
        self.rx.try_recv().ok()
    }
}

fn read_loop(tx: Sender<OperatorCommand>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let command = match line.trim() {
            "" => continue,
            "c" => OperatorCommand::StartPolicy,
            "s" => OperatorCommand::StopPolicy,
            "r" => OperatorCommand::ResetRobot,
            "q" => OperatorCommand::Quit,
            other => {
                warn!("Unknown command: {other:?} (expected c/s/r/q)");
                continue;
            },
        };
        let quit = command == OperatorCommand::Quit;
        if tx.send(command).is_err() || quit {
            break;
        }
    }
}
