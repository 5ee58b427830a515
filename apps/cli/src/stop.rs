//! 停止信号
//!
//! Ctrl+C 和标志文件都只触发取消令牌，由控制循环在下一个周期收尾。

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use urcell_control::CancellationToken;

/// 标志文件轮询间隔
const FLAG_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ctrl+C 触发取消
pub fn install_ctrlc(token: &CancellationToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            warn!("Second interrupt, exiting immediately");
            std::process::exit(130);
        }
        eprintln!("\nReceived interrupt signal. Stopping after the current cycle...");
        token.cancel();
    })
    .context("failed to install Ctrl+C handler")
}

/// 标志文件出现时触发取消
///
/// 启动时已存在的标志文件视为残留并被忽略，直到它被删除后再次出现。
pub fn watch_flag_file(path: PathBuf, token: &CancellationToken) -> thread::JoinHandle<()> {
    let token = token.clone();
    thread::spawn(move || {
        let mut armed = !path.exists();
        if !armed {
            warn!(
                "Flag file {} already exists, waiting for it to be removed",
                path.display()
            );
        }
        while !token.is_cancelled() {
            let present = path.exists();
            if armed && present {
                info!("Flag file {} detected, stopping", path.display());
                token.cancel();
                break;
            }
            armed |= !present;
            thread::sleep(FLAG_POLL_INTERVAL);
        }
    })
}
