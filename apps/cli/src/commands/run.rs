//! run 命令
//!
//! 建立会话并运行路点控制循环

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use urcell_control::{CancellationToken, CellConfig, CellSession, ExitReason};

use crate::stop;

/// 控制循环命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 单元配置文件
    #[arg(short, long, default_value = "cell.toml")]
    pub config: PathBuf,

    /// 出现即停止的标志文件
    #[arg(long)]
    pub flag_file: Option<PathBuf>,

    /// 运行周期上限（覆盖配置）
    #[arg(long)]
    pub max_cycles: Option<u64>,
}

impl RunCommand {
    pub fn execute(&self) -> Result<()> {
        let mut cell = CellConfig::load(&self.config)?;
        if self.max_cycles.is_some() {
            cell.sequencer.max_cycles = self.max_cycles;
        }

        let token = CancellationToken::new();
        stop::install_ctrlc(&token)?;
        let watcher = self
            .flag_file
            .clone()
            .map(|path| stop::watch_flag_file(path, &token));

        println!(
            "🔌 连接到 {} (RTDE:{}, gripper:{})...",
            cell.robot_host(),
            cell.robot.port,
            cell.gripper.port
        );
        let session = CellSession::establish(&cell).context("session setup failed")?;
        println!("▶️  运行 {} 个路点", cell.waypoints.len());

        let result = session.run(&token);

        // 结束标志文件监视线程
        token.cancel();
        if let Some(watcher) = watcher {
            let _ = watcher.join();
        }
        let report = result.context("control loop aborted")?;

        println!();
        println!("📊 运行结果:");
        println!("  周期数: {}", report.cycles);
        println!("  完成路点: {}", report.completed_moves);
        println!("  夹爪超时: {}", report.actuator_timeouts);
        println!(
            "  结束原因: {}",
            match report.exit {
                ExitReason::ChannelClosed => "controller closed the session",
                ExitReason::Cancelled => "stop requested",
                ExitReason::CycleLimit => "cycle limit reached",
            }
        );
        Ok(())
    }
}
