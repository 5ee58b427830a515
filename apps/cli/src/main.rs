//! # urcell CLI
//!
//! 驱动 UR 机械臂 + Robotiq 夹爪的路点单元。
//!
//! ```bash
//! # 校验配置文件
//! urcell check --config cell.toml
//!
//! # 运行控制循环（Ctrl+C 或创建 stop.flag 结束）
//! urcell run --config cell.toml --flag-file stop.flag
//!
//! # 单独操作夹爪
//! urcell gripper --config cell.toml close
//! ```
//!
//! 日志级别由 `RUST_LOG` 控制，默认 `urcell=info`。

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod stop;

use commands::{CheckCommand, GripperCommand, RunCommand};

/// urcell - UR 单元控制工具
#[derive(Parser, Debug)]
#[command(name = "urcell")]
#[command(about = "Waypoint cell driver for a UR arm and a Robotiq gripper", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行路点控制循环
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 夹爪操作
    Gripper {
        #[command(flatten)]
        args: GripperCommand,
    },

    /// 校验配置文件
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("urcell=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Gripper { args } => args.execute(),
        Commands::Check { args } => args.execute(),
    }
}
