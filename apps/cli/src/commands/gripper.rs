//! gripper 命令
//!
//! 不启动 RTDE，单独连接夹爪执行一个动作

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use urcell_control::{CellConfig, GripperAction};
use urcell_gripper::{ActuatorChannel, GripperStatus};

/// 夹爪动作
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GripperOp {
    /// 激活（复位后 ACT=1）
    Activate,
    Open,
    Close,
    /// 读取状态
    Status,
}

/// 夹爪命令参数
#[derive(Args, Debug)]
pub struct GripperCommand {
    /// 单元配置文件
    #[arg(short, long, default_value = "cell.toml")]
    pub config: PathBuf,

    /// 动作
    #[arg(value_enum)]
    pub op: GripperOp,
}

impl GripperCommand {
    pub fn execute(&self) -> Result<()> {
        let cell = CellConfig::load(&self.config)?;
        let gripper = ActuatorChannel::new(cell.gripper_config());

        println!("🔌 连接到夹爪 {}:{}...", cell.gripper_host(), cell.gripper.port);
        gripper
            .connect(cell.gripper_host(), cell.gripper.port)
            .context("failed to connect to gripper")?;

        let action = match self.op {
            GripperOp::Status => {
                print_status(&gripper.status()?);
                return Ok(());
            },
            GripperOp::Activate => {
                gripper.activate()?;
                println!("✅ 夹爪已激活");
                return Ok(());
            },
            GripperOp::Open => GripperAction::Open,
            GripperOp::Close => GripperAction::Close,
        };

        if !gripper.is_active()? {
            gripper.activate()?;
        }
        let command = action.command(&cell.sequencer_config().gripper);
        let timeout = Duration::from_millis(cell.gripper.settle_timeout_ms);
        let status = gripper.move_and_wait(command, timeout)?;
        print_status(&status);
        Ok(())
    }
}

fn print_status(status: &GripperStatus) {
    println!("  位置: {:>3} (目标 {})", status.current_position, status.requested_position);
    println!("  已激活: {}", status.activated);
    println!("  运动中: {}", status.moving);
    println!("  检测到物体: {}", status.object_detected);
    if status.fault != 0 {
        println!("  ⚠️ 故障码: 0x{:02X}", status.fault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gripper_op_parse() {
        assert_eq!(GripperOp::from_str("close", true).unwrap(), GripperOp::Close);
        assert_eq!(GripperOp::from_str("status", true).unwrap(), GripperOp::Status);
        assert!(GripperOp::from_str("squeeze", true).is_err());
    }
}
