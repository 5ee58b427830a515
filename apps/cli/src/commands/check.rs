//! check 命令
//!
//! 离线校验单元配置，不连接任何设备

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use urcell_control::CellConfig;
use urcell_protocol::Recipe;

/// 配置校验命令参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// 单元配置文件
    #[arg(short, long, default_value = "cell.toml")]
    pub config: PathBuf,
}

impl CheckCommand {
    pub fn execute(&self) -> Result<()> {
        let cell = CellConfig::load(&self.config)?;
        let recipes = cell.recipes()?;
        let plan = cell.plan()?;

        println!("✅ {} 校验通过", self.config.display());
        println!();
        println!("🤖 机械臂: {}:{} @ {} Hz", cell.robot_host(), cell.robot.port, cell.robot.frequency);
        println!("🦾 夹爪: {}:{}", cell.gripper_host(), cell.gripper.port);

        print_recipe("state (output)", &recipes.state);
        print_recipe("setp (input)", &recipes.setp);
        print_recipe("watchdog (input)", &recipes.watchdog);

        println!();
        println!("📍 路点 ({}):", plan.len());
        for (i, waypoint) in plan.iter().enumerate() {
            let pose = waypoint
                .pose
                .iter()
                .map(|v| format!("{v:>8.4}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("  {i:>2}: [{pose}] {}", waypoint.action);
        }

        if let Some(limit) = cell.sequencer.max_cycles {
            println!();
            println!("⏱️  周期上限: {limit}");
        }
        Ok(())
    }
}

fn print_recipe(title: &str, recipe: &Recipe) {
    println!();
    println!("📋 {title}: {} 字段, {} 字节", recipe.len(), recipe.width());
    for field in recipe.fields() {
        println!("  {:<28} {}", field.name, field.ty);
    }
}
