//! 会话建立
//!
//! ```text
//! 夹爪: connect → activate
//! RTDE: connect → negotiate_version → 注册 state / setp / watchdog → 构建序列器 → start
//! ```
//!
//! 任一步失败都在进入周期交换前中止。

use tracing::info;
use urcell_gripper::ActuatorChannel;
use urcell_rtde::ControlChannel;

use crate::cancel::CancellationToken;
use crate::config::CellConfig;
use crate::error::{ControlError, Result};
use crate::sequencer::{MotionSequencer, RunReport, SequencerRecipes};

/// 已激活夹爪、已开始同步的会话
pub struct CellSession {
    sequencer: MotionSequencer<ControlChannel, ActuatorChannel>,
}

impl CellSession {
    /// 建立会话
    ///
    /// 序列器在 `start()` 之前构建，字段解析失败时控制器不会进入同步。
    ///
    /// # 错误
    /// - `Gripper`: 连接或激活失败
    /// - `Rtde`: 连接、版本协商或 recipe 注册失败
    /// - `Protocol` / `Config`: 序列器字段与 recipe 不符
    /// - `StartRefused`: 控制器拒绝开始同步
    pub fn establish(cell: &CellConfig) -> Result<Self> {
        let plan = cell.plan()?;
        let recipes = cell.recipes()?;

        let gripper = ActuatorChannel::new(cell.gripper_config());
        gripper.connect(cell.gripper_host(), cell.gripper.port)?;
        gripper.activate()?;

        let mut channel = ControlChannel::new(cell.rtde_config());
        channel.connect(cell.robot_host(), cell.robot.port)?;
        channel.negotiate_version()?;
        let state = channel.register_output_recipe(recipes.state)?;
        let setp = channel.register_input_recipe(recipes.setp)?;
        let watchdog = channel.register_input_recipe(recipes.watchdog)?;
        let ids = (state.id(), setp.id(), watchdog.id());

        let recipes = SequencerRecipes::from_handles(&state, &setp, &watchdog);
        let mut sequencer =
            MotionSequencer::new(channel, gripper, recipes, plan, cell.sequencer_config())?;
        if !sequencer.link_mut().start()? {
            sequencer.shutdown();
            return Err(ControlError::StartRefused);
        }
        info!(
            "Session established with {} (recipes: state={}, setp={}, watchdog={})",
            cell.robot_host(),
            ids.0,
            ids.1,
            ids.2
        );

        Ok(Self { sequencer })
    }

    pub fn channel(&self) -> &ControlChannel {
        self.sequencer.link()
    }

    pub fn gripper(&self) -> &ActuatorChannel {
        self.sequencer.gripper()
    }

    /// 运行控制循环直到通道关闭、取消或达到周期上限
    pub fn run(mut self, cancel: &CancellationToken) -> Result<RunReport> {
        self.sequencer.run(cancel)
    }
}
