//! # urcell Control
//!
//! 把 RTDE 控制通道和夹爪通道耦合为一个路点序列控制循环。
//!
//! ## 模块
//!
//! - `watchdog`: 每周期写入的看门狗心跳
//! - `state`: 单一所有者的循环状态（游标、序列器状态、看门狗）
//! - `sequencer`: `MotionSequencer` 状态机与运行循环
//! - `waypoints`: 路点列表与开/合动作表
//! - `link`: 序列器与两条通道之间的 trait
//! - `config`: TOML 单元配置文件
//! - `session`: 从配置建立会话
//!
//! # 示例
//!
//! ```no_run
//! use urcell_control::{CancellationToken, CellConfig, CellSession};
//!
//! # fn main() -> Result<(), urcell_control::ControlError> {
//! let cell = CellConfig::load("cell.toml")?;
//! let cancel = CancellationToken::new();
//! let report = CellSession::establish(&cell)?.run(&cancel)?;
//! println!("{} moves in {} cycles", report.completed_moves, report.cycles);
//! # Ok(())
//! # }
//! ```

mod cancel;
pub mod config;
mod error;
pub mod link;
mod sequencer;
mod session;
mod state;
mod watchdog;
mod waypoints;

pub use cancel::CancellationToken;
pub use config::{CellConfig, CellRecipes};
pub use error::{ControlError, Result};
pub use link::{ControlLink, GripperLink};
pub use sequencer::{
    COMPLETION_ASSERTED, COMPLETION_CLEARED, ExitReason, MotionSequencer, RunReport,
    SequencerConfig, SequencerRecipes, StepOutcome,
};
pub use session::CellSession;
pub use state::{LoopState, SequencerState};
pub use watchdog::{WatchdogGuard, WatchdogState};
pub use waypoints::{GripperAction, GripperSettings, Waypoint, WaypointPlan};
