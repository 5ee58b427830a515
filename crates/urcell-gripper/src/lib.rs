//! # urcell Gripper
//!
//! 通过 URCap ASCII socket（默认端口 63352）控制 Robotiq 夹爪。
//!
//! # 示例
//!
//! ```no_run
//! use std::time::Duration;
//! use urcell_gripper::{ActuatorChannel, GripperCommand, GripperConfig};
//!
//! # fn main() -> Result<(), urcell_gripper::GripperError> {
//! let gripper = ActuatorChannel::new(GripperConfig::default());
//! gripper.connect("192.168.1.10", urcell_gripper::DEFAULT_PORT)?;
//! gripper.activate()?;
//!
//! let status = gripper.move_and_wait(GripperCommand::close(), Duration::from_secs(5))?;
//! println!("closed at {}, object: {}", status.current_position, status.object_detected);
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
mod error;
pub mod registers;
mod status;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use channel::ActuatorChannel;
pub use config::{DEFAULT_PORT, GripperConfig};
pub use error::GripperError;
pub use registers::{ActivationStatus, ObjectStatus, Register};
pub use status::{
    CLOSED_POSITION, GripperCommand, GripperStatus, OPEN_POSITION, PositionRange,
    RegisterSnapshot,
};
