//! # urcell RTDE
//!
//! 与 UR 控制器的 RTDE（Real-Time Data Exchange）连接。
//!
//! # 会话流程
//!
//! ```text
//! connect → negotiate_version → register_output_recipe / register_input_recipe
//!         → start → { receive → send × N } … → pause → disconnect
//! ```
//!
//! 周期节奏由控制器决定，`receive()` 是唯一的挂起点：每收到一条输出记录，
//! 调用方需要在同一周期内为每个已注册的输入 recipe 调用一次 `send()`。
//!
//! # 示例
//!
//! ```no_run
//! use urcell_protocol::{FieldType, Recipe};
//! use urcell_rtde::{ControlChannel, RtdeConfig};
//!
//! # fn main() -> Result<(), urcell_rtde::RtdeError> {
//! let mut channel = ControlChannel::new(RtdeConfig::default());
//! channel.connect("192.168.1.10", urcell_rtde::DEFAULT_PORT)?;
//! channel.negotiate_version()?;
//!
//! let state = Recipe::from_pairs([("output_int_register_0", FieldType::Int32)])?;
//! let watchdog = Recipe::from_pairs([("input_int_register_0", FieldType::Int32)])?;
//! channel.register_output_recipe(state)?;
//! let watchdog = channel.register_input_recipe(watchdog)?;
//!
//! if channel.start()? {
//!     let wd = watchdog.instance();
//!     while let Some(_state) = channel.receive() {
//!         channel.send(&wd)?;
//!     }
//! }
//! channel.pause()?;
//! channel.disconnect();
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
mod error;
mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod channel_tests;

pub use channel::{ChannelState, ControlChannel, RecipeHandle};
pub use config::{DEFAULT_PORT, RtdeConfig};
pub use error::{CloseReason, RtdeError};
