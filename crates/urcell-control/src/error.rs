//! 控制层错误类型体系
//!
//! 区分致命错误（必须结束会话）和可继续的错误。
//!
//! # 示例
//!
//! ```rust
//! use urcell_control::ControlError;
//!
//! fn handle_error(err: ControlError) {
//!     if err.is_fatal() {
//!         eprintln!("致命错误: {}", err);
//!     } else {
//!         eprintln!("可继续: {}", err);
//!     }
//! }
//! ```

use thiserror::Error;
use urcell_gripper::GripperError;
use urcell_protocol::ProtocolError;
use urcell_rtde::RtdeError;

/// 控制层错误类型
#[derive(Debug, Error)]
pub enum ControlError {
    /// RTDE 通道错误（连接、协议版本、recipe 注册、发送）
    #[error("RTDE: {0}")]
    Rtde(#[from] RtdeError),

    /// 夹爪错误
    #[error("Gripper: {0}")]
    Gripper(#[from] GripperError),

    /// 字段解析 / 取值错误
    #[error("Recipe: {0}")]
    Protocol(#[from] ProtocolError),

    /// 控制器拒绝启动周期交换
    #[error("Controller refused to start synchronization")]
    StartRefused,

    /// 配置文件或运行参数错误
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ControlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// 是否为致命错误
    ///
    /// 只有夹爪运动超时可以继续会话，其余都必须结束。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Gripper(e) if e.is_timeout())
    }

    /// 是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
