//! 夹爪错误类型定义

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::registers::{ObjectStatus, Register};

/// 夹爪错误类型
#[derive(Error, Debug)]
pub enum GripperError {
    /// 传输层错误（连接被拒、读写超时、断开）
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    #[error("Gripper not connected")]
    NotConnected,

    /// SET 命令未得到 `ack`
    #[error("Command '{command}' was not acknowledged (reply: '{reply}')")]
    Nack { command: String, reply: String },

    /// GET 应答格式不符
    #[error("Unexpected reply to GET {register}: '{reply}'")]
    UnexpectedReply { register: Register, reply: String },

    /// 在限定的轮询次数内未观察到激活完成
    #[error("Gripper did not report active after {polls} polls")]
    ActivationTimeout { polls: u32 },

    /// 在限定时间内未停止
    #[error("Gripper did not settle at {target} within {timeout:?}")]
    ActuatorTimeout { target: u8, timeout: Duration },

    /// 自动标定时未能到达行程端点
    #[error("Calibration stopped at {position} with status {status:?}")]
    CalibrationFailed { position: u8, status: ObjectStatus },
}

impl GripperError {
    /// 是否为运动超时（可继续会话）
    pub fn is_timeout(&self) -> bool {
        matches!(self, GripperError::ActuatorTimeout { .. })
    }
}
