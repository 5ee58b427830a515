//! RTDE 通道错误类型定义

use std::io;

use thiserror::Error;
use urcell_protocol::ProtocolError;

/// RTDE 通道错误类型
#[derive(Error, Debug)]
pub enum RtdeError {
    /// 传输层错误（连接被拒、超时、断开）
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// 尚未连接或连接已关闭
    #[error("Not connected")]
    NotConnected,

    /// 控制器不支持本客户端的协议版本
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// 输出频率不是正数
    #[error("Invalid output frequency: {0} Hz")]
    InvalidFrequency(f64),

    /// 控制器拒绝 recipe 中的某个字段
    #[error("Recipe rejected at field '{field}': {reason}")]
    RecipeRejected { field: String, reason: String },

    /// 实例绑定的 recipe 未在本通道注册
    #[error("Recipe {recipe_id:?} is not registered on this channel")]
    NotRegistered { recipe_id: Option<u8> },

    /// 控制器拒绝暂停
    #[error("Controller refused to pause")]
    PauseRefused,

    /// 等待应答超时
    #[error("Timed out waiting for controller reply")]
    Timeout,

    /// 控制器关闭了连接
    #[error("Connection closed by controller")]
    Closed,

    /// 应答与请求不匹配
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// `receive()` 返回 `None` 的原因
///
/// 调用方对所有原因一视同仁（结束循环），保留原因用于日志和诊断。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloseReason {
    #[error("controller closed the connection")]
    Shutdown,

    #[error("no output record within the receive timeout")]
    Timeout,

    #[error("channel is not connected")]
    NotConnected,

    #[error("cyclic exchange has not been started")]
    NotStarted,

    #[error("malformed record: {0}")]
    Malformed(ProtocolError),

    #[error("record for recipe {actual}, expected {expected}")]
    RecipeMismatch { expected: u8, actual: u8 },

    #[error("transport error ({0:?}): {1}")]
    Io(io::ErrorKind, String),
}

impl From<CloseReason> for RtdeError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Shutdown => RtdeError::Closed,
            CloseReason::Timeout => RtdeError::Timeout,
            CloseReason::NotConnected | CloseReason::NotStarted => RtdeError::NotConnected,
            CloseReason::Malformed(e) => RtdeError::Protocol(e),
            CloseReason::RecipeMismatch { expected, actual } => {
                RtdeError::UnexpectedReply(format!("record for recipe {actual}, expected {expected}"))
            },
            CloseReason::Io(kind, msg) => RtdeError::Connection(io::Error::new(kind, msg)),
        }
    }
}

impl From<RtdeError> for CloseReason {
    fn from(err: RtdeError) -> Self {
        match err {
            RtdeError::Closed => CloseReason::Shutdown,
            RtdeError::Timeout => CloseReason::Timeout,
            RtdeError::NotConnected => CloseReason::NotConnected,
            RtdeError::Protocol(e) => CloseReason::Malformed(e),
            RtdeError::Connection(e) => CloseReason::Io(e.kind(), e.to_string()),
            other => CloseReason::Io(io::ErrorKind::Other, other.to_string()),
        }
    }
}
