//! # urcell Protocol
//!
//! UR 控制器 RTDE 协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `field`: 字段类型（INT32/DOUBLE/VECTOR6D...）与取值
//! - `recipe`: Recipe（有序字段列表）与 RecipeInstance（绑定到 Recipe 的取值）
//! - `codec`: Recipe 记录的定长二进制编解码
//! - `frame`: RTDE 消息帧（`u16 size | u8 type | payload`）的流式切分
//! - `message`: 客户端 / 控制器两个方向的消息类型
//!
//! ## 字节序
//!
//! RTDE 全部使用网络字节序（大端），包括 IEEE-754 双精度浮点。

pub mod codec;
pub mod field;
pub mod frame;
pub mod message;
pub mod recipe;

// 重新导出常用类型
pub use codec::{decode, encode};
pub use field::{Field, FieldType, FieldValue, Value};
pub use frame::{Frame, FrameDecoder, HEADER_LEN, encode_frame};
pub use message::{
    ClientMessage, ControllerMessage, ControllerVersion, MessageType, TextLevel, TextMessage,
};
pub use recipe::{FieldKey, Recipe, RecipeInstance, RecipeKind};

use thiserror::Error;

/// RTDE 协议版本（本库只实现 v2）
pub const PROTOCOL_VERSION: u16 = 2;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed record: expected {expected} bytes, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },

    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    #[error("Duplicate field name in recipe: {0}")]
    DuplicateField(String),

    #[error("Recipe has no fields")]
    EmptyRecipe,

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field {field} is {actual}, not {expected}")]
    FieldTypeMismatch {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("Instance is bound to a different recipe")]
    RecipeMismatch,

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(u16),

    #[error("Payload too large for one frame: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    #[error("Truncated {msg_type:?} payload: expected {expected} bytes, got {actual}")]
    Truncated {
        msg_type: MessageType,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}
