//! RTDE v2 消息
//!
//! 同一个类型字节在两个方向上含义不同（例如 `S` 既是启动请求也是启动应答），
//! 因此按方向拆成 [`ClientMessage`] 和 [`ControllerMessage`] 两个枚举，
//! 各自提供编码与解码。

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ProtocolError;
use crate::frame::{Frame, encode_frame};

// ============================================================================
// Message Types
// ============================================================================

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageType {
    RequestProtocolVersion = b'V',
    GetUrcontrolVersion = b'v',
    TextMessage = b'M',
    DataPackage = b'U',
    ControlPackageSetupOutputs = b'O',
    ControlPackageSetupInputs = b'I',
    ControlPackageStart = b'S',
    ControlPackagePause = b'P',
}

/// 文本消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TextLevel {
    Exception = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
}

/// 控制器推送的文本消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub level: TextLevel,
    pub message: String,
    pub source: String,
}

/// 控制器软件版本（`major.minor.bugfix.build`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerVersion {
    pub major: u32,
    pub minor: u32,
    pub bugfix: u32,
    pub build: u32,
}

impl std::fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.bugfix, self.build
        )
    }
}

// ============================================================================
// Client → Controller
// ============================================================================

/// 客户端发往控制器的消息
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    RequestProtocolVersion { version: u16 },
    GetControllerVersion,
    /// 输出 recipe 注册：期望频率 + 变量名
    SetupOutputs { frequency: f64, names: Vec<String> },
    /// 输入 recipe 注册：变量名
    SetupInputs { names: Vec<String> },
    Start,
    Pause,
    DataPackage { recipe_id: u8, payload: Bytes },
}

impl ClientMessage {
    pub fn msg_type(&self) -> MessageType {
        match self {
            ClientMessage::RequestProtocolVersion { .. } => MessageType::RequestProtocolVersion,
            ClientMessage::GetControllerVersion => MessageType::GetUrcontrolVersion,
            ClientMessage::SetupOutputs { .. } => MessageType::ControlPackageSetupOutputs,
            ClientMessage::SetupInputs { .. } => MessageType::ControlPackageSetupInputs,
            ClientMessage::Start => MessageType::ControlPackageStart,
            ClientMessage::Pause => MessageType::ControlPackagePause,
            ClientMessage::DataPackage { .. } => MessageType::DataPackage,
        }
    }

    /// 编码为完整帧
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut payload = BytesMut::new();
        match self {
            ClientMessage::RequestProtocolVersion { version } => payload.put_u16(*version),
            ClientMessage::GetControllerVersion | ClientMessage::Start | ClientMessage::Pause => {},
            ClientMessage::SetupOutputs { frequency, names } => {
                payload.put_f64(*frequency);
                payload.put_slice(names.join(",").as_bytes());
            },
            ClientMessage::SetupInputs { names } => {
                payload.put_slice(names.join(",").as_bytes());
            },
            ClientMessage::DataPackage {
                recipe_id,
                payload: record,
            } => {
                payload.put_u8(*recipe_id);
                payload.put_slice(record);
            },
        }
        encode_frame(self.msg_type(), &payload)
    }

    /// 从帧解码（控制器侧 / 测试替身使用）
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let msg_type = frame.msg_type()?;
        let mut p = frame.payload.clone();
        let msg = match msg_type {
            MessageType::RequestProtocolVersion => {
                require(msg_type, &p, 2)?;
                ClientMessage::RequestProtocolVersion {
                    version: p.get_u16(),
                }
            },
            MessageType::GetUrcontrolVersion => ClientMessage::GetControllerVersion,
            MessageType::ControlPackageSetupOutputs => {
                require(msg_type, &p, 8)?;
                let frequency = p.get_f64();
                ClientMessage::SetupOutputs {
                    frequency,
                    names: split_csv(&p)?,
                }
            },
            MessageType::ControlPackageSetupInputs => ClientMessage::SetupInputs {
                names: split_csv(&p)?,
            },
            MessageType::ControlPackageStart => ClientMessage::Start,
            MessageType::ControlPackagePause => ClientMessage::Pause,
            MessageType::DataPackage => {
                require(msg_type, &p, 1)?;
                let recipe_id = p.get_u8();
                ClientMessage::DataPackage {
                    recipe_id,
                    payload: p,
                }
            },
            MessageType::TextMessage => {
                return Err(ProtocolError::InvalidPayload(
                    "text messages are controller-to-client only".into(),
                ));
            },
        };
        Ok(msg)
    }
}

// ============================================================================
// Controller → Client
// ============================================================================

/// 控制器发往客户端的消息
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerMessage {
    ProtocolVersion { accepted: bool },
    ControllerVersion(ControllerVersion),
    Text(TextMessage),
    /// 输出 recipe 应答：recipe id + 每个变量的类型（或 `NOT_FOUND`）
    OutputSetup { recipe_id: u8, types: Vec<String> },
    /// 输入 recipe 应答：recipe id + 每个变量的类型（或 `NOT_FOUND` / `IN_USE`）
    InputSetup { recipe_id: u8, types: Vec<String> },
    Start { accepted: bool },
    Pause { accepted: bool },
    DataPackage { recipe_id: u8, payload: Bytes },
}

impl ControllerMessage {
    pub fn msg_type(&self) -> MessageType {
        match self {
            ControllerMessage::ProtocolVersion { .. } => MessageType::RequestProtocolVersion,
            ControllerMessage::ControllerVersion(_) => MessageType::GetUrcontrolVersion,
            ControllerMessage::Text(_) => MessageType::TextMessage,
            ControllerMessage::OutputSetup { .. } => MessageType::ControlPackageSetupOutputs,
            ControllerMessage::InputSetup { .. } => MessageType::ControlPackageSetupInputs,
            ControllerMessage::Start { .. } => MessageType::ControlPackageStart,
            ControllerMessage::Pause { .. } => MessageType::ControlPackagePause,
            ControllerMessage::DataPackage { .. } => MessageType::DataPackage,
        }
    }

    /// 编码为完整帧（测试替身使用）
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut payload = BytesMut::new();
        match self {
            ControllerMessage::ProtocolVersion { accepted }
            | ControllerMessage::Start { accepted }
            | ControllerMessage::Pause { accepted } => payload.put_u8(*accepted as u8),
            ControllerMessage::ControllerVersion(v) => {
                payload.put_u32(v.major);
                payload.put_u32(v.minor);
                payload.put_u32(v.bugfix);
                payload.put_u32(v.build);
            },
            ControllerMessage::Text(text) => {
                put_short_str(&mut payload, &text.message)?;
                put_short_str(&mut payload, &text.source)?;
                payload.put_u8(text.level.into());
            },
            ControllerMessage::OutputSetup { recipe_id, types }
            | ControllerMessage::InputSetup { recipe_id, types } => {
                payload.put_u8(*recipe_id);
                payload.put_slice(types.join(",").as_bytes());
            },
            ControllerMessage::DataPackage {
                recipe_id,
                payload: record,
            } => {
                payload.put_u8(*recipe_id);
                payload.put_slice(record);
            },
        }
        encode_frame(self.msg_type(), &payload)
    }

    /// 从帧解码
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let msg_type = frame.msg_type()?;
        let mut p = frame.payload.clone();
        let msg = match msg_type {
            MessageType::RequestProtocolVersion => {
                require(msg_type, &p, 1)?;
                ControllerMessage::ProtocolVersion {
                    accepted: p.get_u8() != 0,
                }
            },
            MessageType::GetUrcontrolVersion => {
                require(msg_type, &p, 16)?;
                ControllerMessage::ControllerVersion(ControllerVersion {
                    major: p.get_u32(),
                    minor: p.get_u32(),
                    bugfix: p.get_u32(),
                    build: p.get_u32(),
                })
            },
            MessageType::TextMessage => {
                let message = get_short_str(msg_type, &mut p)?;
                let source = get_short_str(msg_type, &mut p)?;
                require(msg_type, &p, 1)?;
                let level = TextLevel::try_from(p.get_u8()).unwrap_or(TextLevel::Info);
                ControllerMessage::Text(TextMessage {
                    level,
                    message,
                    source,
                })
            },
            MessageType::ControlPackageSetupOutputs | MessageType::ControlPackageSetupInputs => {
                require(msg_type, &p, 1)?;
                let recipe_id = p.get_u8();
                let types = split_csv(&p)?;
                if msg_type == MessageType::ControlPackageSetupOutputs {
                    ControllerMessage::OutputSetup { recipe_id, types }
                } else {
                    ControllerMessage::InputSetup { recipe_id, types }
                }
            },
            MessageType::ControlPackageStart => {
                require(msg_type, &p, 1)?;
                ControllerMessage::Start {
                    accepted: p.get_u8() != 0,
                }
            },
            MessageType::ControlPackagePause => {
                require(msg_type, &p, 1)?;
                ControllerMessage::Pause {
                    accepted: p.get_u8() != 0,
                }
            },
            MessageType::DataPackage => {
                require(msg_type, &p, 1)?;
                let recipe_id = p.get_u8();
                ControllerMessage::DataPackage {
                    recipe_id,
                    payload: p,
                }
            },
        };
        Ok(msg)
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

fn require(msg_type: MessageType, p: &Bytes, expected: usize) -> Result<(), ProtocolError> {
    if p.len() < expected {
        return Err(ProtocolError::Truncated {
            msg_type,
            expected,
            actual: p.len(),
        });
    }
    Ok(())
}

fn split_csv(p: &[u8]) -> Result<Vec<String>, ProtocolError> {
    let text = std::str::from_utf8(p)
        .map_err(|e| ProtocolError::InvalidPayload(format!("non-UTF-8 name list: {e}")))?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(text.split(',').map(|s| s.trim().to_string()).collect())
}

fn put_short_str(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    let len = u8::try_from(s.len()).map_err(|_| ProtocolError::PayloadTooLarge(s.len()))?;
    buf.put_u8(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_short_str(msg_type: MessageType, p: &mut Bytes) -> Result<String, ProtocolError> {
    require(msg_type, p, 1)?;
    let len = p.get_u8() as usize;
    require(msg_type, p, len)?;
    let raw = p.split_to(len);
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
