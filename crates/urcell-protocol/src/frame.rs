//! RTDE 消息帧
//!
//! ```text
//! +----------------+--------+------------------+
//! | size: u16 (BE) | type:u8| payload ...      |
//! +----------------+--------+------------------+
//! ```
//!
//! `size` 包含 3 字节帧头。TCP 是字节流，[`FrameDecoder`] 负责缓存半包，
//! 只在收到完整帧时才产出。

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;
use crate::message::MessageType;

/// 帧头长度（size + type）
pub const HEADER_LEN: usize = 3;

/// 一个完整的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 原始类型字节（未知类型由上层决定是否跳过）
    pub type_byte: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn msg_type(&self) -> Result<MessageType, ProtocolError> {
        MessageType::try_from(self.type_byte)
            .map_err(|_| ProtocolError::UnknownMessageType(self.type_byte))
    }
}

/// 编码一个完整帧
pub fn encode_frame(msg_type: MessageType, payload: &[u8]) -> Result<Bytes, ProtocolError> {
    let size = HEADER_LEN + payload.len();
    let size = u16::try_from(size).map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

    let mut buf = BytesMut::with_capacity(size as usize);
    buf.put_u16(size);
    buf.put_u8(msg_type.into());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// 流式帧解码器
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加从连接读取到的字节
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// 取出下一个完整帧；数据不足时返回 `Ok(None)`
    ///
    /// # 错误
    /// - `InvalidFrameSize`: size 字段小于帧头长度（流已失步，无法恢复）
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let size = u16::from_be_bytes([self.buf[0], self.buf[1]]);
        if (size as usize) < HEADER_LEN {
            return Err(ProtocolError::InvalidFrameSize(size));
        }
        if self.buf.len() < size as usize {
            return Ok(None);
        }

        let mut frame = self.buf.split_to(size as usize);
        frame.advance(2);
        let type_byte = frame.get_u8();
        Ok(Some(Frame {
            type_byte,
            payload: frame.freeze(),
        }))
    }
}
