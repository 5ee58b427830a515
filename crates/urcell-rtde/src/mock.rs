//! 进程内 RTDE 控制器替身
//!
//! 在 `127.0.0.1` 的随机端口上接受一个连接，按 [`ControllerScript`] 应答握手、
//! 注册和启动请求，然后按周期推送脚本中的输出记录。所有收到的客户端消息
//! 记录在 [`ControllerLog`] 中，供测试断言。
//!
//! 周期节奏：启动后先推送一条记录；每收到与已注册输入 recipe 数量相同的
//! 数据包（即客户端完成一个周期），再推送下一条。

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use urcell_protocol::codec::encode_values;
use urcell_protocol::{
    ClientMessage, ControllerMessage, ControllerVersion, FieldType, FrameDecoder, MessageType,
    TextLevel, TextMessage, Value,
};

/// 一条脚本化的控制器输出
#[derive(Debug, Clone)]
pub enum ScriptedRecord {
    /// 输出 recipe 全零，仅完成标志字段取给定值
    Flag(i32),
    /// 原样发送的记录字节（用于构造非法记录）
    Raw(Vec<u8>),
    /// 控制器文本消息（不占用周期）
    Text(String),
}

/// 控制器替身的行为脚本
#[derive(Debug, Clone)]
pub struct ControllerScript {
    pub accept_protocol: bool,
    pub version: ControllerVersion,
    pub accept_start: bool,
    /// 注册输入 recipe 时应答 `IN_USE` 的字段
    pub in_use: Vec<String>,
    /// 按周期推送的输出
    pub records: Vec<ScriptedRecord>,
    /// 为 `true` 时启动后立即推送全部记录，不等待客户端
    pub burst: bool,
    /// 记录耗尽后关闭连接；否则保持连接直到客户端断开
    pub close_when_done: bool,
    /// `Flag` 记录写入的输出字段
    pub flag_field: String,
}

impl Default for ControllerScript {
    fn default() -> Self {
        Self {
            accept_protocol: true,
            version: ControllerVersion {
                major: 5,
                minor: 11,
                bugfix: 1,
                build: 108318,
            },
            accept_start: true,
            in_use: Vec::new(),
            records: Vec::new(),
            burst: false,
            close_when_done: true,
            flag_field: "output_int_register_0".to_string(),
        }
    }
}

impl ControllerScript {
    pub fn with_flags(flags: impl IntoIterator<Item = i32>) -> Self {
        Self {
            records: flags.into_iter().map(ScriptedRecord::Flag).collect(),
            ..Self::default()
        }
    }
}

/// 控制器替身收到的客户端消息
#[derive(Debug, Clone, Default)]
pub struct ControllerLog {
    pub messages: Vec<ClientMessage>,
}

impl ControllerLog {
    pub fn count(&self, msg_type: MessageType) -> usize {
        self.messages
            .iter()
            .filter(|m| m.msg_type() == msg_type)
            .count()
    }

    /// 客户端发来的输入数据包 (recipe id, 记录字节)
    pub fn data_packages(&self) -> Vec<(u8, Bytes)> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                ClientMessage::DataPackage { recipe_id, payload } => {
                    Some((*recipe_id, payload.clone()))
                },
                _ => None,
            })
            .collect()
    }
}

/// 控制器上的变量类型表（与 UR 控制器一致的子集）
///
/// 未知变量返回 `NOT_FOUND`。
pub fn variable_type(name: &str) -> &'static str {
    const DOUBLE_REGISTERS: &str = "input_double_register_";
    const INT_REGISTERS: &str = "input_int_register_";
    match name {
        "timestamp" => FieldType::Double.as_str(),
        "actual_q" | "actual_qd" | "actual_TCP_pose" | "target_TCP_pose" | "actual_TCP_speed" => {
            FieldType::Vector6d.as_str()
        },
        "robot_mode" | "safety_mode" => FieldType::Int32.as_str(),
        "runtime_state" | "robot_status_bits" => FieldType::Uint32.as_str(),
        "speed_slider_mask" => FieldType::Uint32.as_str(),
        "speed_slider_fraction" => FieldType::Double.as_str(),
        "actual_digital_output_bits" => FieldType::Uint64.as_str(),
        n if n.starts_with("output_int_register_") || n.starts_with(INT_REGISTERS) => {
            FieldType::Int32.as_str()
        },
        n if n.starts_with("output_double_register_") || n.starts_with(DOUBLE_REGISTERS) => {
            FieldType::Double.as_str()
        },
        n if n.starts_with("output_bit_register_") || n.starts_with("input_bit_register_") => {
            FieldType::Bool.as_str()
        },
        _ => "NOT_FOUND",
    }
}

/// RTDE 控制器替身
pub struct FakeController {
    addr: SocketAddr,
    handle: JoinHandle<io::Result<ControllerLog>>,
}

impl FakeController {
    /// 绑定随机端口并在后台线程中运行脚本
    pub fn spawn(script: ControllerScript) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept()?;
            Session::new(stream, script)?.run()
        });
        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// 等待会话结束（客户端断开或脚本关闭连接）
    pub fn join(self) -> io::Result<ControllerLog> {
        self.handle
            .join()
            .map_err(|_| io::Error::other("fake controller thread panicked"))?
    }
}

struct Session {
    stream: TcpStream,
    decoder: FrameDecoder,
    script: ControllerScript,
    log: ControllerLog,
    next_recipe_id: u8,
    output_id: u8,
    output_types: Vec<(String, FieldType)>,
    input_recipes: usize,
    cursor: usize,
    packages_this_cycle: usize,
}

impl Session {
    fn new(stream: TcpStream, script: ControllerScript) -> io::Result<Self> {
        // 防止测试失败时替身永远阻塞
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            decoder: FrameDecoder::new(),
            script,
            log: ControllerLog::default(),
            next_recipe_id: 1,
            output_id: 0,
            output_types: Vec::new(),
            input_recipes: 0,
            cursor: 0,
            packages_this_cycle: 0,
        })
    }

    fn run(mut self) -> io::Result<ControllerLog> {
        let mut chunk = [0u8; 4096];
        loop {
            let n = match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    break;
                },
                Err(e) => return Err(e),
            };
            self.decoder.extend(&chunk[..n]);

            while let Some(frame) = self.decoder.next_frame().map_err(invalid_data)? {
                let message = ClientMessage::decode(&frame).map_err(invalid_data)?;
                self.log.messages.push(message.clone());
                if !self.handle(message)? {
                    return Ok(self.log);
                }
            }
        }
        Ok(self.log)
    }

    /// 处理一条客户端消息；返回 `false` 表示替身主动关闭连接
    fn handle(&mut self, message: ClientMessage) -> io::Result<bool> {
        match message {
            ClientMessage::RequestProtocolVersion { version } => {
                let accepted = self.script.accept_protocol && version == 2;
                self.reply(ControllerMessage::ProtocolVersion { accepted })?;
            },
            ClientMessage::GetControllerVersion => {
                self.reply(ControllerMessage::ControllerVersion(self.script.version))?;
            },
            ClientMessage::SetupOutputs { names, .. } => {
                let types: Vec<String> = names
                    .iter()
                    .map(|n| variable_type(n).to_string())
                    .collect();
                self.output_types = names
                    .iter()
                    .zip(&types)
                    .filter_map(|(n, t)| t.parse().ok().map(|ty| (n.clone(), ty)))
                    .collect();
                let recipe_id = self.allocate_id();
                self.output_id = recipe_id;
                self.reply(ControllerMessage::OutputSetup { recipe_id, types })?;
            },
            ClientMessage::SetupInputs { names } => {
                let types: Vec<String> = names
                    .iter()
                    .map(|n| {
                        if self.script.in_use.contains(n) {
                            "IN_USE".to_string()
                        } else {
                            variable_type(n).to_string()
                        }
                    })
                    .collect();
                self.input_recipes += 1;
                let recipe_id = self.allocate_id();
                self.reply(ControllerMessage::InputSetup { recipe_id, types })?;
            },
            ClientMessage::Start => {
                let accepted = self.script.accept_start;
                self.reply(ControllerMessage::Start { accepted })?;
                if accepted && (self.script.burst || self.input_recipes == 0) {
                    while self.cursor < self.script.records.len() {
                        self.push_next()?;
                    }
                    return self.continue_or_close();
                } else if accepted {
                    self.push_next()?;
                }
            },
            ClientMessage::Pause => {
                self.reply(ControllerMessage::Pause { accepted: true })?;
            },
            ClientMessage::DataPackage { .. } => {
                self.packages_this_cycle += 1;
                if self.packages_this_cycle >= self.input_recipes.max(1) {
                    self.packages_this_cycle = 0;
                    if !self.script.burst {
                        if !self.continue_or_close()? {
                            return Ok(false);
                        }
                        self.push_next()?;
                    }
                }
            },
        }
        Ok(true)
    }

    /// 记录耗尽且脚本要求关闭时返回 `false`
    fn continue_or_close(&mut self) -> io::Result<bool> {
        if self.cursor >= self.script.records.len() && self.script.close_when_done {
            self.stream.shutdown(std::net::Shutdown::Both)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// 推送下一条记录；文本消息不占用周期，继续推送其后的记录
    fn push_next(&mut self) -> io::Result<()> {
        while let Some(record) = self.script.records.get(self.cursor).cloned() {
            self.cursor += 1;
            match record {
                ScriptedRecord::Text(message) => {
                    self.reply(ControllerMessage::Text(TextMessage {
                        level: TextLevel::Warning,
                        message,
                        source: "RTDE".into(),
                    }))?;
                },
                ScriptedRecord::Flag(flag) => {
                    let payload = self.flag_record(flag);
                    return self.reply(ControllerMessage::DataPackage {
                        recipe_id: self.output_id,
                        payload,
                    });
                },
                ScriptedRecord::Raw(bytes) => {
                    return self.reply(ControllerMessage::DataPackage {
                        recipe_id: self.output_id,
                        payload: Bytes::from(bytes),
                    });
                },
            }
        }
        Ok(())
    }

    fn flag_record(&self, flag: i32) -> Bytes {
        let values: Vec<Value> = self
            .output_types
            .iter()
            .map(|(name, ty)| {
                if *name == self.script.flag_field {
                    Value::from_f64(*ty, f64::from(flag)).unwrap_or(Value::zero(*ty))
                } else {
                    Value::zero(*ty)
                }
            })
            .collect();
        let mut buf = BytesMut::new();
        encode_values(&values, &mut buf);
        buf.freeze()
    }

    fn allocate_id(&mut self) -> u8 {
        let id = self.next_recipe_id;
        self.next_recipe_id = self.next_recipe_id.wrapping_add(1);
        id
    }

    fn reply(&mut self, message: ControllerMessage) -> io::Result<()> {
        let bytes = message.encode().map_err(invalid_data)?;
        self.stream.write_all(&bytes)
    }
}

fn invalid_data(e: urcell_protocol::ProtocolError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}
