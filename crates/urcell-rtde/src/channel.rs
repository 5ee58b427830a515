//! RTDE 控制通道
//!
//! 负责握手、recipe 注册以及启动后的周期性收发。控制器决定节奏：
//! 每个周期它推送一条输出记录，客户端在同一周期内回写输入记录。

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error, info, warn};
use urcell_protocol::{
    ClientMessage, ControllerMessage, ControllerVersion, FieldType, PROTOCOL_VERSION, Recipe,
    RecipeInstance, RecipeKind, TextLevel, TextMessage, decode, encode,
};

use crate::transport::Transport;
use crate::{CloseReason, RtdeConfig, RtdeError};

/// 控制器对字段的拒绝标记
const NOT_FOUND: &str = "NOT_FOUND";
const IN_USE: &str = "IN_USE";

/// 已注册的 recipe
///
/// 持有控制器分配的 id；通过 [`RecipeHandle::instance`] 创建绑定该 id 的实例。
#[derive(Debug, Clone)]
pub struct RecipeHandle {
    id: u8,
    kind: RecipeKind,
    recipe: Arc<Recipe>,
}

impl RecipeHandle {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn kind(&self) -> RecipeKind {
        self.kind
    }

    pub fn recipe(&self) -> &Arc<Recipe> {
        &self.recipe
    }

    /// 创建绑定本 recipe id 的全零实例
    pub fn instance(&self) -> RecipeInstance {
        RecipeInstance::new(self.recipe.clone()).with_recipe_id(self.id)
    }
}

/// 通道状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    /// 已连接，可以协商版本和注册 recipe
    Connected,
    /// 周期交换进行中
    Started,
    Paused,
}

/// RTDE 控制通道
///
/// 单线程使用：所有操作都在调用线程上同步完成，`receive()` 是唯一的挂起点。
pub struct ControlChannel {
    config: RtdeConfig,
    transport: Option<Transport>,
    state: ChannelState,
    controller_version: Option<ControllerVersion>,
    output: Option<RecipeHandle>,
    inputs: Vec<RecipeHandle>,
    close_reason: Option<CloseReason>,
    skipped_packages: u64,
}

impl ControlChannel {
    pub fn new(config: RtdeConfig) -> Self {
        Self {
            config,
            transport: None,
            state: ChannelState::Disconnected,
            controller_version: None,
            output: None,
            inputs: Vec::new(),
            close_reason: None,
            skipped_packages: 0,
        }
    }

    pub fn config(&self) -> &RtdeConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// 最近一次 `receive()` 返回 `None` 的原因
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// 因有更新的记录而被丢弃的输出记录数
    pub fn skipped_packages(&self) -> u64 {
        self.skipped_packages
    }

    pub fn controller_version(&self) -> Option<ControllerVersion> {
        self.controller_version
    }

    pub fn output_recipe(&self) -> Option<&RecipeHandle> {
        self.output.as_ref()
    }

    pub fn input_recipes(&self) -> &[RecipeHandle] {
        &self.inputs
    }

    // ============================================================
    // 建立阶段
    // ============================================================

    /// 连接控制器
    ///
    /// # 错误
    /// - `Connection`: 连接被拒或超时
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), RtdeError> {
        if self.transport.is_some() {
            warn!("RTDE channel already connected, reconnecting to {}:{}", host, port);
            self.disconnect();
        }

        let transport = Transport::connect(host, port, self.config.connect_timeout)?;
        self.transport = Some(transport);
        self.state = ChannelState::Connected;
        self.close_reason = None;
        info!("Connected to RTDE controller at {}:{}", host, port);
        Ok(())
    }

    /// 协商协议版本并检查控制器版本
    ///
    /// # 错误
    /// - `ProtocolMismatch`: 控制器拒绝 v2 协议，或控制器版本过旧
    pub fn negotiate_version(&mut self) -> Result<(), RtdeError> {
        let reply = self.request(ClientMessage::RequestProtocolVersion {
            version: PROTOCOL_VERSION,
        })?;
        match reply {
            ControllerMessage::ProtocolVersion { accepted: true } => {
                debug!("RTDE protocol version {} accepted", PROTOCOL_VERSION);
            },
            ControllerMessage::ProtocolVersion { accepted: false } => {
                return Err(RtdeError::ProtocolMismatch(format!(
                    "controller refused protocol version {}",
                    PROTOCOL_VERSION
                )));
            },
            other => return Err(unexpected(&other)),
        }

        let version = match self.request(ClientMessage::GetControllerVersion)? {
            ControllerMessage::ControllerVersion(v) => v,
            other => return Err(unexpected(&other)),
        };

        // 控制器版本号的第四段是 build，`3.2.19171` 指 major.minor.build
        let comparable = semver::Version::new(
            u64::from(version.major),
            u64::from(version.minor),
            u64::from(version.build),
        );
        if comparable < self.config.min_controller_version {
            return Err(RtdeError::ProtocolMismatch(format!(
                "controller version {} is older than {}",
                version, self.config.min_controller_version
            )));
        }

        info!("RTDE controller version {}", version);
        self.controller_version = Some(version);
        Ok(())
    }

    /// 注册输出 recipe（控制器 → 客户端）
    ///
    /// 再次注册会替换之前的输出 recipe。
    ///
    /// # 错误
    /// - `InvalidFrequency`: `output_frequency` 不是正的有限值
    /// - `RecipeRejected`: 任一字段为 `NOT_FOUND` / `IN_USE`，或类型与声明不一致
    pub fn register_output_recipe(&mut self, recipe: Recipe) -> Result<RecipeHandle, RtdeError> {
        let frequency = self.config.output_frequency;
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(RtdeError::InvalidFrequency(frequency));
        }
        let names = recipe.names().map(str::to_string).collect();
        let reply = self.request(ClientMessage::SetupOutputs { frequency, names })?;
        let (recipe_id, types) = match reply {
            ControllerMessage::OutputSetup { recipe_id, types } => (recipe_id, types),
            other => return Err(unexpected(&other)),
        };

        let handle = validate_setup(recipe, RecipeKind::Output, recipe_id, &types)?;
        info!(
            "Registered output recipe {} ({} fields @ {} Hz)",
            handle.id,
            handle.recipe.len(),
            self.config.output_frequency
        );
        if let Some(previous) = self.output.replace(handle.clone()) {
            debug!("Output recipe {} replaced by {}", previous.id, handle.id);
        }
        Ok(handle)
    }

    /// 注册输入 recipe（客户端 → 控制器）
    ///
    /// # 错误
    /// - `RecipeRejected`: 任一字段为 `NOT_FOUND` / `IN_USE`，或类型与声明不一致
    pub fn register_input_recipe(&mut self, recipe: Recipe) -> Result<RecipeHandle, RtdeError> {
        let names = recipe.names().map(str::to_string).collect();
        let reply = self.request(ClientMessage::SetupInputs { names })?;
        let (recipe_id, types) = match reply {
            ControllerMessage::InputSetup { recipe_id, types } => (recipe_id, types),
            other => return Err(unexpected(&other)),
        };

        let handle = validate_setup(recipe, RecipeKind::Input, recipe_id, &types)?;
        info!(
            "Registered input recipe {} ({} fields)",
            handle.id,
            handle.recipe.len()
        );
        self.inputs.push(handle.clone());
        Ok(handle)
    }

    /// 启动周期交换
    ///
    /// 返回 `false` 表示控制器拒绝启动，对本次会话是致命的。
    pub fn start(&mut self) -> Result<bool, RtdeError> {
        if self.output.is_none() {
            warn!("Starting RTDE exchange without an output recipe");
        }
        match self.request(ClientMessage::Start)? {
            ControllerMessage::Start { accepted: true } => {
                self.state = ChannelState::Started;
                info!("RTDE synchronization started");
                Ok(true)
            },
            ControllerMessage::Start { accepted: false } => {
                error!("Controller refused to start RTDE synchronization");
                Ok(false)
            },
            other => Err(unexpected(&other)),
        }
    }

    // ============================================================
    // 周期交换
    // ============================================================

    /// 接收最新的输出记录
    ///
    /// 最多等待 `receive_timeout`。以下情况返回 `None`，原因见 [`close_reason`](Self::close_reason)：
    /// 控制器关闭连接、超时、记录解码失败、通道未启动。
    ///
    /// 若已有多条记录到达，较早的记录被丢弃，只返回最新一条。
    pub fn receive(&mut self) -> Option<RecipeInstance> {
        match self.receive_latest() {
            Ok(instance) => Some(instance),
            Err(reason) => {
                match reason {
                    CloseReason::Shutdown => info!("RTDE controller closed the connection"),
                    CloseReason::Timeout => warn!(
                        "No RTDE output record within {:?}",
                        self.config.receive_timeout
                    ),
                    ref other => error!("RTDE receive failed: {}", other),
                }
                self.close_reason = Some(reason);
                None
            },
        }
    }

    fn receive_latest(&mut self) -> Result<RecipeInstance, CloseReason> {
        let output = match (&self.transport, self.state, &self.output) {
            (None, ..) => return Err(CloseReason::NotConnected),
            (Some(_), ChannelState::Started, Some(output)) => output.clone(),
            _ => return Err(CloseReason::NotStarted),
        };
        let transport = self.transport.as_mut().ok_or(CloseReason::NotConnected)?;
        let deadline = Instant::now() + self.config.receive_timeout;

        let mut latest: Option<Bytes> = None;
        while latest.is_none() {
            let frame = transport.read_frame(deadline)?;
            latest = accept_output(&ControllerMessage::decode(&frame).map_err(RtdeError::from)?, output.id)?;
        }

        // 连接关闭等错误留到下一次 receive() 报告，先交付已收到的记录
        let mut skipped = 0u64;
        loop {
            let frame = match transport.poll_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped draining RTDE stream: {}", e);
                    break;
                },
            };
            let message = ControllerMessage::decode(&frame).map_err(RtdeError::from)?;
            if let Some(payload) = accept_output(&message, output.id)? {
                skipped += 1;
                latest = Some(payload);
            }
        }
        if skipped > 0 {
            self.skipped_packages += skipped;
            debug!("Dropped {} stale RTDE output record(s)", skipped);
        }

        let payload = latest.ok_or(CloseReason::Timeout)?;
        let instance = decode(&output.recipe, &payload).map_err(CloseReason::Malformed)?;
        Ok(instance.with_recipe_id(output.id))
    }

    /// 发送输入记录
    ///
    /// # 错误
    /// - `NotRegistered`: 实例绑定的 recipe 不是本通道注册的输入 recipe
    /// - `NotConnected`: 通道未连接
    pub fn send(&mut self, instance: &RecipeInstance) -> Result<(), RtdeError> {
        let handle = instance
            .recipe_id()
            .and_then(|id| self.inputs.iter().find(|h| h.id == id))
            .filter(|h| h.recipe.as_ref() == instance.recipe().as_ref())
            .ok_or(RtdeError::NotRegistered {
                recipe_id: instance.recipe_id(),
            })?;

        let payload = encode(&handle.recipe, instance)?;
        let frame = ClientMessage::DataPackage {
            recipe_id: handle.id,
            payload: Bytes::from(payload),
        }
        .encode()?;

        let transport = self.transport.as_mut().ok_or(RtdeError::NotConnected)?;
        transport.write_frame(&frame)
    }

    // ============================================================
    // 关闭
    // ============================================================

    /// 暂停周期交换（幂等）
    ///
    /// 控制器已关闭连接时无需暂停，直接返回。
    pub fn pause(&mut self) -> Result<(), RtdeError> {
        if self.state != ChannelState::Started || self.transport.is_none() {
            return Ok(());
        }
        if self.close_reason == Some(CloseReason::Shutdown) {
            debug!("Controller already closed the connection, skipping pause");
            return Ok(());
        }
        match self.request(ClientMessage::Pause)? {
            ControllerMessage::Pause { accepted: true } => {
                self.state = ChannelState::Paused;
                info!("RTDE synchronization paused");
                Ok(())
            },
            ControllerMessage::Pause { accepted: false } => Err(RtdeError::PauseRefused),
            other => Err(unexpected(&other)),
        }
    }

    /// 断开连接并清除所有注册（幂等）
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown();
            info!("Disconnected from RTDE controller");
        }
        self.state = ChannelState::Disconnected;
        self.output = None;
        self.inputs.clear();
    }

    /// 发送请求并等待同类型的应答
    ///
    /// 等待期间到达的文本消息被记录，数据包被丢弃。
    fn request(&mut self, message: ClientMessage) -> Result<ControllerMessage, RtdeError> {
        let expected = message.msg_type();
        let frame = message.encode()?;
        let transport = self.transport.as_mut().ok_or(RtdeError::NotConnected)?;
        transport.write_frame(&frame)?;

        let deadline = Instant::now() + self.config.reply_timeout;
        loop {
            let reply = ControllerMessage::decode(&transport.read_frame(deadline)?)?;
            if reply.msg_type() == expected {
                return Ok(reply);
            }
            match reply {
                ControllerMessage::Text(text) => log_text(&text),
                ControllerMessage::DataPackage { recipe_id, .. } => {
                    debug!("Discarding data package {} while awaiting {:?}", recipe_id, expected);
                },
                other => warn!("Ignoring {:?} while awaiting {:?}", other.msg_type(), expected),
            }
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 校验控制器的 setup 应答，返回注册句柄
fn validate_setup(
    recipe: Recipe,
    kind: RecipeKind,
    recipe_id: u8,
    types: &[String],
) -> Result<RecipeHandle, RtdeError> {
    if types.len() != recipe.len() {
        return Err(RtdeError::UnexpectedReply(format!(
            "setup reply lists {} types for {} fields",
            types.len(),
            recipe.len()
        )));
    }

    for (field, reported) in recipe.fields().iter().zip(types) {
        let rejected = |reason: String| RtdeError::RecipeRejected {
            field: field.name.clone(),
            reason,
        };
        match reported.as_str() {
            NOT_FOUND | IN_USE => return Err(rejected(reported.clone())),
            other => {
                let actual: FieldType = other
                    .parse()
                    .map_err(|_| rejected(format!("unknown type {other}")))?;
                if actual != field.ty {
                    return Err(rejected(format!(
                        "controller type {actual}, declared {}",
                        field.ty
                    )));
                }
            },
        }
    }

    if recipe_id == 0 {
        return Err(RtdeError::RecipeRejected {
            field: recipe.names().collect::<Vec<_>>().join(","),
            reason: "controller assigned recipe id 0".into(),
        });
    }

    Ok(RecipeHandle {
        id: recipe_id,
        kind,
        recipe: Arc::new(recipe),
    })
}

/// 周期阶段的消息分派：返回本通道输出 recipe 的记录负载
fn accept_output(message: &ControllerMessage, output_id: u8) -> Result<Option<Bytes>, CloseReason> {
    match message {
        ControllerMessage::DataPackage { recipe_id, payload } if *recipe_id == output_id => {
            Ok(Some(payload.clone()))
        },
        ControllerMessage::DataPackage { recipe_id, .. } => Err(CloseReason::RecipeMismatch {
            expected: output_id,
            actual: *recipe_id,
        }),
        ControllerMessage::Text(text) => {
            log_text(text);
            Ok(None)
        },
        other => {
            debug!("Ignoring {:?} during cyclic exchange", other.msg_type());
            Ok(None)
        },
    }
}

/// 按控制器给出的级别记录文本消息
fn log_text(text: &TextMessage) {
    match text.level {
        TextLevel::Exception | TextLevel::Error => {
            error!(source = %text.source, "{}", text.message)
        },
        TextLevel::Warning => warn!(source = %text.source, "{}", text.message),
        TextLevel::Info => info!(source = %text.source, "{}", text.message),
    }
}

fn unexpected(message: &ControllerMessage) -> RtdeError {
    RtdeError::UnexpectedReply(format!("{:?}", message.msg_type()))
}
