//! 夹爪命令通道
//!
//! URCap 在控制器上开放一个 ASCII socket：
//!
//! ```text
//! SET POS 255 SPE 255 FOR 255 GTO 1\n   →  ack
//! GET POS\n                              →  POS 227
//! ```
//!
//! 应答不带换行，每条命令对应一次读取。所有寄存器往返都在同一把命令锁下完成，
//! 其他线程的状态读取不会插进一条命令的请求与应答之间。

use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spin_sleep::SpinSleeper;
use tracing::{debug, info, trace};

use crate::registers::{ActivationStatus, ObjectStatus, Register};
use crate::status::{
    CLOSED_POSITION, GripperCommand, GripperStatus, OPEN_POSITION, PositionRange,
    RegisterSnapshot,
};
use crate::{GripperConfig, GripperError};

const ACK: &str = "ack";
const REPLY_BUF: usize = 1024;

/// 单个 TCP 连接上的寄存器读写
struct RegisterLink {
    stream: TcpStream,
    buf: [u8; REPLY_BUF],
}

impl RegisterLink {
    fn transact(&mut self, command: &str) -> Result<String, GripperError> {
        trace!("gripper <- {}", command.trim_end());
        self.stream.write_all(command.as_bytes())?;
        let n = self.stream.read(&mut self.buf)?;
        if n == 0 {
            return Err(GripperError::Connection(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "gripper closed the connection",
            )));
        }
        let reply = String::from_utf8_lossy(&self.buf[..n]).trim().to_string();
        trace!("gripper -> {}", reply);
        Ok(reply)
    }

    fn set(&mut self, vars: &[(Register, u8)]) -> Result<(), GripperError> {
        let mut command = String::from("SET");
        for (register, value) in vars {
            let _ = write!(command, " {register} {value}");
        }
        command.push('\n');

        let reply = self.transact(&command)?;
        if reply != ACK {
            return Err(GripperError::Nack {
                command: command.trim_end().to_string(),
                reply,
            });
        }
        Ok(())
    }

    fn get(&mut self, register: Register) -> Result<u8, GripperError> {
        let reply = self.transact(&format!("GET {register}\n"))?;
        let mut parts = reply.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(value), None) if name == register.as_str() => {
                value.parse().map_err(|_| GripperError::UnexpectedReply {
                    register,
                    reply: reply.clone(),
                })
            },
            _ => Err(GripperError::UnexpectedReply { register, reply }),
        }
    }

    fn snapshot(&mut self) -> Result<RegisterSnapshot, GripperError> {
        Ok(RegisterSnapshot {
            act: self.get(Register::Act)?,
            gto: self.get(Register::Gto)?,
            sta: self.get(Register::Sta)?,
            obj: self.get(Register::Obj)?,
            pos: self.get(Register::Pos)?,
            pre: self.get(Register::Pre)?,
            flt: self.get(Register::Flt)?,
        })
    }
}

struct Inner {
    link: Option<RegisterLink>,
    range: PositionRange,
    /// 最近一次下发的（已限幅）目标位置
    last_target: Option<u8>,
}

/// 夹爪命令通道
///
/// 所有方法只需要 `&self`，可以通过 `Arc` 在线程间共享。
pub struct ActuatorChannel {
    config: GripperConfig,
    inner: Mutex<Inner>,
    sleeper: SpinSleeper,
}

impl ActuatorChannel {
    pub fn new(config: GripperConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                link: None,
                range: PositionRange::default(),
                last_target: None,
            }),
            sleeper: SpinSleeper::default(),
        }
    }

    pub fn config(&self) -> &GripperConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().link.is_some()
    }

    /// 当前可用行程
    pub fn range(&self) -> PositionRange {
        self.inner.lock().range
    }

    /// 最近一次下发的目标位置
    pub fn last_target(&self) -> Option<u8> {
        self.inner.lock().last_target
    }

    /// 连接夹爪 socket
    pub fn connect(&self, host: &str, port: u16) -> Result<(), GripperError> {
        let timeout = self.config.socket_timeout;
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    self.inner.lock().link = Some(RegisterLink {
                        stream,
                        buf: [0u8; REPLY_BUF],
                    });
                    info!("Connected to gripper at {}", addr);
                    return Ok(());
                },
                Err(e) => last_err = Some(e),
            }
        }
        Err(GripperError::Connection(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{host}:{port} did not resolve to any address"),
            )
        })))
    }

    /// 断开连接（幂等）
    pub fn disconnect(&self) {
        if let Some(link) = self.inner.lock().link.take() {
            let _ = link.stream.shutdown(Shutdown::Both);
            info!("Disconnected from gripper");
        }
    }

    fn with_link<R>(
        &self,
        f: impl FnOnce(&mut RegisterLink) -> Result<R, GripperError>,
    ) -> Result<R, GripperError> {
        let mut inner = self.inner.lock();
        let link = inner.link.as_mut().ok_or(GripperError::NotConnected)?;
        f(link)
    }

    // ============================================================
    // 激活
    // ============================================================

    /// 激活状态已完成（STA=3）
    pub fn is_active(&self) -> Result<bool, GripperError> {
        let sta = self.with_link(|link| link.get(Register::Sta))?;
        Ok(sta == u8::from(ActivationStatus::Active))
    }

    /// 复位：ACT=0, ATR=0，直到 ACT=0 且 STA=0
    pub fn reset(&self) -> Result<(), GripperError> {
        let reset = [(Register::Act, 0), (Register::Atr, 0)];
        self.with_link(|link| link.set(&reset))?;

        let max_polls = self.config.activation_max_polls;
        for _ in 0..max_polls {
            let (act, sta) =
                self.with_link(|link| Ok((link.get(Register::Act)?, link.get(Register::Sta)?)))?;
            if act == 0 && sta == u8::from(ActivationStatus::Reset) {
                debug!("Gripper reset");
                return Ok(());
            }
            self.with_link(|link| link.set(&reset))?;
            self.sleeper.sleep(self.config.poll_interval);
        }
        Err(GripperError::ActivationTimeout { polls: max_polls })
    }

    /// 激活夹爪
    ///
    /// 未激活时先复位，再写 ACT=1 并轮询至 ACT=1 且 STA=3。
    /// 配置了 `auto_calibrate` 时随后标定可用行程。
    ///
    /// # 错误
    /// - `ActivationTimeout`: 在 `activation_max_polls` 次轮询内未完成
    pub fn activate(&self) -> Result<(), GripperError> {
        if self.is_active()? {
            debug!("Gripper already active");
        } else {
            info!("Activating gripper");
            self.reset()?;
            self.with_link(|link| link.set(&[(Register::Act, 1)]))?;
            self.sleeper.sleep(self.config.activation_settle);

            let max_polls = self.config.activation_max_polls;
            let mut polls = 0;
            loop {
                let (act, sta) = self
                    .with_link(|link| Ok((link.get(Register::Act)?, link.get(Register::Sta)?)))?;
                if act == 1 && sta == u8::from(ActivationStatus::Active) {
                    break;
                }
                polls += 1;
                if polls >= max_polls {
                    return Err(GripperError::ActivationTimeout { polls });
                }
                self.sleeper.sleep(self.config.poll_interval);
            }
            info!("Gripper active after {} polls", polls);
        }

        if self.config.auto_calibrate {
            self.auto_calibrate()?;
        }
        Ok(())
    }

    /// 自动标定：全开、全闭、再全开，记录实际到达的两端
    pub fn auto_calibrate(&self) -> Result<PositionRange, GripperError> {
        let speed = self.config.calibration_speed;
        let force = self.config.calibration_force;
        let timeout = self.config.calibration_timeout;
        self.inner.lock().range = PositionRange::default();

        let reach = |position: u8| -> Result<u8, GripperError> {
            let status = self.move_and_wait(GripperCommand::new(position, speed, force), timeout)?;
            if !status.position_reached() {
                return Err(GripperError::CalibrationFailed {
                    position: status.current_position,
                    status: status.object_status,
                });
            }
            Ok(status.current_position)
        };

        reach(OPEN_POSITION)?;
        let max = reach(CLOSED_POSITION)?;
        let min = reach(OPEN_POSITION)?;

        let range = PositionRange { min, max };
        self.inner.lock().range = range;
        info!("Gripper calibrated: open={} closed={}", min, max);
        Ok(range)
    }

    // ============================================================
    // 运动
    // ============================================================

    /// 下发运动命令（不阻塞），返回限幅后的实际命令
    ///
    /// 后下发的命令覆盖之前未完成的命令。
    pub fn move_to(&self, command: GripperCommand) -> Result<GripperCommand, GripperError> {
        let mut inner = self.inner.lock();
        let clipped = command.clipped(inner.range);
        let link = inner.link.as_mut().ok_or(GripperError::NotConnected)?;
        link.set(&[
            (Register::Pos, clipped.position),
            (Register::Spe, clipped.speed),
            (Register::For, clipped.force),
            (Register::Gto, 1),
        ])?;
        inner.last_target = Some(clipped.position);
        debug!(
            "Gripper move to {} (speed {}, force {})",
            clipped.position, clipped.speed, clipped.force
        );
        Ok(clipped)
    }

    /// 等待最近一次命令停止
    ///
    /// 先等待 PRE 回显最近的目标（旧目标不会被误当作已停止），
    /// 再等待 OBJ 离开 `Moving`。
    ///
    /// # 错误
    /// - `ActuatorTimeout`: `timeout` 内未停止
    pub fn wait_for_position(&self, timeout: Duration) -> Result<GripperStatus, GripperError> {
        let deadline = Instant::now() + timeout;
        let target = self.last_target();

        if let Some(target) = target {
            while self.with_link(|link| link.get(Register::Pre))? != target {
                self.pause_until(deadline, target, timeout)?;
            }
        }

        let moving = u8::from(ObjectStatus::Moving);
        while self.with_link(|link| link.get(Register::Obj))? == moving {
            self.pause_until(deadline, target.unwrap_or_default(), timeout)?;
        }
        self.status()
    }

    /// 下发命令并等待停止
    pub fn move_and_wait(
        &self,
        command: GripperCommand,
        timeout: Duration,
    ) -> Result<GripperStatus, GripperError> {
        self.move_to(command)?;
        self.wait_for_position(timeout)
    }

    fn pause_until(
        &self,
        deadline: Instant,
        target: u8,
        timeout: Duration,
    ) -> Result<(), GripperError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(GripperError::ActuatorTimeout { target, timeout });
        }
        self.sleeper.sleep(remaining.min(self.config.poll_interval));
        Ok(())
    }

    // ============================================================
    // 状态
    // ============================================================

    /// 读取完整状态（一次加锁内读取全部寄存器）
    pub fn status(&self) -> Result<GripperStatus, GripperError> {
        let raw = self.with_link(RegisterLink::snapshot)?;
        Ok(GripperStatus::from_registers(&raw))
    }

    pub fn current_position(&self) -> Result<u8, GripperError> {
        self.with_link(|link| link.get(Register::Pos))
    }

    /// 当前位置不大于标定的张开端
    pub fn is_open(&self) -> Result<bool, GripperError> {
        let range = self.range();
        Ok(self.current_position()? <= range.min)
    }

    /// 当前位置不小于标定的闭合端
    pub fn is_closed(&self) -> Result<bool, GripperError> {
        let range = self.range();
        Ok(self.current_position()? >= range.max)
    }
}

impl Drop for ActuatorChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
