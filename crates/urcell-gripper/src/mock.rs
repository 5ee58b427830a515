//! 进程内夹爪替身
//!
//! 实现 URCap ASCII 寄存器协议，并带一个按时间推进的运动模型：
//! - ACT=1 后经过 `activation_time` 进入 STA=3
//! - GTO=1 后手指以恒定速度向 POS 运动，全行程耗时 `stroke_time`
//! - 闭合途中遇到 `object_at` 时停在物体处并报告 OBJ=2
//! - 行程受 `travel_limits` 限制，到达限位即视为到达目标

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::registers::{ActivationStatus, ObjectStatus, Register};

/// 夹爪替身的行为脚本
#[derive(Debug, Clone)]
pub struct GripperScript {
    /// 连接时已激活
    pub start_active: bool,
    pub activation_time: Duration,
    /// 为 `false` 时 STA 永远停在 1
    pub activation_completes: bool,
    /// 0 → 255 全行程耗时
    pub stroke_time: Duration,
    /// 机械限位 (张开端, 闭合端)
    pub travel_limits: (u8, u8),
    /// 闭合时遇到的物体位置
    pub object_at: Option<u8>,
    /// 为 `true` 时手指卡住，OBJ 永远为 0
    pub stall: bool,
    /// PRE 回显新目标的延迟
    pub echo_delay: Duration,
}

impl Default for GripperScript {
    fn default() -> Self {
        Self {
            start_active: false,
            activation_time: Duration::from_millis(20),
            activation_completes: true,
            stroke_time: Duration::from_millis(100),
            travel_limits: (0, 255),
            object_at: None,
            stall: false,
            echo_delay: Duration::ZERO,
        }
    }
}

/// 替身收到的命令
#[derive(Debug, Clone, Default)]
pub struct GripperLog {
    /// 原样记录的 SET 命令（不含换行）
    pub sets: Vec<String>,
    pub gets: usize,
}

impl GripperLog {
    /// 所有 SET 命令中写入 `register` 的值，按时间顺序
    pub fn written(&self, register: Register) -> Vec<u8> {
        self.sets
            .iter()
            .flat_map(|line| parse_pairs(line))
            .filter(|(r, _)| *r == register)
            .map(|(_, v)| v)
            .collect()
    }
}

/// 夹爪替身
pub struct FakeGripper {
    addr: SocketAddr,
    handle: JoinHandle<io::Result<GripperLog>>,
}

impl FakeGripper {
    pub fn spawn(script: GripperScript) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept()?;
            serve(stream, script)
        });
        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// 等待客户端断开
    pub fn join(self) -> io::Result<GripperLog> {
        self.handle
            .join()
            .map_err(|_| io::Error::other("fake gripper thread panicked"))?
    }
}

fn serve(stream: TcpStream, script: GripperScript) -> io::Result<GripperLog> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.set_nodelay(true)?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut model = Model::new(script);
    let mut log = GripperLog::default();

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => break,
            Err(e) => return Err(e),
        }
        let command = line.trim();
        let now = Instant::now();

        // 与真实 URCap 一致，应答不带换行
        let reply = if command.starts_with("SET") {
            log.sets.push(command.to_string());
            model.apply(&parse_pairs(command), now);
            "ack".to_string()
        } else if let Some(name) = command.strip_prefix("GET ") {
            log.gets += 1;
            match name.trim().parse::<Register>() {
                Ok(register) => format!("{} {}", register, model.read(register, now)),
                Err(_) => "?".to_string(),
            }
        } else {
            "?".to_string()
        };
        writer.write_all(reply.as_bytes())?;
    }
    Ok(log)
}

fn parse_pairs(line: &str) -> Vec<(Register, u8)> {
    let mut tokens = line.split_whitespace().skip(1);
    let mut pairs = Vec::new();
    while let (Some(name), Some(value)) = (tokens.next(), tokens.next()) {
        if let (Ok(register), Ok(value)) = (name.parse(), value.parse()) {
            pairs.push((register, value));
        }
    }
    pairs
}

// ============================================================================
// 运动模型
// ============================================================================

struct Motion {
    from: u8,
    /// 实际停止位置（限位或物体）
    stop: u8,
    blocked: bool,
    started: Instant,
}

struct Model {
    script: GripperScript,
    act: u8,
    gto: u8,
    activated_at: Option<Instant>,
    /// 连接前已激活，直到下一次 ACT=0
    preactivated: bool,
    requested: u8,
    speed: u8,
    force: u8,
    /// PRE 当前值与待生效的新值
    pre: u8,
    pending_pre: Option<(u8, Instant)>,
    resting: u8,
    motion: Option<Motion>,
}

impl Model {
    fn new(script: GripperScript) -> Self {
        let start_active = script.start_active;
        let resting = script.travel_limits.0;
        Self {
            script,
            act: start_active as u8,
            gto: 0,
            activated_at: start_active.then(Instant::now),
            preactivated: start_active,
            requested: 0,
            speed: 0,
            force: 0,
            pre: 0,
            pending_pre: None,
            resting,
            motion: None,
        }
    }

    fn apply(&mut self, pairs: &[(Register, u8)], now: Instant) {
        let mut go = false;
        for &(register, value) in pairs {
            match register {
                Register::Act => {
                    if value == 1 && self.act == 0 {
                        self.activated_at = Some(now);
                    } else if value == 0 {
                        self.resting = self.position(now);
                        self.activated_at = None;
                        self.preactivated = false;
                        self.motion = None;
                        self.gto = 0;
                    }
                    self.act = value;
                },
                Register::Gto => {
                    self.gto = value;
                    go |= value == 1;
                },
                Register::Pos => self.requested = value,
                Register::Spe => self.speed = value,
                Register::For => self.force = value,
                _ => {},
            }
        }
        if go && self.sta(now) == ActivationStatus::Active {
            self.start_motion(now);
        }
    }

    fn start_motion(&mut self, now: Instant) {
        let from = self.position(now);
        let (open_limit, closed_limit) = self.script.travel_limits;
        let target = self.requested.clamp(open_limit, closed_limit);
        let (stop, blocked) = match self.script.object_at {
            Some(object) if target > from && (from..=target).contains(&object) => (object, true),
            _ => (target, false),
        };
        self.motion = Some(Motion {
            from,
            stop,
            blocked,
            started: now,
        });

        if self.script.echo_delay.is_zero() {
            self.pre = self.requested;
            self.pending_pre = None;
        } else {
            self.pending_pre = Some((self.requested, now + self.script.echo_delay));
        }
    }

    fn sta(&self, now: Instant) -> ActivationStatus {
        match self.activated_at {
            None => ActivationStatus::Reset,
            Some(_) if self.preactivated => ActivationStatus::Active,
            Some(at)
                if self.script.activation_completes
                    && now.duration_since(at) >= self.script.activation_time =>
            {
                ActivationStatus::Active
            },
            Some(_) => ActivationStatus::Activating,
        }
    }

    fn position(&self, now: Instant) -> u8 {
        let Some(motion) = &self.motion else {
            return self.resting;
        };
        if self.script.stall {
            return motion.from;
        }
        let elapsed = now.duration_since(motion.started).as_secs_f64();
        let stroke = self.script.stroke_time.as_secs_f64().max(f64::EPSILON);
        let travelled = (elapsed / stroke * 255.0) as i32;
        let (from, stop) = (i32::from(motion.from), i32::from(motion.stop));
        let position = if stop >= from {
            (from + travelled).min(stop)
        } else {
            (from - travelled).max(stop)
        };
        position as u8
    }

    fn obj(&self, now: Instant) -> ObjectStatus {
        match &self.motion {
            None if self.sta(now) == ActivationStatus::Active => ObjectStatus::AtDestination,
            None => ObjectStatus::Moving,
            Some(_) if self.script.stall => ObjectStatus::Moving,
            Some(motion) if self.position(now) != motion.stop => ObjectStatus::Moving,
            Some(motion) if motion.blocked => ObjectStatus::StoppedInnerObject,
            Some(_) => ObjectStatus::AtDestination,
        }
    }

    fn read(&mut self, register: Register, now: Instant) -> u8 {
        if let Some((value, at)) = self.pending_pre
            && now >= at
        {
            self.pre = value;
            self.pending_pre = None;
        }
        match register {
            Register::Act => self.act,
            Register::Gto => self.gto,
            Register::Sta => self.sta(now).into(),
            Register::Obj => self.obj(now).into(),
            Register::Pos => self.position(now),
            Register::Pre => self.pre,
            Register::Spe => self.speed,
            Register::For => self.force,
            Register::Atr | Register::Adr | Register::Flt => 0,
        }
    }
}
