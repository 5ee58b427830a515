//! MotionSequencer - 路点序列控制循环
//!
//! 每个周期：
//! 1. `receive()` 读取控制器状态（`None` 即会话结束）
//! 2. 根据完成标志推进状态机
//! 3. 暂存看门狗，为每个输入 recipe 各 `send()` 一次
//!
//! ```text
//!                 flag == 1 / 发送设定点, ARMED, 夹爪动作, 游标 + 1
//!   AWAITING_TRIGGER ───────────────────────────────────────▶ MOVE_SENT
//!          ▲                                                     │
//!          └──────────────── flag == 0 / IDLE ◀─────────────────┘
//! ```
//!
//! 触发周期内，设定点和看门狗先于夹爪动作发出；夹爪等待期间积压的
//! 控制器记录由下一次 `receive()` 丢弃，只处理最新一条。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use urcell_gripper::{GripperError, GripperStatus};
use urcell_protocol::{FieldKey, ProtocolError, Recipe, RecipeInstance};
use urcell_rtde::RecipeHandle;

use crate::cancel::CancellationToken;
use crate::error::{ControlError, Result};
use crate::link::{ControlLink, GripperLink};
use crate::state::LoopState;
use crate::watchdog::WatchdogGuard;
use crate::waypoints::{GripperAction, GripperSettings, WaypointPlan};

/// 完成标志置位值
pub const COMPLETION_ASSERTED: i32 = 1;
/// 完成标志复位值
pub const COMPLETION_CLEARED: i32 = 0;

const SPEED_SLIDER_FRACTION: &str = "speed_slider_fraction";
const SPEED_SLIDER_MASK: &str = "speed_slider_mask";

/// 序列器配置
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// 输出 recipe 中的完成标志字段（INT32）
    pub completion_field: String,
    /// 设定点 recipe 中的 6 个位姿字段（DOUBLE）
    pub setpoint_fields: [String; 6],
    /// 看门狗 recipe 中的字段（INT32）
    pub watchdog_field: String,
    pub gripper: GripperSettings,
    /// 每次夹爪动作的等待上限
    pub settle_timeout: Duration,
    /// 运行周期上限（None 表示直到通道关闭或取消）
    pub max_cycles: Option<u64>,
    /// 设定点 recipe 含速度滑块字段时写入的比例
    pub speed_slider_fraction: Option<f64>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            completion_field: "output_int_register_0".to_string(),
            setpoint_fields: std::array::from_fn(|i| format!("input_double_register_{i}")),
            watchdog_field: "input_int_register_0".to_string(),
            gripper: GripperSettings::default(),
            settle_timeout: Duration::from_secs(5),
            max_cycles: None,
            speed_slider_fraction: Some(1.0),
        }
    }
}

/// 序列器使用的三个 recipe
///
/// `setp` / `watchdog` 必须已绑定控制器分配的 recipe id。
#[derive(Debug, Clone)]
pub struct SequencerRecipes {
    pub state: Arc<Recipe>,
    pub setp: RecipeInstance,
    pub watchdog: RecipeInstance,
}

impl SequencerRecipes {
    pub fn from_handles(state: &RecipeHandle, setp: &RecipeHandle, watchdog: &RecipeHandle) -> Self {
        Self {
            state: Arc::clone(state.recipe()),
            setp: setp.instance(),
            watchdog: watchdog.instance(),
        }
    }
}

/// 单个周期的结果
#[derive(Debug)]
pub enum StepOutcome {
    /// 无状态转换
    Idle,
    /// 下发了一个路点
    ///
    /// `gripper` 为 `Err` 时只可能是 `ActuatorTimeout`，其余夹爪错误从 `step()` 返回。
    Moved {
        waypoint: usize,
        action: GripperAction,
        gripper: std::result::Result<GripperStatus, GripperError>,
    },
    /// 完成标志复位，回到等待
    Acknowledged,
    /// 通道已关闭，会话结束
    Closed,
}

/// 循环结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// 控制器关闭连接、超时或记录解码失败
    ChannelClosed,
    Cancelled,
    CycleLimit,
}

/// 运行统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub cycles: u64,
    pub completed_moves: u64,
    pub actuator_timeouts: u64,
    pub exit: ExitReason,
}

/// 路点序列器
pub struct MotionSequencer<C: ControlLink, G: GripperLink> {
    link: C,
    gripper: G,
    plan: WaypointPlan,
    config: SequencerConfig,
    completion: FieldKey<i32>,
    setpoint: [FieldKey<f64>; 6],
    setp: RecipeInstance,
    watchdog: RecipeInstance,
    state: LoopState,
    cycles: u64,
    completed_moves: u64,
    actuator_timeouts: u64,
    closed: bool,
}

impl<C: ControlLink, G: GripperLink> MotionSequencer<C, G> {
    /// 创建序列器
    ///
    /// 字段名在这里按 recipe 解析为类型化的键。
    ///
    /// # 错误
    /// - `Protocol`: 字段不存在或类型不符
    /// - `Config`: 速度滑块比例不在 [0, 1]
    pub fn new(
        link: C,
        gripper: G,
        recipes: SequencerRecipes,
        plan: WaypointPlan,
        config: SequencerConfig,
    ) -> Result<Self> {
        let SequencerRecipes {
            state,
            mut setp,
            watchdog,
        } = recipes;

        let completion = state.key::<i32>(&config.completion_field)?;
        let setp_recipe = Arc::clone(setp.recipe());
        let setpoint: [FieldKey<f64>; 6] = config
            .setpoint_fields
            .iter()
            .map(|name| setp_recipe.key::<f64>(name))
            .collect::<std::result::Result<Vec<_>, _>>()?
            .try_into()
            .map_err(|_| ControlError::config("expected six setpoint fields"))?;
        let guard = WatchdogGuard::new(watchdog.recipe(), &config.watchdog_field)?;
        apply_speed_slider(&mut setp, config.speed_slider_fraction)?;

        Ok(Self {
            link,
            gripper,
            state: LoopState::new(plan.len(), guard),
            plan,
            config,
            completion,
            setpoint,
            setp,
            watchdog,
            cycles: 0,
            completed_moves: 0,
            actuator_timeouts: 0,
            closed: false,
        })
    }

    pub fn loop_state(&self) -> &LoopState {
        &self.state
    }

    pub fn plan(&self) -> &WaypointPlan {
        &self.plan
    }

    pub fn link(&self) -> &C {
        &self.link
    }

    pub fn gripper(&self) -> &G {
        &self.gripper
    }

    pub(crate) fn link_mut(&mut self) -> &mut C {
        &mut self.link
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn completed_moves(&self) -> u64 {
        self.completed_moves
    }

    pub fn actuator_timeouts(&self) -> u64 {
        self.actuator_timeouts
    }

    // ============================================================
    // 周期
    // ============================================================

    /// 运行一个周期
    ///
    /// 通道关闭时暂停并断开控制通道（只做一次），返回 `Closed`。
    ///
    /// # 错误
    /// 发送失败或非超时的夹爪错误。调用方应随后调用 [`shutdown`](Self::shutdown)。
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.closed {
            return Ok(StepOutcome::Closed);
        }
        let Some(record) = self.link.receive() else {
            self.shutdown();
            return Ok(StepOutcome::Closed);
        };
        self.cycles += 1;

        let flag = record
            .get(self.completion)
            .ok_or(ProtocolError::RecipeMismatch)?;
        let outcome = match (self.state.move_in_progress(), flag) {
            (false, COMPLETION_ASSERTED) => return self.trigger(),
            (true, COMPLETION_CLEARED) => {
                self.state.acknowledge();
                debug!("Controller acknowledged waypoint, watchdog idle");
                StepOutcome::Acknowledged
            },
            _ => StepOutcome::Idle,
        };
        self.exchange()?;
        Ok(outcome)
    }

    /// AWAITING_TRIGGER → MOVE_SENT
    fn trigger(&mut self) -> Result<StepOutcome> {
        let index = self.state.waypoint_cursor();
        let waypoint = *self
            .plan
            .get(index)
            .ok_or_else(|| ControlError::config(format!("waypoint cursor {index} out of range")))?;

        for (key, value) in self.setpoint.iter().zip(waypoint.pose) {
            self.setp.set(*key, value)?;
        }
        self.state.begin_move();
        self.exchange()?;
        info!(
            "Waypoint {} sent {:?}, gripper {}",
            index, waypoint.pose, waypoint.action
        );

        let command = waypoint.action.command(&self.config.gripper);
        let gripper = self
            .gripper
            .move_to(command)
            .and_then(|_| self.gripper.wait_for_position(self.config.settle_timeout));
        self.state.advance();
        self.completed_moves += 1;

        let gripper = match gripper {
            Ok(status) => {
                let settings = &self.config.gripper;
                info!(
                    "Gripper settled at {} (open: {}, closed: {}, object: {})",
                    status.current_position,
                    settings.is_open(&status),
                    settings.is_closed(&status),
                    status.object_detected
                );
                Ok(status)
            },
            Err(e) if e.is_timeout() => {
                self.actuator_timeouts += 1;
                warn!("Waypoint {}: {}, continuing", index, e);
                Err(e)
            },
            Err(e) => return Err(e.into()),
        };

        Ok(StepOutcome::Moved {
            waypoint: index,
            action: waypoint.action,
            gripper,
        })
    }

    /// 暂存看门狗并发送两条输入记录
    fn exchange(&mut self) -> Result<()> {
        self.state.watchdog().stage(&mut self.watchdog)?;
        self.link.send(&self.setp)?;
        self.link.send(&self.watchdog)?;
        Ok(())
    }

    // ============================================================
    // 运行与关闭
    // ============================================================

    /// 运行直到通道关闭、取消或达到周期上限
    ///
    /// 任何退出路径都会暂停并断开控制通道；夹爪保持最后命令的状态。
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<RunReport> {
        info!("Motion sequencer running over {} waypoints", self.plan.len());
        let exit = loop {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping control loop");
                break ExitReason::Cancelled;
            }
            if let Some(max) = self.config.max_cycles
                && self.cycles >= max
            {
                info!("Reached cycle limit ({})", max);
                break ExitReason::CycleLimit;
            }
            match self.step() {
                Ok(StepOutcome::Closed) => break ExitReason::ChannelClosed,
                Ok(_) => {},
                Err(e) => {
                    error!("Control loop aborted: {}", e);
                    self.shutdown();
                    return Err(e);
                },
            }
        };
        self.shutdown();

        let report = self.report(exit);
        info!(
            "Control loop finished: {} cycles, {} moves, {} gripper timeouts ({:?})",
            report.cycles, report.completed_moves, report.actuator_timeouts, report.exit
        );
        Ok(report)
    }

    pub fn report(&self, exit: ExitReason) -> RunReport {
        RunReport {
            cycles: self.cycles,
            completed_moves: self.completed_moves,
            actuator_timeouts: self.actuator_timeouts,
            exit,
        }
    }

    /// 暂停并断开控制通道（只执行一次）
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.link.pause() {
            warn!("Failed to pause RTDE synchronization: {}", e);
        }
        self.link.disconnect();
        info!("Control channel closed");
    }
}

fn apply_speed_slider(setp: &mut RecipeInstance, fraction: Option<f64>) -> Result<()> {
    let Some(fraction) = fraction else {
        return Ok(());
    };
    if !(0.0..=1.0).contains(&fraction) {
        return Err(ControlError::config(format!(
            "speed slider fraction {fraction} is outside [0, 1]"
        )));
    }
    let recipe = Arc::clone(setp.recipe());
    if recipe.index_of(SPEED_SLIDER_FRACTION).is_none()
        || recipe.index_of(SPEED_SLIDER_MASK).is_none()
    {
        return Ok(());
    }
    setp.set(recipe.key::<f64>(SPEED_SLIDER_FRACTION)?, fraction)?;
    setp.set(recipe.key::<u32>(SPEED_SLIDER_MASK)?, 1)?;
    debug!("Speed slider set to {}", fraction);
    Ok(())
}
