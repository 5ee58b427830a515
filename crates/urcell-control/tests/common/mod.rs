//! 序列器测试替身
//!
//! - `ScriptedLink`: 按脚本交付控制器记录，记录每次 send / pause / disconnect
//! - `RecordingGripper`: 记录夹爪命令，按脚本让指定的动作超时

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use urcell_control::{
    ControlLink, GripperLink, SequencerConfig, SequencerRecipes, Waypoint, WaypointPlan,
};
use urcell_gripper::{
    GripperCommand, GripperError, GripperStatus, ObjectStatus, RegisterSnapshot,
};
use urcell_protocol::{FieldType, Recipe, RecipeInstance};
use urcell_rtde::RtdeError;

pub const STATE_ID: u8 = 1;
pub const SETP_ID: u8 = 2;
pub const WATCHDOG_ID: u8 = 3;

// ============================================================================
// Recipes
// ============================================================================

pub fn state_recipe() -> Arc<Recipe> {
    Arc::new(Recipe::from_pairs([("output_int_register_0", FieldType::Int32)]).unwrap())
}

pub fn setp_recipe() -> Arc<Recipe> {
    let mut fields: Vec<(String, FieldType)> = (0..6)
        .map(|i| (format!("input_double_register_{i}"), FieldType::Double))
        .collect();
    fields.push(("speed_slider_fraction".to_string(), FieldType::Double));
    fields.push(("speed_slider_mask".to_string(), FieldType::Uint32));
    Arc::new(Recipe::from_pairs(fields).unwrap())
}

pub fn watchdog_recipe() -> Arc<Recipe> {
    Arc::new(Recipe::from_pairs([("input_int_register_0", FieldType::Int32)]).unwrap())
}

pub fn recipes() -> SequencerRecipes {
    SequencerRecipes {
        state: state_recipe(),
        setp: RecipeInstance::new(setp_recipe()).with_recipe_id(SETP_ID),
        watchdog: RecipeInstance::new(watchdog_recipe()).with_recipe_id(WATCHDOG_ID),
    }
}

/// 完成标志为 `flag` 的控制器记录
pub fn state_record(flag: i32) -> RecipeInstance {
    let recipe = state_recipe();
    let key = recipe.key::<i32>("output_int_register_0").unwrap();
    let mut record = RecipeInstance::new(recipe).with_recipe_id(STATE_ID);
    record.set(key, flag).unwrap();
    record
}

/// 第 i 个路点的位姿：x = i
pub fn pose(i: usize) -> [f64; 6] {
    [i as f64, 0.1, 0.3, 2.456, -2.069, 0.094]
}

pub fn plan_with_open_set(len: usize, open: &[usize]) -> WaypointPlan {
    WaypointPlan::from_open_set((0..len).map(pose).collect(), open).unwrap()
}

pub fn plan_of(waypoints: Vec<Waypoint>) -> WaypointPlan {
    WaypointPlan::new(waypoints).unwrap()
}

pub fn fast_config() -> SequencerConfig {
    SequencerConfig {
        settle_timeout: Duration::from_millis(50),
        ..SequencerConfig::default()
    }
}

/// 完成标志序列：每个路点一次完整的 1 → 0 握手
pub fn handshake_flags(moves: usize) -> Vec<i32> {
    let mut flags = vec![0];
    for _ in 0..moves {
        flags.extend([1, 1, 0, 0]);
    }
    flags
}

// ============================================================================
// ScriptedLink
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Receive,
    Send(RecipeInstance),
    Pause,
    Disconnect,
}

#[derive(Debug, Default)]
pub struct ScriptedLink {
    records: VecDeque<RecipeInstance>,
    pub events: Vec<LinkEvent>,
    /// 第 n 次 send 失败（从 0 计）
    pub fail_send_at: Option<usize>,
    sends: usize,
}

impl ScriptedLink {
    pub fn with_flags(flags: &[i32]) -> Self {
        Self {
            records: flags.iter().map(|&f| state_record(f)).collect(),
            ..Self::default()
        }
    }

    pub fn count(&self, pred: impl Fn(&LinkEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn sent(&self) -> Vec<&RecipeInstance> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LinkEvent::Send(instance) => Some(instance),
                _ => None,
            })
            .collect()
    }

    /// 每个周期（两次 receive 之间）发送的记录
    pub fn cycles(&self) -> Vec<Vec<&RecipeInstance>> {
        let mut cycles = Vec::new();
        for event in &self.events {
            match event {
                LinkEvent::Receive => cycles.push(Vec::new()),
                LinkEvent::Send(instance) => {
                    if let Some(cycle) = cycles.last_mut() {
                        cycle.push(instance);
                    }
                },
                _ => {},
            }
        }
        cycles
    }

    /// 每个周期写入的看门狗值（None 表示该周期没有发送看门狗）
    pub fn watchdog_values(&self) -> Vec<Option<i32>> {
        let key = watchdog_recipe().key::<i32>("input_int_register_0").unwrap();
        self.cycles()
            .into_iter()
            .map(|sends| {
                sends
                    .iter()
                    .find(|i| i.recipe_id() == Some(WATCHDOG_ID))
                    .and_then(|i| i.get(key))
            })
            .collect()
    }

    /// 发出的设定点 x 坐标（去掉重复发送）
    pub fn setpoint_xs(&self) -> Vec<f64> {
        let key = setp_recipe().key::<f64>("input_double_register_0").unwrap();
        let mut xs: Vec<f64> = Vec::new();
        let mut last = None;
        for instance in self.sent() {
            if instance.recipe_id() != Some(SETP_ID) {
                continue;
            }
            let x = instance.get(key);
            if x != last {
                if let Some(x) = x {
                    xs.push(x);
                }
                last = x;
            }
        }
        xs
    }
}

impl ControlLink for ScriptedLink {
    fn receive(&mut self) -> Option<RecipeInstance> {
        self.events.push(LinkEvent::Receive);
        self.records.pop_front()
    }

    fn send(&mut self, instance: &RecipeInstance) -> Result<(), RtdeError> {
        let index = self.sends;
        self.sends += 1;
        if self.fail_send_at == Some(index) {
            return Err(RtdeError::Closed);
        }
        self.events.push(LinkEvent::Send(instance.clone()));
        Ok(())
    }

    fn pause(&mut self) -> Result<(), RtdeError> {
        self.events.push(LinkEvent::Pause);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.events.push(LinkEvent::Disconnect);
    }
}

// ============================================================================
// RecordingGripper
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingGripper {
    pub commands: RefCell<Vec<GripperCommand>>,
    /// 这些序号的 wait_for_position 超时（从 0 计）
    pub timeout_on: HashSet<usize>,
    /// 某次 wait 返回非超时错误
    pub fail_on: Option<usize>,
    pub waits: RefCell<usize>,
}

impl RecordingGripper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timing_out_on(moves: &[usize]) -> Self {
        Self {
            timeout_on: moves.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn positions(&self) -> Vec<u8> {
        self.commands.borrow().iter().map(|c| c.position).collect()
    }
}

impl GripperLink for RecordingGripper {
    fn move_to(&self, command: GripperCommand) -> Result<GripperCommand, GripperError> {
        self.commands.borrow_mut().push(command);
        Ok(command)
    }

    fn wait_for_position(&self, timeout: Duration) -> Result<GripperStatus, GripperError> {
        let index = {
            let mut waits = self.waits.borrow_mut();
            *waits += 1;
            *waits - 1
        };
        let target = self.commands.borrow().last().map_or(0, |c| c.position);
        if self.fail_on == Some(index) {
            return Err(GripperError::NotConnected);
        }
        if self.timeout_on.contains(&index) {
            return Err(GripperError::ActuatorTimeout { target, timeout });
        }
        Ok(GripperStatus::from_registers(&RegisterSnapshot {
            act: 1,
            gto: 1,
            sta: 3,
            obj: ObjectStatus::AtDestination.into(),
            pos: target,
            pre: target,
            flt: 0,
        }))
    }
}
