//! 单元（cell）配置文件
//!
//! 一个 TOML 文件描述一次会话需要的全部外部输入：控制器与夹爪地址、
//! 三个 recipe 的字段列表、序列器字段名以及路点列表。
//!
//! ```toml
//! [robot]
//! host = "192.168.1.10"
//!
//! [recipes]
//! state = [{ name = "output_int_register_0", type = "INT32" }]
//! setp = [
//!     { name = "input_double_register_0", type = "DOUBLE" },
//!     # ...
//! ]
//! watchdog = [{ name = "input_int_register_0", type = "INT32" }]
//!
//! [[waypoints]]
//! pose = [0.758, 0.156, 0.3, 2.456, -2.069, 0.094]
//! gripper = "open"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use urcell_gripper::GripperConfig;
use urcell_protocol::{Field, FieldType, Recipe};
use urcell_rtde::RtdeConfig;

use crate::error::{ControlError, Result};
use crate::sequencer::SequencerConfig;
use crate::waypoints::{GripperSettings, Waypoint, WaypointPlan};

/// 输出频率上限（e-Series 控制器最高 500 Hz）
pub const MAX_FREQUENCY: f64 = 500.0;

/// 单元配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellConfig {
    pub robot: RobotSection,
    #[serde(default)]
    pub gripper: GripperSection,
    pub recipes: RecipeSection,
    #[serde(default)]
    pub sequencer: SequencerSection,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

/// `[robot]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotSection {
    pub host: String,
    pub port: u16,
    /// 输出 recipe 频率（Hz）
    pub frequency: f64,
    pub connect_timeout_ms: u64,
    pub receive_timeout_ms: u64,
}

impl Default for RobotSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: urcell_rtde::DEFAULT_PORT,
            frequency: 125.0,
            connect_timeout_ms: 5000,
            receive_timeout_ms: 1000,
        }
    }
}

/// `[gripper]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GripperSection {
    /// 缺省时与机器人相同（夹爪 URCap 运行在控制器上）
    pub host: Option<String>,
    pub port: u16,
    pub open_position: u8,
    pub close_position: u8,
    pub speed: u8,
    pub force: u8,
    pub settle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub activation_settle_ms: u64,
    pub activation_max_polls: u32,
    pub auto_calibrate: bool,
}

impl Default for GripperSection {
    fn default() -> Self {
        let settings = GripperSettings::default();
        let config = GripperConfig::default();
        Self {
            host: None,
            port: urcell_gripper::DEFAULT_PORT,
            open_position: settings.open_position,
            close_position: settings.close_position,
            speed: settings.speed,
            force: settings.force,
            settle_timeout_ms: 5000,
            poll_interval_ms: config.poll_interval.as_millis() as u64,
            activation_settle_ms: config.activation_settle.as_millis() as u64,
            activation_max_polls: config.activation_max_polls,
            auto_calibrate: false,
        }
    }
}

/// recipe 中的一个字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// `[recipes]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeSection {
    pub state: Vec<FieldSpec>,
    pub setp: Vec<FieldSpec>,
    pub watchdog: Vec<FieldSpec>,
}

/// `[sequencer]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequencerSection {
    pub completion_field: String,
    pub setpoint_fields: [String; 6],
    pub watchdog_field: String,
    pub speed_slider_fraction: f64,
    pub max_cycles: Option<u64>,
}

impl Default for SequencerSection {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            completion_field: defaults.completion_field,
            setpoint_fields: defaults.setpoint_fields,
            watchdog_field: defaults.watchdog_field,
            speed_slider_fraction: defaults.speed_slider_fraction.unwrap_or(1.0),
            max_cycles: defaults.max_cycles,
        }
    }
}

/// 解析后的三个 recipe
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecipes {
    pub state: Recipe,
    pub setp: Recipe,
    pub watchdog: Recipe,
}

impl CellConfig {
    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ControlError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content).map_err(|e| match e {
            ControlError::Config(msg) => ControlError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// 从 TOML 文本解析并校验
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ControlError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验全部字段
    pub fn validate(&self) -> Result<()> {
        if self.robot.host.trim().is_empty() {
            return Err(ControlError::config("robot.host is required"));
        }
        if !(self.robot.frequency > 0.0 && self.robot.frequency <= MAX_FREQUENCY) {
            return Err(ControlError::config(format!(
                "robot.frequency {} must be in (0, {}]",
                self.robot.frequency, MAX_FREQUENCY
            )));
        }
        if self.robot.connect_timeout_ms == 0 || self.robot.receive_timeout_ms == 0 {
            return Err(ControlError::config("robot timeouts must be positive"));
        }
        if self.gripper.settle_timeout_ms == 0 || self.gripper.poll_interval_ms == 0 {
            return Err(ControlError::config("gripper timeouts must be positive"));
        }
        if self.gripper.open_position > self.gripper.close_position {
            return Err(ControlError::config(format!(
                "gripper.open_position {} is beyond close_position {}",
                self.gripper.open_position, self.gripper.close_position
            )));
        }
        if !(0.0..=1.0).contains(&self.sequencer.speed_slider_fraction) {
            return Err(ControlError::config(format!(
                "sequencer.speed_slider_fraction {} must be in [0, 1]",
                self.sequencer.speed_slider_fraction
            )));
        }

        let recipes = self.recipes()?;
        let fields = &self.sequencer;
        require_field(&recipes.state, "state", &fields.completion_field, FieldType::Int32)?;
        for name in &fields.setpoint_fields {
            require_field(&recipes.setp, "setp", name, FieldType::Double)?;
        }
        require_field(&recipes.watchdog, "watchdog", &fields.watchdog_field, FieldType::Int32)?;
        self.plan()?;
        Ok(())
    }

    pub fn robot_host(&self) -> &str {
        &self.robot.host
    }

    pub fn gripper_host(&self) -> &str {
        self.gripper.host.as_deref().unwrap_or(&self.robot.host)
    }

    pub fn rtde_config(&self) -> RtdeConfig {
        RtdeConfig {
            connect_timeout: Duration::from_millis(self.robot.connect_timeout_ms),
            receive_timeout: Duration::from_millis(self.robot.receive_timeout_ms),
            output_frequency: self.robot.frequency,
            ..RtdeConfig::default()
        }
    }

    pub fn gripper_config(&self) -> GripperConfig {
        GripperConfig::default()
            .with_poll_interval(Duration::from_millis(self.gripper.poll_interval_ms))
            .with_activation(
                Duration::from_millis(self.gripper.activation_settle_ms),
                self.gripper.activation_max_polls,
            )
            .with_auto_calibrate(self.gripper.auto_calibrate)
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            completion_field: self.sequencer.completion_field.clone(),
            setpoint_fields: self.sequencer.setpoint_fields.clone(),
            watchdog_field: self.sequencer.watchdog_field.clone(),
            gripper: GripperSettings {
                open_position: self.gripper.open_position,
                close_position: self.gripper.close_position,
                speed: self.gripper.speed,
                force: self.gripper.force,
            },
            settle_timeout: Duration::from_millis(self.gripper.settle_timeout_ms),
            max_cycles: self.sequencer.max_cycles,
            speed_slider_fraction: Some(self.sequencer.speed_slider_fraction),
        }
    }

    /// 解析三个 recipe 的字段类型
    pub fn recipes(&self) -> Result<CellRecipes> {
        Ok(CellRecipes {
            state: build_recipe("state", &self.recipes.state)?,
            setp: build_recipe("setp", &self.recipes.setp)?,
            watchdog: build_recipe("watchdog", &self.recipes.watchdog)?,
        })
    }

    pub fn plan(&self) -> Result<WaypointPlan> {
        WaypointPlan::new(self.waypoints.clone())
    }
}

fn build_recipe(section: &str, specs: &[FieldSpec]) -> Result<Recipe> {
    let fields = specs
        .iter()
        .map(|spec| {
            spec.ty
                .parse::<FieldType>()
                .map(|ty| Field::new(spec.name.clone(), ty))
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ControlError::config(format!("recipes.{section}: {e}")))?;
    Recipe::new(fields).map_err(|e| ControlError::config(format!("recipes.{section}: {e}")))
}

fn require_field(recipe: &Recipe, section: &str, name: &str, ty: FieldType) -> Result<()> {
    match recipe.index_of(name).map(|i| recipe.fields()[i].ty) {
        Some(actual) if actual == ty => Ok(()),
        Some(actual) => Err(ControlError::config(format!(
            "recipes.{section}: {name} is {actual}, expected {ty}"
        ))),
        None => Err(ControlError::config(format!(
            "recipes.{section} has no field {name}"
        ))),
    }
}
