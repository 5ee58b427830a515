//! 路点列表与夹爪动作表

use serde::{Deserialize, Serialize};
use urcell_gripper::{GripperCommand, GripperStatus};

use crate::error::{ControlError, Result};

/// 到达路点时的夹爪动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripperAction {
    Open,
    Close,
}

impl GripperAction {
    /// 按夹爪设置生成命令
    pub fn command(self, settings: &GripperSettings) -> GripperCommand {
        let position = match self {
            Self::Open => settings.open_position,
            Self::Close => settings.close_position,
        };
        GripperCommand::new(position, settings.speed, settings.force)
    }
}

impl std::fmt::Display for GripperAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Close => "close",
        })
    }
}

/// 开/合位置与速度、力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperSettings {
    pub open_position: u8,
    pub close_position: u8,
    pub speed: u8,
    pub force: u8,
}

impl Default for GripperSettings {
    fn default() -> Self {
        Self {
            open_position: urcell_gripper::OPEN_POSITION,
            close_position: urcell_gripper::CLOSED_POSITION,
            speed: 255,
            force: 255,
        }
    }
}

impl GripperSettings {
    /// 当前位置是否在张开位置（或更开）
    pub fn is_open(&self, status: &GripperStatus) -> bool {
        status.current_position <= self.open_position
    }

    /// 当前位置是否在闭合位置（或更紧）
    pub fn is_closed(&self, status: &GripperStatus) -> bool {
        status.current_position >= self.close_position
    }
}

/// 路点：TCP 位姿 (x, y, z, rx, ry, rz) 及到达后的夹爪动作
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub pose: [f64; 6],
    #[serde(rename = "gripper")]
    pub action: GripperAction,
}

impl Waypoint {
    pub fn new(pose: [f64; 6], action: GripperAction) -> Self {
        Self { pose, action }
    }
}

/// 运行期间不可变的路点序列
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointPlan {
    waypoints: Vec<Waypoint>,
}

impl WaypointPlan {
    /// # 错误
    /// - `Config`: 路点列表为空，或位姿含非有限值
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self> {
        if waypoints.is_empty() {
            return Err(ControlError::config("waypoint list is empty"));
        }
        if let Some(index) = waypoints
            .iter()
            .position(|w| w.pose.iter().any(|v| !v.is_finite()))
        {
            return Err(ControlError::config(format!(
                "waypoint {index} has a non-finite coordinate"
            )));
        }
        Ok(Self { waypoints })
    }

    /// 下标在 `open` 中的路点张开夹爪，其余闭合
    pub fn from_open_set(poses: Vec<[f64; 6]>, open: &[usize]) -> Result<Self> {
        if let Some(index) = open.iter().find(|&&i| i >= poses.len()) {
            return Err(ControlError::config(format!(
                "open index {index} is outside the {} waypoints",
                poses.len()
            )));
        }
        Self::new(
            poses
                .into_iter()
                .enumerate()
                .map(|(i, pose)| {
                    let action = if open.contains(&i) {
                        GripperAction::Open
                    } else {
                        GripperAction::Close
                    };
                    Waypoint::new(pose, action)
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter()
    }

    pub fn actions(&self) -> Vec<GripperAction> {
        self.waypoints.iter().map(|w| w.action).collect()
    }
}
