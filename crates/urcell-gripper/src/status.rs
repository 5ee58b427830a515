//! 夹爪命令与状态快照

use crate::registers::{ActivationStatus, ObjectStatus};

/// 全开位置
pub const OPEN_POSITION: u8 = 0;
/// 全闭位置
pub const CLOSED_POSITION: u8 = 255;

/// 夹爪运动命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GripperCommand {
    pub position: u8,
    pub speed: u8,
    pub force: u8,
}

impl GripperCommand {
    pub fn new(position: u8, speed: u8, force: u8) -> Self {
        Self {
            position,
            speed,
            force,
        }
    }

    /// 全速全力张开
    pub fn open() -> Self {
        Self::new(OPEN_POSITION, 255, 255)
    }

    /// 全速全力闭合
    pub fn close() -> Self {
        Self::new(CLOSED_POSITION, 255, 255)
    }

    /// 位置限制在可用行程内
    pub fn clipped(self, range: PositionRange) -> Self {
        Self {
            position: range.clip(self.position),
            ..self
        }
    }
}

/// 可用行程（自动标定后收窄）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRange {
    /// 张开端
    pub min: u8,
    /// 闭合端
    pub max: u8,
}

impl Default for PositionRange {
    fn default() -> Self {
        Self {
            min: OPEN_POSITION,
            max: CLOSED_POSITION,
        }
    }
}

impl PositionRange {
    pub fn clip(&self, position: u8) -> u8 {
        position.clamp(self.min, self.max)
    }
}

/// 原始寄存器快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterSnapshot {
    pub act: u8,
    pub gto: u8,
    pub sta: u8,
    pub obj: u8,
    pub pos: u8,
    pub pre: u8,
    pub flt: u8,
}

/// 由寄存器快照导出的夹爪状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GripperStatus {
    /// 当前位置（POS）
    pub current_position: u8,
    /// 目标位置回显（PRE）
    pub requested_position: u8,
    pub moving: bool,
    pub object_detected: bool,
    /// ACT=1 且 STA=3
    pub activated: bool,
    pub activation_status: ActivationStatus,
    pub object_status: ObjectStatus,
    /// 故障码（FLT），0 为无故障
    pub fault: u8,
}

impl GripperStatus {
    /// 从寄存器快照解析
    ///
    /// 超出定义范围的 STA / OBJ 值按复位 / 运动中处理。
    pub fn from_registers(raw: &RegisterSnapshot) -> Self {
        let activation_status =
            ActivationStatus::try_from(raw.sta).unwrap_or(ActivationStatus::Reset);
        let object_status = ObjectStatus::try_from(raw.obj).unwrap_or(ObjectStatus::Moving);
        Self {
            current_position: raw.pos,
            requested_position: raw.pre,
            moving: object_status == ObjectStatus::Moving,
            object_detected: object_status.object_detected(),
            activated: raw.act == 1 && activation_status == ActivationStatus::Active,
            activation_status,
            object_status,
            fault: raw.flt,
        }
    }

    /// 到达目标位置（未被物体阻挡）
    pub fn position_reached(&self) -> bool {
        self.object_status == ObjectStatus::AtDestination
    }

    /// 已停止（到达目标或被物体阻挡）
    pub fn settled(&self) -> bool {
        !self.moving
    }
}
