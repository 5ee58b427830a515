//! URCap 夹爪寄存器与状态码
//!
//! 寄存器名是三个大写字母，取值均为 0-255 的整数。

use std::fmt;
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 夹爪寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// 激活（写 1 激活，写 0 复位）
    Act,
    /// Go-to：写 1 开始向 POS 运动
    Gto,
    /// 自动释放
    Atr,
    /// 自动释放方向
    Adr,
    /// 力（0-255）
    For,
    /// 速度（0-255）
    Spe,
    /// 位置：写入为目标，读取为当前位置（0 全开，255 全闭）
    Pos,
    /// 激活状态，见 [`ActivationStatus`]
    Sta,
    /// 目标位置回显
    Pre,
    /// 物体检测状态，见 [`ObjectStatus`]
    Obj,
    /// 故障码
    Flt,
}

impl Register {
    pub const fn as_str(self) -> &'static str {
        match self {
            Register::Act => "ACT",
            Register::Gto => "GTO",
            Register::Atr => "ATR",
            Register::Adr => "ADR",
            Register::For => "FOR",
            Register::Spe => "SPE",
            Register::Pos => "POS",
            Register::Sta => "STA",
            Register::Pre => "PRE",
            Register::Obj => "OBJ",
            Register::Flt => "FLT",
        }
    }

    pub const ALL: [Register; 11] = [
        Register::Act,
        Register::Gto,
        Register::Atr,
        Register::Adr,
        Register::For,
        Register::Spe,
        Register::Pos,
        Register::Sta,
        Register::Pre,
        Register::Obj,
        Register::Flt,
    ];
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Register {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Register::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown register '{s}'"))
    }
}

/// 激活状态（STA）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ActivationStatus {
    /// 复位中或自动释放中
    Reset = 0,
    /// 激活进行中
    Activating = 1,
    NotUsed = 2,
    /// 激活完成
    Active = 3,
}

/// 物体检测状态（OBJ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ObjectStatus {
    /// 手指正在向目标位置运动
    Moving = 0,
    /// 张开时在到达目标前因接触停止
    StoppedOuterObject = 1,
    /// 闭合时在到达目标前因接触停止
    StoppedInnerObject = 2,
    /// 到达目标位置，未检测到物体
    AtDestination = 3,
}

impl ObjectStatus {
    pub fn object_detected(self) -> bool {
        matches!(
            self,
            ObjectStatus::StoppedOuterObject | ObjectStatus::StoppedInnerObject
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_names_roundtrip() {
        for register in Register::ALL {
            assert_eq!(register.as_str().parse::<Register>(), Ok(register));
        }
        assert!("XYZ".parse::<Register>().is_err());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ActivationStatus::try_from(3).unwrap(), ActivationStatus::Active);
        assert!(ActivationStatus::try_from(4).is_err());
        assert_eq!(ObjectStatus::try_from(2).unwrap(), ObjectStatus::StoppedInnerObject);
        assert!(ObjectStatus::StoppedOuterObject.object_detected());
        assert!(!ObjectStatus::AtDestination.object_detected());
        assert_eq!(u8::from(ObjectStatus::Moving), 0);
    }
}
