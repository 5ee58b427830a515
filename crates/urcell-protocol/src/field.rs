//! 字段类型与取值
//!
//! RTDE 控制器以字符串声明字段类型（`"DOUBLE"`、`"VECTOR6D"` ...），
//! 这里将其映射为 [`FieldType`]，并以 [`Value`] 承载具体取值。

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

// ============================================================================
// 字段类型
// ============================================================================

/// RTDE 字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Uint8,
    Uint32,
    Uint64,
    Int32,
    Double,
    Vector3d,
    Vector6d,
    Vector6Int32,
    Vector6Uint32,
}

impl FieldType {
    /// 所有支持的类型
    pub const ALL: [FieldType; 10] = [
        FieldType::Bool,
        FieldType::Uint8,
        FieldType::Uint32,
        FieldType::Uint64,
        FieldType::Int32,
        FieldType::Double,
        FieldType::Vector3d,
        FieldType::Vector6d,
        FieldType::Vector6Int32,
        FieldType::Vector6Uint32,
    ];

    /// 编码后的字节宽度
    pub const fn width(self) -> usize {
        match self {
            FieldType::Bool | FieldType::Uint8 => 1,
            FieldType::Uint32 | FieldType::Int32 => 4,
            FieldType::Uint64 | FieldType::Double => 8,
            FieldType::Vector3d => 3 * 8,
            FieldType::Vector6d => 6 * 8,
            FieldType::Vector6Int32 | FieldType::Vector6Uint32 => 6 * 4,
        }
    }

    /// 控制器使用的类型名
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldType::Bool => "BOOL",
            FieldType::Uint8 => "UINT8",
            FieldType::Uint32 => "UINT32",
            FieldType::Uint64 => "UINT64",
            FieldType::Int32 => "INT32",
            FieldType::Double => "DOUBLE",
            FieldType::Vector3d => "VECTOR3D",
            FieldType::Vector6d => "VECTOR6D",
            FieldType::Vector6Int32 => "VECTOR6INT32",
            FieldType::Vector6Uint32 => "VECTOR6UINT32",
        }
    }
}

impl FromStr for FieldType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .iter()
            .copied()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProtocolError::UnknownFieldType(s.to_string()))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recipe 中的一个字段
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

// ============================================================================
// 字段取值
// ============================================================================

/// 带类型的字段取值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Uint8(u8),
    Uint32(u32),
    Uint64(u64),
    Int32(i32),
    Double(f64),
    Vector3d([f64; 3]),
    Vector6d([f64; 6]),
    Vector6Int32([i32; 6]),
    Vector6Uint32([u32; 6]),
}

impl Value {
    /// 取值对应的字段类型
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Bool(_) => FieldType::Bool,
            Value::Uint8(_) => FieldType::Uint8,
            Value::Uint32(_) => FieldType::Uint32,
            Value::Uint64(_) => FieldType::Uint64,
            Value::Int32(_) => FieldType::Int32,
            Value::Double(_) => FieldType::Double,
            Value::Vector3d(_) => FieldType::Vector3d,
            Value::Vector6d(_) => FieldType::Vector6d,
            Value::Vector6Int32(_) => FieldType::Vector6Int32,
            Value::Vector6Uint32(_) => FieldType::Vector6Uint32,
        }
    }

    /// 指定类型的零值
    pub fn zero(ty: FieldType) -> Self {
        match ty {
            FieldType::Bool => Value::Bool(false),
            FieldType::Uint8 => Value::Uint8(0),
            FieldType::Uint32 => Value::Uint32(0),
            FieldType::Uint64 => Value::Uint64(0),
            FieldType::Int32 => Value::Int32(0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Vector3d => Value::Vector3d([0.0; 3]),
            FieldType::Vector6d => Value::Vector6d([0.0; 6]),
            FieldType::Vector6Int32 => Value::Vector6Int32([0; 6]),
            FieldType::Vector6Uint32 => Value::Vector6Uint32([0; 6]),
        }
    }

    /// 从数字构造标量取值
    ///
    /// 整数类型要求数值无小数部分且在范围内；向量类型不支持。
    pub fn from_f64(ty: FieldType, v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }
        let integral = v.fract() == 0.0;
        match ty {
            FieldType::Double => Some(Value::Double(v)),
            FieldType::Bool => Some(Value::Bool(v != 0.0)),
            FieldType::Uint8 if integral && (0.0..=u8::MAX as f64).contains(&v) => {
                Some(Value::Uint8(v as u8))
            },
            FieldType::Uint32 if integral && (0.0..=u32::MAX as f64).contains(&v) => {
                Some(Value::Uint32(v as u32))
            },
            FieldType::Uint64 if integral && v >= 0.0 => Some(Value::Uint64(v as u64)),
            FieldType::Int32 if integral && (i32::MIN as f64..=i32::MAX as f64).contains(&v) => {
                Some(Value::Int32(v as i32))
            },
            _ => None,
        }
    }
}

/// 可以存取为某一 RTDE 类型的 Rust 类型
///
/// 用于 [`FieldKey<T>`](crate::FieldKey) 的类型化读写。
pub trait FieldValue: Copy + Sized {
    const TYPE: FieldType;

    fn from_value(value: &Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

macro_rules! impl_field_value {
    ($t:ty, $variant:ident) => {
        impl FieldValue for $t {
            const TYPE: FieldType = FieldType::$variant;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

impl_field_value!(bool, Bool);
impl_field_value!(u8, Uint8);
impl_field_value!(u32, Uint32);
impl_field_value!(u64, Uint64);
impl_field_value!(i32, Int32);
impl_field_value!(f64, Double);
impl_field_value!([f64; 3], Vector3d);
impl_field_value!([f64; 6], Vector6d);
impl_field_value!([i32; 6], Vector6Int32);
impl_field_value!([u32; 6], Vector6Uint32);
