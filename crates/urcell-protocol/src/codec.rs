//! Recipe 记录编解码
//!
//! 记录按字段声明顺序排列，无填充：
//!
//! | 类型 | 编码 |
//! |---|---|
//! | BOOL / UINT8 | 1 字节 |
//! | INT32 / UINT32 | 4 字节大端 |
//! | UINT64 | 8 字节大端 |
//! | DOUBLE | 8 字节 IEEE-754 大端 |
//! | VECTOR3D / VECTOR6D | 3 / 6 个 DOUBLE |
//! | VECTOR6INT32 / VECTOR6UINT32 | 6 个 4 字节整数 |

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use crate::ProtocolError;
use crate::field::{FieldType, Value};
use crate::recipe::{Recipe, RecipeInstance};

/// 将实例编码为定长记录
///
/// # 错误
/// - `RecipeMismatch`: 实例绑定的 Recipe 与 `recipe` 不同
pub fn encode(recipe: &Recipe, instance: &RecipeInstance) -> Result<Vec<u8>, ProtocolError> {
    if instance.recipe().as_ref() != recipe {
        return Err(ProtocolError::RecipeMismatch);
    }
    let mut buf = BytesMut::with_capacity(recipe.width());
    encode_values(instance.values(), &mut buf);
    Ok(buf.to_vec())
}

/// 将取值依次追加到缓冲区
pub fn encode_values(values: &[Value], buf: &mut BytesMut) {
    for value in values {
        match *value {
            Value::Bool(b) => buf.put_u8(b as u8),
            Value::Uint8(v) => buf.put_u8(v),
            Value::Uint32(v) => buf.put_u32(v),
            Value::Uint64(v) => buf.put_u64(v),
            Value::Int32(v) => buf.put_i32(v),
            Value::Double(v) => buf.put_f64(v),
            Value::Vector3d(v) => v.iter().for_each(|x| buf.put_f64(*x)),
            Value::Vector6d(v) => v.iter().for_each(|x| buf.put_f64(*x)),
            Value::Vector6Int32(v) => v.iter().for_each(|x| buf.put_i32(*x)),
            Value::Vector6Uint32(v) => v.iter().for_each(|x| buf.put_u32(*x)),
        }
    }
}

/// 将定长记录解码为实例
///
/// # 错误
/// - `MalformedRecord`: 字节数与 Recipe 声明宽度不一致
pub fn decode(recipe: &Arc<Recipe>, bytes: &[u8]) -> Result<RecipeInstance, ProtocolError> {
    if bytes.len() != recipe.width() {
        return Err(ProtocolError::MalformedRecord {
            expected: recipe.width(),
            actual: bytes.len(),
        });
    }

    let mut cur = bytes;
    let values = recipe
        .fields()
        .iter()
        .map(|field| decode_value(field.ty, &mut cur))
        .collect();

    Ok(RecipeInstance::from_values(Arc::clone(recipe), values))
}

// 调用方已校验总长度
fn decode_value(ty: FieldType, cur: &mut &[u8]) -> Value {
    match ty {
        FieldType::Bool => Value::Bool(cur.get_u8() != 0),
        FieldType::Uint8 => Value::Uint8(cur.get_u8()),
        FieldType::Uint32 => Value::Uint32(cur.get_u32()),
        FieldType::Uint64 => Value::Uint64(cur.get_u64()),
        FieldType::Int32 => Value::Int32(cur.get_i32()),
        FieldType::Double => Value::Double(cur.get_f64()),
        FieldType::Vector3d => Value::Vector3d(std::array::from_fn(|_| cur.get_f64())),
        FieldType::Vector6d => Value::Vector6d(std::array::from_fn(|_| cur.get_f64())),
        FieldType::Vector6Int32 => Value::Vector6Int32(std::array::from_fn(|_| cur.get_i32())),
        FieldType::Vector6Uint32 => Value::Vector6Uint32(std::array::from_fn(|_| cur.get_u32())),
    }
}
