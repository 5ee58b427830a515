//! Recipe 与 RecipeInstance
//!
//! Recipe 是与控制器协商好的有序字段列表，注册后不可变；
//! RecipeInstance 是绑定到某个 Recipe 的一组取值，用于暂存待发送的输入
//! 或保存最近一次收到的输出。
//!
//! 字段访问通过 [`FieldKey<T>`] 完成：在建立会话时按名字解析一次并校验类型，
//! 之后每个周期只按下标读写，不再做字符串查找。

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::ProtocolError;
use crate::field::{Field, FieldType, FieldValue, Value};

/// Recipe 方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipeKind {
    /// 客户端 → 控制器
    Input,
    /// 控制器 → 客户端
    Output,
}

/// 有序、名字唯一、定宽的字段列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    fields: Vec<Field>,
    width: usize,
}

impl Recipe {
    /// 创建 Recipe
    ///
    /// # 错误
    /// - `EmptyRecipe`: 字段列表为空
    /// - `DuplicateField`: 字段名重复
    pub fn new(fields: Vec<Field>) -> Result<Self, ProtocolError> {
        if fields.is_empty() {
            return Err(ProtocolError::EmptyRecipe);
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ProtocolError::DuplicateField(field.name.clone()));
            }
        }

        let width = fields.iter().map(|f| f.ty.width()).sum();
        Ok(Self { fields, width })
    }

    /// 从 (name, type) 对创建 Recipe
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, ty)| Field::new(name, ty))
                .collect(),
        )
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// 编码后的记录宽度（字节）
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// 字段名列表
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// 按名字解析类型化的字段键
    ///
    /// # 错误
    /// - `UnknownField`: 字段不在 Recipe 中
    /// - `FieldTypeMismatch`: 字段声明类型与 `T` 不一致
    pub fn key<T: FieldValue>(&self, name: &str) -> Result<FieldKey<T>, ProtocolError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| ProtocolError::UnknownField(name.to_string()))?;
        let actual = self.fields[index].ty;
        if actual != T::TYPE {
            return Err(ProtocolError::FieldTypeMismatch {
                field: name.to_string(),
                expected: T::TYPE,
                actual,
            });
        }
        Ok(FieldKey {
            index,
            _marker: PhantomData,
        })
    }
}

/// 类型化字段键
///
/// 由 [`Recipe::key`] 创建，保证下标与类型在创建时已校验。
pub struct FieldKey<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FieldKey<T> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for FieldKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldKey<T> {}

impl<T> fmt::Debug for FieldKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldKey")
            .field("index", &self.index)
            .finish()
    }
}

// ============================================================================
// RecipeInstance
// ============================================================================

/// 绑定到 Recipe 的一组取值
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeInstance {
    recipe: Arc<Recipe>,
    recipe_id: Option<u8>,
    values: Vec<Value>,
}

impl RecipeInstance {
    /// 创建全零实例（未绑定 recipe id）
    pub fn new(recipe: Arc<Recipe>) -> Self {
        let values = recipe.fields().iter().map(|f| Value::zero(f.ty)).collect();
        Self {
            recipe,
            recipe_id: None,
            values,
        }
    }

    /// 由已按字段顺序校验过的取值构造（仅供解码使用）
    pub(crate) fn from_values(recipe: Arc<Recipe>, values: Vec<Value>) -> Self {
        debug_assert_eq!(recipe.len(), values.len());
        Self {
            recipe,
            recipe_id: None,
            values,
        }
    }

    /// 绑定控制器分配的 recipe id
    pub fn with_recipe_id(mut self, recipe_id: u8) -> Self {
        self.recipe_id = Some(recipe_id);
        self
    }

    pub fn recipe(&self) -> &Arc<Recipe> {
        &self.recipe
    }

    pub fn recipe_id(&self) -> Option<u8> {
        self.recipe_id
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// 类型化读取
    ///
    /// 若键来自另一个 Recipe 且下标 / 类型不匹配，返回 `None`。
    pub fn get<T: FieldValue>(&self, key: FieldKey<T>) -> Option<T> {
        self.values.get(key.index).and_then(T::from_value)
    }

    /// 类型化写入
    pub fn set<T: FieldValue>(&mut self, key: FieldKey<T>, value: T) -> Result<(), ProtocolError> {
        self.set_at(key.index, value.into_value())
    }

    /// 按名字读取
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.recipe.index_of(name).map(|i| &self.values[i])
    }

    /// 按名字写入（校验类型）
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), ProtocolError> {
        let index = self
            .recipe
            .index_of(name)
            .ok_or_else(|| ProtocolError::UnknownField(name.to_string()))?;
        self.set_at(index, value)
    }

    fn set_at(&mut self, index: usize, value: Value) -> Result<(), ProtocolError> {
        let field = self
            .recipe
            .fields()
            .get(index)
            .ok_or_else(|| ProtocolError::UnknownField(format!("#{index}")))?;
        if field.ty != value.field_type() {
            return Err(ProtocolError::FieldTypeMismatch {
                field: field.name.clone(),
                expected: field.ty,
                actual: value.field_type(),
            });
        }
        self.values[index] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setp_recipe() -> Arc<Recipe> {
        Arc::new(
            Recipe::from_pairs([
                ("input_double_register_0", FieldType::Double),
                ("input_double_register_1", FieldType::Double),
                ("input_int_register_0", FieldType::Int32),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_recipe_width_is_sum_of_field_widths() {
        let recipe = Recipe::from_pairs([
            ("actual_q", FieldType::Vector6d),
            ("output_int_register_0", FieldType::Int32),
            ("runtime_state", FieldType::Uint32),
            ("flag", FieldType::Bool),
        ])
        .unwrap();
        assert_eq!(recipe.width(), 48 + 4 + 4 + 1);
        assert_eq!(recipe.len(), 4);
    }

    #[test]
    fn test_recipe_rejects_duplicates_and_empty() {
        let dup = Recipe::from_pairs([("a", FieldType::Int32), ("a", FieldType::Double)]);
        assert_eq!(dup, Err(ProtocolError::DuplicateField("a".into())));
        assert_eq!(Recipe::new(vec![]), Err(ProtocolError::EmptyRecipe));
    }

    #[test]
    fn test_key_checks_type() {
        let recipe = setp_recipe();
        assert!(recipe.key::<f64>("input_double_register_0").is_ok());
        assert!(matches!(
            recipe.key::<f64>("input_int_register_0"),
            Err(ProtocolError::FieldTypeMismatch { .. })
        ));
        assert!(matches!(
            recipe.key::<i32>("missing"),
            Err(ProtocolError::UnknownField(_))
        ));
    }

    #[test]
    fn test_instance_typed_set_get() {
        let recipe = setp_recipe();
        let key = recipe.key::<f64>("input_double_register_1").unwrap();
        let wd = recipe.key::<i32>("input_int_register_0").unwrap();

        let mut instance = RecipeInstance::new(recipe.clone()).with_recipe_id(2);
        assert_eq!(instance.get(key), Some(0.0));

        instance.set(key, 0.3).unwrap();
        instance.set(wd, 1).unwrap();
        assert_eq!(instance.get(key), Some(0.3));
        assert_eq!(instance.get(wd), Some(1));
        assert_eq!(instance.recipe_id(), Some(2));
    }

    #[test]
    fn test_instance_set_value_rejects_wrong_type() {
        let mut instance = RecipeInstance::new(setp_recipe());
        let err = instance
            .set_value("input_int_register_0", Value::Double(1.0))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::FieldTypeMismatch { .. }));
        assert!(
            instance
                .set_value("input_int_register_0", Value::Int32(1))
                .is_ok()
        );
        assert_eq!(
            instance.value("input_int_register_0"),
            Some(&Value::Int32(1))
        );
    }

    #[test]
    fn test_key_from_other_recipe_is_rejected() {
        let other = Recipe::from_pairs([
            ("a", FieldType::Int32),
            ("b", FieldType::Int32),
            ("c", FieldType::Int32),
            ("d", FieldType::Int32),
        ])
        .unwrap();
        let foreign = other.key::<i32>("d").unwrap();

        let mut instance = RecipeInstance::new(setp_recipe());
        assert_eq!(instance.get(foreign), None);
        assert!(instance.set(foreign, 1).is_err());
    }
}
