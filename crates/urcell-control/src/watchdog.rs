//! 看门狗心跳
//!
//! 控制器端程序在 `MOVE_SENT` 期间期待看门狗字段为 1，空闲时为 0。
//! 每个周期都必须写入，哪怕值没有变化。

use urcell_protocol::{FieldKey, ProtocolError, Recipe, RecipeInstance};

/// 看门狗状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchdogState {
    /// 等待触发（写 0）
    #[default]
    Idle,
    /// 已下发设定点（写 1）
    Armed,
}

impl WatchdogState {
    pub const fn value(self) -> i32 {
        match self {
            Self::Idle => 0,
            Self::Armed => 1,
        }
    }
}

/// 看门狗守卫
///
/// 字段键在创建时按注册的 recipe 校验（必须是 INT32）。
#[derive(Debug, Clone)]
pub struct WatchdogGuard {
    key: FieldKey<i32>,
    state: WatchdogState,
}

impl WatchdogGuard {
    /// # 错误
    /// - `UnknownField`: recipe 中没有 `field`
    /// - `FieldTypeMismatch`: `field` 不是 INT32
    pub fn new(recipe: &Recipe, field: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            key: recipe.key(field)?,
            state: WatchdogState::Idle,
        })
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn value(&self) -> i32 {
        self.state.value()
    }

    pub fn arm(&mut self) {
        self.state = WatchdogState::Armed;
    }

    pub fn idle(&mut self) {
        self.state = WatchdogState::Idle;
    }

    /// 把当前值写入看门狗记录
    pub fn stage(&self, instance: &mut RecipeInstance) -> Result<(), ProtocolError> {
        instance.set(self.key, self.value())
    }
}
