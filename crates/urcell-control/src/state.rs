//! 控制循环状态
//!
//! 只由 `MotionSequencer` 持有和修改。

use crate::watchdog::{WatchdogGuard, WatchdogState};

/// 序列器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerState {
    /// 等待控制器置位完成标志
    #[default]
    AwaitingTrigger,
    /// 已下发设定点，等待完成标志复位
    MoveSent,
}

/// 循环状态：路点游标、序列器状态、看门狗
///
/// 不变量：
/// - `waypoint_cursor < len`
/// - `move_in_progress()` 当且仅当状态为 `MoveSent`
/// - 看门狗在 `MoveSent` 中为 1，在 `AwaitingTrigger` 中为 0
#[derive(Debug, Clone)]
pub struct LoopState {
    cursor: usize,
    len: usize,
    state: SequencerState,
    watchdog: WatchdogGuard,
}

impl LoopState {
    /// `len` 必须大于 0（`WaypointPlan` 保证）
    pub(crate) fn new(len: usize, watchdog: WatchdogGuard) -> Self {
        debug_assert!(len > 0);
        Self {
            cursor: 0,
            len,
            state: SequencerState::AwaitingTrigger,
            watchdog,
        }
    }

    pub fn waypoint_cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn move_in_progress(&self) -> bool {
        self.state == SequencerState::MoveSent
    }

    pub fn watchdog_state(&self) -> WatchdogState {
        self.watchdog.state()
    }

    pub fn watchdog_value(&self) -> i32 {
        self.watchdog.value()
    }

    pub(crate) fn watchdog(&self) -> &WatchdogGuard {
        &self.watchdog
    }

    /// AWAITING_TRIGGER → MOVE_SENT，返回本次路点下标
    pub(crate) fn begin_move(&mut self) -> usize {
        self.state = SequencerState::MoveSent;
        self.watchdog.arm();
        self.cursor
    }

    /// 夹爪动作结束（无论是否超时）后推进游标
    pub(crate) fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.len;
    }

    /// MOVE_SENT → AWAITING_TRIGGER
    pub(crate) fn acknowledge(&mut self) {
        self.state = SequencerState::AwaitingTrigger;
        self.watchdog.idle();
    }
}
