//! 取消令牌
//!
//! 由外部（Ctrl-C、标志文件）触发，控制循环在每个周期开始时检查。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 可跨线程共享的取消令牌
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消（幂等）
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
