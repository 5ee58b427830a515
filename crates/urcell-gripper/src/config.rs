//! 夹爪连接配置

use std::time::Duration;

/// URCap 夹爪 socket 默认端口
pub const DEFAULT_PORT: u16 = 63352;

/// 夹爪连接配置
#[derive(Debug, Clone)]
pub struct GripperConfig {
    /// 连接超时，同时作为每条命令的读写超时
    pub socket_timeout: Duration,

    /// 状态轮询间隔
    pub poll_interval: Duration,

    /// 写入 ACT=1 后、开始轮询激活状态前的等待
    pub activation_settle: Duration,

    /// 激活 / 复位的最大轮询次数
    pub activation_max_polls: u32,

    /// 激活后自动标定可用行程
    pub auto_calibrate: bool,

    /// 标定时使用的速度与力
    pub calibration_speed: u8,
    pub calibration_force: u8,

    /// 标定时单次运动的超时
    pub calibration_timeout: Duration,
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            socket_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            activation_settle: Duration::from_secs(1),
            activation_max_polls: 500,
            auto_calibrate: false,
            calibration_speed: 64,
            calibration_force: 1,
            calibration_timeout: Duration::from_secs(10),
        }
    }
}

impl GripperConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_activation(mut self, settle: Duration, max_polls: u32) -> Self {
        self.activation_settle = settle;
        self.activation_max_polls = max_polls;
        self
    }

    pub fn with_auto_calibrate(mut self, enabled: bool) -> Self {
        self.auto_calibrate = enabled;
        self
    }
}
