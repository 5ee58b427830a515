//! RTDE 连接配置

use std::time::Duration;

/// 控制器 RTDE 默认端口
pub const DEFAULT_PORT: u16 = 30004;

/// RTDE 连接配置
#[derive(Debug, Clone)]
pub struct RtdeConfig {
    /// TCP 连接超时
    pub connect_timeout: Duration,

    /// 建立阶段（版本协商、recipe 注册、start/pause）的应答超时
    pub reply_timeout: Duration,

    /// `receive()` 等待下一条输出记录的最长时间
    ///
    /// 超时视为连接丢失：控制器自身会在客户端无响应时终止会话。
    pub receive_timeout: Duration,

    /// 输出 recipe 的期望频率（Hz）
    pub output_frequency: f64,

    /// 可接受的最低控制器版本（更早的版本没有可用的 v2 协议）
    pub min_controller_version: semver::Version,
}

impl Default for RtdeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(5),
            receive_timeout: Duration::from_secs(1),
            output_frequency: 125.0,
            min_controller_version: semver::Version::new(3, 2, 19171),
        }
    }
}
