use serde::Deserialize;
use socket2::SockRef;
use spark_socket_core::{Logger, NoopLogger};
use std::{fmt, io, sync::Arc, time::Duration};
use tokio::net::TcpStream;

/// 默认接收缓冲大小（字节）。
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;

/// 默认优雅断开等待时长。
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// 接收过程中遇到对端有序关闭（读到 0 字节）时的处理策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerClosePolicy {
    /// 以 [`ConnectionError::RemoteClosed`](crate::ConnectionError::RemoteClosed) 结束接收流。
    #[default]
    Error,
    /// 视为正常结束，接收流直接完成。
    Complete,
}

/// TCP 套接字级配置项，实现对内核行为与连接生命周期的显式控制。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将“优雅关闭需等待对端 EOF、超时后强制释放”这一契约显式配置化，
///   避免调用方直接操作 `socket2` 或平台相关常量；
/// - 统一承载日志注入点，连接与监听器在整个生命周期内使用同一个 [`Logger`]。
///
/// ## 核心逻辑（How）
/// - `linger`：通过 `socket2::SockRef::set_linger` 写入 `SO_LINGER`；`None` 表示沿用内核默认；
/// - `nodelay`：写入 `TCP_NODELAY`；
/// - `receive_buffer_size`：每次读取预留的缓冲容量，至少 1 字节；
/// - `disconnect_timeout`：释放时等待对端 EOF 的上限，超时后双向关闭套接字；
/// - `peer_close`：见 [`PeerClosePolicy`]。
///
/// ## 契约说明（What）
/// - 配置在连接建立（或接受）时一次性应用，之后修改不会影响已有连接；
/// - **后置条件**：若 `apply` 返回 `Ok(())`，套接字选项已落地。
///
/// ## 设计取舍与注意事项（Trade-offs）
/// - `SO_LINGER` 在不同平台的精度不同（Linux 取整到秒）；
/// - 若 `linger` 设置过小，仍在发送缓冲区的数据可能被丢弃并触发对端 `ECONNRESET`。
#[derive(Clone)]
pub struct TcpSocketConfig {
    linger: Option<Duration>,
    nodelay: bool,
    receive_buffer_size: usize,
    disconnect_timeout: Duration,
    peer_close: PeerClosePolicy,
    logger: Arc<dyn Logger>,
}

impl TcpSocketConfig {
    /// 创建默认配置。
    pub fn new() -> Self {
        Self {
            linger: None,
            nodelay: false,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            peer_close: PeerClosePolicy::default(),
            logger: Arc::new(NoopLogger),
        }
    }

    /// 设置 `SO_LINGER` 超时时长。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    /// 设置 `TCP_NODELAY`。
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// 设置单次读取的缓冲容量；`0` 会被提升为 `1`。
    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size.max(1);
        self
    }

    /// 设置释放时等待对端 EOF 的上限。
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// 设置对端有序关闭时的接收流策略。
    pub fn with_peer_close(mut self, policy: PeerClosePolicy) -> Self {
        self.peer_close = policy;
        self
    }

    /// 注入日志实现。
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// 读取 `SO_LINGER` 配置。
    pub fn linger(&self) -> Option<Duration> {
        self.linger
    }

    /// 读取 `TCP_NODELAY` 配置。
    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    /// 读取单次读取的缓冲容量。
    pub fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    /// 读取优雅断开等待上限。
    pub fn disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout
    }

    /// 读取对端关闭策略。
    pub fn peer_close(&self) -> PeerClosePolicy {
        self.peer_close
    }

    /// 当前日志实现。
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub(crate) fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        let sock = SockRef::from(stream);
        sock.set_linger(self.linger)
    }
}

impl Default for TcpSocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TcpSocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpSocketConfig")
            .field("linger", &self.linger)
            .field("nodelay", &self.nodelay)
            .field("receive_buffer_size", &self.receive_buffer_size)
            .field("disconnect_timeout", &self.disconnect_timeout)
            .field("peer_close", &self.peer_close)
            .finish_non_exhaustive()
    }
}

/// 可从 TOML/JSON 反序列化的配置镜像，时长以毫秒表示。
///
/// ```rust
/// use spark_socket_tcp::TcpSocketSettings;
///
/// let settings: TcpSocketSettings = serde_json::from_str(r#"{"nodelay": true}"#).unwrap();
/// assert!(settings.into_config().nodelay());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpSocketSettings {
    /// `SO_LINGER`（毫秒）；缺省表示沿用内核默认。
    pub linger_ms: Option<u64>,
    /// `TCP_NODELAY`。
    pub nodelay: bool,
    /// 单次读取缓冲容量。
    pub receive_buffer_size: usize,
    /// 优雅断开等待上限（毫秒）。
    pub disconnect_timeout_ms: u64,
    /// 对端关闭策略。
    pub peer_close: PeerClosePolicy,
}

impl Default for TcpSocketSettings {
    fn default() -> Self {
        Self {
            linger_ms: None,
            nodelay: false,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            disconnect_timeout_ms: DEFAULT_DISCONNECT_TIMEOUT.as_millis() as u64,
            peer_close: PeerClosePolicy::default(),
        }
    }
}

impl TcpSocketSettings {
    /// 转换为运行期配置；日志实现保持默认，可随后通过 [`TcpSocketConfig::with_logger`] 注入。
    pub fn into_config(self) -> TcpSocketConfig {
        TcpSocketConfig::new()
            .with_linger(self.linger_ms.map(Duration::from_millis))
            .with_nodelay(self.nodelay)
            .with_receive_buffer_size(self.receive_buffer_size)
            .with_disconnect_timeout(Duration::from_millis(self.disconnect_timeout_ms))
            .with_peer_close(self.peer_close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TcpSocketConfig::default();
        assert_eq!(config.receive_buffer_size(), 4096);
        assert_eq!(config.disconnect_timeout(), Duration::from_secs(2));
        assert_eq!(config.peer_close(), PeerClosePolicy::Error);
        assert_eq!(config.linger(), None);
        assert_eq!(TcpSocketSettings::default().into_config().receive_buffer_size(), 4096);
    }

    #[test]
    fn zero_buffer_size_is_clamped() {
        let config = TcpSocketConfig::new().with_receive_buffer_size(0);
        assert_eq!(config.receive_buffer_size(), 1);
    }

    #[test]
    fn settings_parse_from_toml() {
        let settings: TcpSocketSettings = toml::from_str(
            r#"
            linger_ms = 1000
            nodelay = true
            receive_buffer_size = 512
            disconnect_timeout_ms = 250
            peer_close = "complete"
            "#,
        )
        .expect("valid settings");
        let config = settings.into_config();
        assert_eq!(config.linger(), Some(Duration::from_secs(1)));
        assert!(config.nodelay());
        assert_eq!(config.receive_buffer_size(), 512);
        assert_eq!(config.disconnect_timeout(), Duration::from_millis(250));
        assert_eq!(config.peer_close(), PeerClosePolicy::Complete);
    }

    #[test]
    fn unknown_settings_are_rejected() {
        let parsed = toml::from_str::<TcpSocketSettings>("backlog = 5");
        assert!(parsed.is_err());
    }
}
