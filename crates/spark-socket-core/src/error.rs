//! 跨层共享的错误形态：稳定错误码、分类与根因链。

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// 错误根因的对象安全封装。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `CoreError` 是套接字库跨层共享的稳定错误形态。
///
/// # 设计背景（Why）
/// - 编解码错误、连接建立错误与对端断开错误来自不同 crate，但日志与告警需要统一的
///   错误码与分类才能做自动化治理；
/// - 各层仍保留各自的 `thiserror` 枚举以便精确匹配，最终通过 `From` 汇入本结构。
///
/// # 逻辑解析（How）
/// - `code` 为 `'static` 稳定字符串，遵循 `spark.<域>.<语义>` 命名；
/// - `message` 面向排障人员；`cause` 保存底层错误并通过 `source()` 暴露；
/// - `category` 驱动调用方的重试/关闭决策，未显式设置时回退为 [`ErrorCategory::NonRetryable`]。
///
/// # 契约说明（What）
/// - **前置条件**：调用方应使用 [`codes`] 中登记的错误码；
/// - **后置条件**：构造结果可安全跨线程移动（`Send + Sync + 'static`）。
///
/// # 设计取舍（Trade-offs）
/// - 使用 `Cow<'static, str>` 保存消息，静态文案零分配，动态文案一次分配。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
    category: Option<ErrorCategory>,
}

impl CoreError {
    /// 构造核心错误。
    ///
    /// ```rust
    /// use spark_socket_core::{CoreError, ErrorCategory, codes};
    ///
    /// let err = CoreError::new(codes::CONNECT_REFUSED, "peer refused");
    /// assert_eq!(err.code(), codes::CONNECT_REFUSED);
    /// assert_eq!(err.category(), ErrorCategory::NonRetryable);
    /// ```
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            category: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 标记结构化分类信息。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// 获取结构化错误分类；未设置时返回 [`ErrorCategory::NonRetryable`]。
    pub fn category(&self) -> ErrorCategory {
        self.category
            .clone()
            .unwrap_or(ErrorCategory::NonRetryable)
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 重试建议，描述“等待多久再试”。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryAdvice {
    /// 推荐的等待时长。
    pub wait: Duration,
}

impl RetryAdvice {
    /// 构造仅包含等待时间的建议。
    pub const fn after(wait: Duration) -> Self {
        Self { wait }
    }
}

/// 错误分类枚举，驱动调用方的容错策略。
///
/// # 契约说明（What）
/// - `Retryable`：瞬时故障，附带退避建议；
/// - `ProtocolViolation`：帧结构损坏，禁止自动重同步，应关闭连接；
/// - `Cancelled`/`Timeout`：调用方主动放弃或超出时限；
/// - `PeerClosed`：对端关闭或重置连接，与本地释放严格区分；
/// - `Disposed`：本地已释放的对象上继续调用。
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// 可重试。
    Retryable(RetryAdvice),
    /// 不可重试。
    NonRetryable,
    /// 协议/帧结构违规。
    ProtocolViolation,
    /// 调用方取消。
    Cancelled,
    /// 超时。
    Timeout,
    /// 对端关闭连接。
    PeerClosed,
    /// 本地对象已释放。
    Disposed,
}

/// 稳定错误码表。
///
/// 错误码一经发布即视为契约，只允许新增，不允许修改语义。
pub mod codes {
    /// 参数在任何 IO 之前即被拒绝。
    pub const INVALID_ARGUMENT: &str = "spark.socket.invalid_argument";
    /// 对端拒绝连接。
    pub const CONNECT_REFUSED: &str = "spark.socket.connect_refused";
    /// 操作超时。
    pub const TIMEOUT: &str = "spark.socket.timeout";
    /// 操作被调用方取消。
    pub const CANCELLED: &str = "spark.socket.cancelled";
    /// 对端关闭或重置连接。
    pub const REMOTE_CLOSED: &str = "spark.socket.remote_closed";
    /// 在已释放的连接上继续操作。
    pub const DISPOSED: &str = "spark.socket.disposed";
    /// 其余 IO 故障。
    pub const IO: &str = "spark.socket.io";
    /// 字符串缺少终止符。
    pub const FRAME_NO_TERMINATION: &str = "spark.frame.no_termination";
    /// 长度前缀非正。
    pub const FRAME_INVALID_LENGTH: &str = "spark.frame.invalid_length";
    /// 流在帧中途结束。
    pub const FRAME_INCOMPLETE: &str = "spark.frame.incomplete";
    /// 声明长度超出上限。
    pub const FRAME_TOO_LARGE: &str = "spark.frame.too_large";
    /// 整帧解析后仍有多余字节。
    pub const FRAME_TRAILING_BYTES: &str = "spark.frame.trailing_bytes";
}
