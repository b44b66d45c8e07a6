use spark_codec_frame::FrameError;
use spark_socket_core::{CoreError, ErrorCategory, RetryAdvice, codes};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// 底层操作名称，用于错误文案与日志字段。
pub(crate) mod op {
    pub(crate) const BIND: &str = "tcp bind";
    pub(crate) const LISTEN: &str = "tcp listen";
    pub(crate) const ACCEPT: &str = "tcp accept";
    pub(crate) const CONNECT: &str = "tcp connect";
    pub(crate) const READ: &str = "tcp read";
    pub(crate) const WRITE: &str = "tcp write";
    pub(crate) const CONFIGURE: &str = "tcp configure";
}

/// 连接、监听与收发过程中的错误域。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 调用方需要按种类分支：拒绝连接可以重试，对端关闭需要清理会话，帧损坏必须断开；
///   因此以可匹配的枚举暴露，而不是只给出字符串。
///
/// ## 契约 (What)
/// - `InvalidArgument`、`Cancelled`（预先取消）、`TimedOut`（零超时）均在任何 IO 之前返回；
/// - `RemoteClosed` 专指对端驱动的关闭或重置，本地释放引起的中断不会产生该错误；
/// - `Disposed` 仅在本地已释放的连接上继续发送时出现；
/// - 任意变体都可经 `From` 转换为 [`CoreError`]，保留稳定错误码与分类。
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// 参数在 IO 之前即被拒绝。
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// 拒绝原因。
        reason: &'static str,
    },

    /// 目标地址没有监听者。
    #[error("connection refused")]
    Refused {
        /// 底层错误。
        source: io::Error,
    },

    /// 操作在截止前未完成。
    #[error("{operation} timed out")]
    TimedOut {
        /// 超时的操作。
        operation: &'static str,
    },

    /// 调用方取消了操作。
    #[error("{operation} cancelled")]
    Cancelled {
        /// 被取消的操作。
        operation: &'static str,
    },

    /// 对端关闭或重置了连接。
    #[error("connection closed by remote peer")]
    RemoteClosed {
        /// 重置时的底层错误；有序关闭（读到 0 字节）时为 `None`。
        source: Option<io::Error>,
    },

    /// 连接已在本地释放。
    #[error("connection already disposed")]
    Disposed,

    /// 分帧解码失败。
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// 其余 IO 故障。
    #[error("{operation} failed: {source}")]
    Io {
        /// 失败的操作。
        operation: &'static str,
        /// 底层错误。
        source: io::Error,
    },
}

impl ConnectionError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ConnectionError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            ConnectionError::Refused { .. } => codes::CONNECT_REFUSED,
            ConnectionError::TimedOut { .. } => codes::TIMEOUT,
            ConnectionError::Cancelled { .. } => codes::CANCELLED,
            ConnectionError::RemoteClosed { .. } => codes::REMOTE_CLOSED,
            ConnectionError::Disposed => codes::DISPOSED,
            ConnectionError::Frame(frame) => frame.code(),
            ConnectionError::Io { .. } => codes::IO,
        }
    }

    /// 返回错误分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConnectionError::InvalidArgument { .. } => ErrorCategory::NonRetryable,
            ConnectionError::Refused { .. } => {
                ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(50)))
            }
            ConnectionError::TimedOut { .. } => ErrorCategory::Timeout,
            ConnectionError::Cancelled { .. } => ErrorCategory::Cancelled,
            ConnectionError::RemoteClosed { .. } => ErrorCategory::PeerClosed,
            ConnectionError::Disposed => ErrorCategory::Disposed,
            ConnectionError::Frame(_) => ErrorCategory::ProtocolViolation,
            ConnectionError::Io { source, .. } => categorize_io_error(source),
        }
    }

    /// 是否为对端驱动的关闭。
    pub fn is_remote_closed(&self) -> bool {
        matches!(self, ConnectionError::RemoteClosed { .. })
    }
}

impl From<ConnectionError> for CoreError {
    fn from(error: ConnectionError) -> Self {
        let code = error.code();
        let category = error.category();
        CoreError::new(code, error.to_string())
            .with_category(category)
            .with_cause(error)
    }
}

/// 将 IO 错误映射为连接错误域。
pub(crate) fn map_io_error(operation: &'static str, error: io::Error) -> ConnectionError {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::ConnectionRefused => ConnectionError::Refused { source: error },
        ErrorKind::TimedOut => ConnectionError::TimedOut { operation },
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => ConnectionError::RemoteClosed {
            source: Some(error),
        },
        _ => ConnectionError::Io {
            operation,
            source: error,
        },
    }
}

/// 构造取消错误。
pub(crate) fn cancelled_error(operation: &'static str) -> ConnectionError {
    ConnectionError::Cancelled { operation }
}

/// 构造超时错误。
pub(crate) fn timeout_error(operation: &'static str) -> ConnectionError {
    ConnectionError::TimedOut { operation }
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        ErrorKind::WouldBlock | ErrorKind::Interrupted => {
            ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(5)))
        }
        ErrorKind::NotConnected | ErrorKind::AddrInUse | ErrorKind::AddrNotAvailable => {
            ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(50)))
        }
        ErrorKind::WriteZero => {
            ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(10)))
        }
        _ => ErrorCategory::NonRetryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn reset_maps_to_remote_closed() {
        let err = map_io_error(
            op::READ,
            io::Error::from(io::ErrorKind::ConnectionReset),
        );
        assert!(err.is_remote_closed());
        assert_eq!(err.category(), ErrorCategory::PeerClosed);
        assert!(err.source().is_some());
    }

    #[test]
    fn refused_is_retryable() {
        let err = map_io_error(
            op::CONNECT,
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert!(matches!(err, ConnectionError::Refused { .. }));
        assert!(matches!(err.category(), ErrorCategory::Retryable(_)));
    }

    #[test]
    fn frame_errors_keep_their_code() {
        let err = ConnectionError::from(FrameError::InvalidLength { declared: 0 });
        assert_eq!(err.code(), codes::FRAME_INVALID_LENGTH);
        let core: CoreError = err.into();
        assert_eq!(core.category(), ErrorCategory::ProtocolViolation);
        assert!(core.cause().is_some());
    }

    #[test]
    fn other_io_errors_keep_operation_name() {
        let err = map_io_error(op::WRITE, io::Error::other("boom"));
        assert_eq!(err.to_string(), "tcp write failed: boom");
        assert_eq!(err.code(), codes::IO);
    }
}
