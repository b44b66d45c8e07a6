use spark_socket_core::{CoreError, ErrorCategory, codes};
use thiserror::Error;

/// 分帧/解码错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：解码失败说明字节流已不可信，调用方需要可匹配的错误种类来决定
///   关闭连接还是上报协议违规，而不是解析字符串；
/// - **契约 (What)**：所有变体对当前解码过程都是致命的；转换为 [`CoreError`] 时统一
///   归类为 [`ErrorCategory::ProtocolViolation`]；
/// - **设计权衡 (Trade-offs)**：`InvalidLength` 与 `Incomplete` 刻意分开，前者表示数据
///   已损坏，后者只表示流提前结束。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FrameError {
    /// 字符串已经开始但流结束前没有出现 `0x00`。
    #[error("string started but never terminated ({pending} pending bytes)")]
    NoTermination {
        /// 缓冲中未终止的字节数。
        pending: usize,
    },

    /// 长度前缀不是正数。
    #[error("invalid declared frame length {declared}")]
    InvalidLength {
        /// 前缀中解析出的声明长度。
        declared: i32,
    },

    /// 流在前缀或负载中途结束。
    #[error("stream ended inside a frame: expected {expected} bytes, received {received}")]
    Incomplete {
        /// 当前阶段期望的字节数。
        expected: usize,
        /// 当前阶段已收到的字节数。
        received: usize,
    },

    /// 声明长度超过解码器上限。
    #[error("declared frame length {declared} exceeds limit {limit}")]
    FrameTooLarge {
        /// 声明长度。
        declared: usize,
        /// 配置的上限。
        limit: usize,
    },

    /// 整帧解析完成后仍有多余字节。
    #[error("{extra} trailing bytes after frame payload")]
    TrailingBytes {
        /// 多余字节数。
        extra: usize,
    },
}

impl FrameError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            FrameError::NoTermination { .. } => codes::FRAME_NO_TERMINATION,
            FrameError::InvalidLength { .. } => codes::FRAME_INVALID_LENGTH,
            FrameError::Incomplete { .. } => codes::FRAME_INCOMPLETE,
            FrameError::FrameTooLarge { .. } => codes::FRAME_TOO_LARGE,
            FrameError::TrailingBytes { .. } => codes::FRAME_TRAILING_BYTES,
        }
    }
}

impl From<FrameError> for CoreError {
    fn from(error: FrameError) -> Self {
        CoreError::new(error.code(), error.to_string())
            .with_category(ErrorCategory::ProtocolViolation)
    }
}
