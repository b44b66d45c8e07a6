#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `spark-socket-core`：套接字库各层共享的最小契约集合。
//!
//! # 教案背景（Why）
//! - 编解码层与传输层都需要统一的错误码、取消语义与日志注入点；若各自定义，
//!   上层在匹配错误或串联取消时会出现语义漂移；
//! - 推送式（Observer）与拉取式（Stream）两套消费接口需要共享同一份协议状态，
//!   因此把 [`Observer`] 契约与驱动函数 [`drive`] 放在最底层。
//!
//! # 模块概览（How）
//! - [`error`]：`CoreError` + `ErrorCategory` + 稳定错误码；
//! - [`contract`]：可等待的取消令牌 [`Cancellation`] 与“释放/外部”双源组合 [`LinkedCancellation`]；
//! - [`observability`]：结构化日志契约 [`Logger`]，默认空实现 [`NoopLogger`]；
//! - [`observer`]：推送式订阅契约。
//!
//! # 契约说明（What）
//! - 本 crate 不执行任何 IO，也不绑定具体运行时；取消令牌的唤醒基于 `tokio-util`，
//!   可在任意执行器中等待。

pub mod contract;
pub mod error;
pub mod observability;
pub mod observer;

pub use contract::{CancelSource, Cancellation, LinkedCancellation};
pub use error::{CoreError, ErrorCategory, RetryAdvice, codes};
pub use observability::{LogField, LogRecord, LogSeverity, Logger, NoopLogger};
#[cfg(feature = "tracing")]
pub use observability::TracingLogger;
pub use observer::{Observer, drive};
