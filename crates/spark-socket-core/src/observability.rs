//! 结构化日志契约。
//!
//! # 教案式说明
//! - **意图（Why）**：传输层需要记录建连、接受、释放等关键节点，但不能绑定具体日志后端；
//!   调用方通过注入 [`Logger`] 决定输出去向，缺省时使用 [`NoopLogger`]，行为不受影响。
//! - **逻辑（How）**：`log` 为唯一必需方法，`debug`/`info`/`warn` 等便捷方法构造
//!   [`LogRecord`] 后统一转交 `log`；启用 `tracing` 特性时 [`TracingLogger`] 负责桥接。
//! - **契约（What）**：实现方应保证 `log` 非阻塞，且不得因日志失败影响调用方流程。

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

/// 日志级别，取 `tracing` 级别的同名子集。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogSeverity {
    /// 逐字节级别的细节。
    Trace,
    /// 调试信息。
    Debug,
    /// 常规事件。
    Info,
    /// 潜在风险。
    Warn,
    /// 故障。
    Error,
}

/// 结构化字段集合：键为低基数静态名，值只需实现 `Display`。
pub type LogField<'a> = &'a [(&'static str, &'a dyn fmt::Display)];

/// 单条结构化日志记录。
///
/// # 契约说明（What）
/// - 记录只持有引用，提交给 [`Logger::log`] 后即视为不可变；
/// - `error` 允许携带底层错误，便于实现方输出根因链。
pub struct LogRecord<'a> {
    /// 日志正文。
    pub message: Cow<'a, str>,
    /// 日志级别。
    pub severity: LogSeverity,
    /// 日志分类，通常为组件名。
    pub target: Option<Cow<'a, str>>,
    /// 关联错误。
    pub error: Option<&'a dyn Error>,
    /// 结构化字段。
    pub attributes: LogField<'a>,
}

impl<'a> LogRecord<'a> {
    /// 构建新的日志记录。
    pub fn new(
        message: impl Into<Cow<'a, str>>,
        severity: LogSeverity,
        target: Option<impl Into<Cow<'a, str>>>,
        error: Option<&'a dyn Error>,
        attributes: LogField<'a>,
    ) -> Self {
        Self {
            message: message.into(),
            severity,
            target: target.map(Into::into),
            error,
            attributes,
        }
    }

    /// 将结构化字段渲染为 `key=value` 序列。
    pub fn render_attributes(&self) -> String {
        let mut rendered = String::new();
        for (index, (key, value)) in self.attributes.iter().enumerate() {
            if index > 0 {
                rendered.push(' ');
            }
            rendered.push_str(key);
            rendered.push('=');
            rendered.push_str(&value.to_string());
        }
        rendered
    }
}

impl fmt::Debug for LogRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("message", &self.message)
            .field("severity", &self.severity)
            .field("target", &self.target)
            .field("error", &self.error.map(|err| err.to_string()))
            .field("attributes", &self.render_attributes())
            .finish()
    }
}

/// 日志接口的核心契约。
///
/// # 设计背景（Why）
/// - 统一传输层对宿主日志实现的依赖，允许对接 `tracing` 或自研后端。
///
/// # 风险提示（Trade-offs）
/// - 便捷方法都会构造一条记录；热路径上请优先使用 `Trace`/`Debug` 并由实现方尽早过滤。
pub trait Logger: Send + Sync + 'static {
    /// 提交结构化日志。
    fn log(&self, record: &LogRecord<'_>);

    /// 输出带字段的 TRACE 日志。
    fn trace_with_fields(&self, message: &str, attributes: LogField<'_>) {
        self.log(&LogRecord::new(
            message,
            LogSeverity::Trace,
            None::<Cow<'_, str>>,
            None,
            attributes,
        ));
    }

    /// 输出 DEBUG 日志。
    fn debug(&self, message: &str) {
        self.debug_with_fields(message, &[]);
    }

    /// 输出带字段的 DEBUG 日志。
    fn debug_with_fields(&self, message: &str, attributes: LogField<'_>) {
        self.log(&LogRecord::new(
            message,
            LogSeverity::Debug,
            None::<Cow<'_, str>>,
            None,
            attributes,
        ));
    }

    /// 输出 INFO 日志。
    fn info(&self, message: &str) {
        self.info_with_fields(message, &[]);
    }

    /// 输出带字段的 INFO 日志。
    fn info_with_fields(&self, message: &str, attributes: LogField<'_>) {
        self.log(&LogRecord::new(
            message,
            LogSeverity::Info,
            None::<Cow<'_, str>>,
            None,
            attributes,
        ));
    }

    /// 输出带字段与错误的 WARN 日志。
    fn warn_with_fields(
        &self,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
        attributes: LogField<'_>,
    ) {
        self.log(&LogRecord::new(
            message,
            LogSeverity::Warn,
            None::<Cow<'_, str>>,
            error.map(|err| err as &dyn Error),
            attributes,
        ));
    }

    /// 输出带字段与错误的 ERROR 日志。
    fn error_with_fields(
        &self,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
        attributes: LogField<'_>,
    ) {
        self.log(&LogRecord::new(
            message,
            LogSeverity::Error,
            None::<Cow<'_, str>>,
            error.map(|err| err as &dyn Error),
            attributes,
        ));
    }
}

/// `NoopLogger` 将日志调用吞掉，是未注入日志实现时的默认值。
///
/// # 契约约束（What）
/// - 不分配内存、不阻塞线程，替换为任何其他实现都不改变调用方行为。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _record: &LogRecord<'_>) {}
}

/// 将 [`Logger`] 契约桥接到 `tracing` 事件。
///
/// # 逻辑（How）
/// - 级别一一映射；结构化字段渲染为 `fields` 属性，错误渲染为 `error` 属性；
/// - `tracing` 的 target 必须是编译期常量，因此记录自带的 `target` 以 `component` 字段输出。
#[cfg(feature = "tracing")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

#[cfg(feature = "tracing")]
impl Logger for TracingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        let fields = record.render_attributes();
        let component = record.target.as_deref().unwrap_or("spark_socket");
        let error = record.error.map(|err| err.to_string()).unwrap_or_default();
        let message = record.message.as_ref();
        match record.severity {
            LogSeverity::Trace => {
                tracing::trace!(component, fields = %fields, error = %error, "{message}")
            }
            LogSeverity::Debug => {
                tracing::debug!(component, fields = %fields, error = %error, "{message}")
            }
            LogSeverity::Info => {
                tracing::info!(component, fields = %fields, error = %error, "{message}")
            }
            LogSeverity::Warn => {
                tracing::warn!(component, fields = %fields, error = %error, "{message}")
            }
            LogSeverity::Error => {
                tracing::error!(component, fields = %fields, error = %error, "{message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<(LogSeverity, String)>>,
    }

    impl Logger for RecordingLogger {
        fn log(&self, record: &LogRecord<'_>) {
            let line = format!("{} {}", record.message, record.render_attributes());
            self.lines
                .lock()
                .expect("recording lock")
                .push((record.severity, line));
        }
    }

    #[test]
    fn convenience_methods_route_through_log() {
        let logger = RecordingLogger::default();
        let port = 4242;
        logger.debug_with_fields("accepted", &[("port", &port), ("peer", &"127.0.0.1")]);
        logger.info("listener disposed");
        let lines = logger.lines.lock().expect("recording lock");
        assert_eq!(lines[0], (LogSeverity::Debug, "accepted port=4242 peer=127.0.0.1".to_string()));
        assert_eq!(lines[1], (LogSeverity::Info, "listener disposed ".to_string()));
    }

    #[cfg(feature = "tracing")]
    #[test]
    #[tracing_test::traced_test]
    fn tracing_logger_emits_events() {
        let bytes = 8usize;
        TracingLogger.debug_with_fields("graceful disconnect drained", &[("bytes", &bytes)]);
        assert!(logs_contain("graceful disconnect drained"));
        assert!(logs_contain("bytes=8"));
    }
}
