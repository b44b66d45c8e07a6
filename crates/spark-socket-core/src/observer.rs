//! 推送式订阅契约。
//!
//! # 教案式说明
//! - **意图（Why）**：部分调用方习惯“数据到达即回调”的推送模型；为了不复制协议状态机，
//!   推送接口只是拉取式 `Stream` 之上的一层驱动：[`drive`] 逐项拉取并回调 [`Observer`]。
//! - **契约（What）**：一次订阅最多收到一个终止事件（`on_error` 或 `on_completed`），
//!   终止后不再有任何回调。

use futures_util::{Stream, StreamExt};

/// 推送式观察者。
///
/// # 契约说明（What）
/// - `on_next` 按源顺序调用，可被调用零次或多次；
/// - `on_error` 与 `on_completed` 互斥，且只会调用其一一次；
/// - 实现方需满足 `Send`，以便订阅在独立任务中运行。
pub trait Observer<T, E>: Send {
    /// 收到一个元素。
    fn on_next(&mut self, item: T);

    /// 源以错误终止。
    fn on_error(&mut self, error: E);

    /// 源正常结束。
    fn on_completed(&mut self);
}

/// 以拉取方式驱动 `stream`，并把每个事件推送给 `observer`。
///
/// 首个 `Err` 即视为终止事件，之后不再拉取源。
pub async fn drive<S, T, E, O>(stream: S, observer: &mut O)
where
    S: Stream<Item = Result<T, E>>,
    O: Observer<T, E> + ?Sized,
{
    futures_util::pin_mut!(stream);
    while let Some(next) = stream.next().await {
        match next {
            Ok(item) => observer.on_next(item),
            Err(err) => {
                observer.on_error(err);
                return;
            }
        }
    }
    observer.on_completed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[derive(Default)]
    struct Collect {
        items: Vec<u32>,
        error: Option<&'static str>,
        completed: bool,
    }

    impl Observer<u32, &'static str> for Collect {
        fn on_next(&mut self, item: u32) {
            self.items.push(item);
        }

        fn on_error(&mut self, error: &'static str) {
            self.error = Some(error);
        }

        fn on_completed(&mut self) {
            self.completed = true;
        }
    }

    #[test]
    fn drive_stops_at_first_error() {
        let mut observer = Collect::default();
        let source = stream::iter(vec![Ok(1), Ok(2), Err("reset"), Ok(3)]);
        futures::executor::block_on(drive(source, &mut observer));
        assert_eq!(observer.items, vec![1, 2]);
        assert_eq!(observer.error, Some("reset"));
        assert!(!observer.completed);
    }

    #[test]
    fn drive_completes_on_exhaustion() {
        let mut observer = Collect::default();
        let source = stream::iter(vec![Ok::<u32, &'static str>(7)]);
        futures::executor::block_on(drive(source, &mut observer));
        assert_eq!(observer.items, vec![7]);
        assert!(observer.completed);
    }
}
