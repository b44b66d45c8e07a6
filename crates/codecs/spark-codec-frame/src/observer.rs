use spark_socket_core::Observer;

use crate::{FrameDecoder, FrameError};

/// 推送式分帧适配器：接收字节块回调，向下游转发完整消息。
///
/// # 教案式说明
/// - **Why**：推送订阅与拉取流必须对同一字节序列给出相同的消息与终止事件；
/// - **How**：内部持有与 [`FramedStream`](crate::FramedStream) 相同的 [`FrameDecoder`]，
///   `on_next` 逐块喂入，`on_completed` 时执行结束检查；
/// - **What**：
///   - 解码失败时向下游发送一次 `on_error`，之后忽略上游的一切事件；
///   - 上游错误原样转发，不执行结束检查。
pub struct FramedObserver<D, O> {
    decoder: D,
    downstream: O,
    terminated: bool,
}

impl<D, O> FramedObserver<D, O> {
    /// 用 `decoder` 分帧后转发给 `downstream`。
    pub fn new(decoder: D, downstream: O) -> Self {
        Self {
            decoder,
            downstream,
            terminated: false,
        }
    }

    /// 订阅是否已经终止。
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// 取回下游观察者。
    pub fn into_inner(self) -> O {
        self.downstream
    }
}

impl<D, O, B, E> Observer<B, E> for FramedObserver<D, O>
where
    D: FrameDecoder + Send,
    O: Observer<D::Item, E>,
    B: AsRef<[u8]>,
    E: From<FrameError>,
{
    fn on_next(&mut self, chunk: B) {
        if self.terminated {
            return;
        }
        let mut bytes = chunk.as_ref();
        while !bytes.is_empty() {
            match self.decoder.feed_slice(bytes) {
                Ok((consumed, item)) => {
                    if let Some(item) = item {
                        self.downstream.on_next(item);
                    }
                    bytes = &bytes[consumed..];
                }
                Err(err) => {
                    self.terminated = true;
                    self.downstream.on_error(err.into());
                    return;
                }
            }
        }
    }

    fn on_error(&mut self, error: E) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.downstream.on_error(error);
    }

    fn on_completed(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        match self.decoder.finish() {
            Ok(()) => self.downstream.on_completed(),
            Err(err) => self.downstream.on_error(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LengthPrefixedDecoder, NulStringDecoder};
    use bytes::Bytes;

    #[derive(Debug, Default)]
    struct Events<T> {
        items: Vec<T>,
        errors: Vec<FrameError>,
        completed: usize,
    }

    impl<T: Send> Observer<T, FrameError> for Events<T> {
        fn on_next(&mut self, item: T) {
            self.items.push(item);
        }

        fn on_error(&mut self, error: FrameError) {
            self.errors.push(error);
        }

        fn on_completed(&mut self) {
            self.completed += 1;
        }
    }

    #[test]
    fn strings_split_across_callbacks() {
        let mut framed = FramedObserver::new(NulStringDecoder::new(), Events::default());
        Observer::<&[u8], FrameError>::on_next(&mut framed, b"Wel");
        Observer::<&[u8], FrameError>::on_next(&mut framed, b"come!\0\0");
        Observer::<&[u8], FrameError>::on_completed(&mut framed);
        let events = framed.into_inner();
        assert_eq!(events.items, vec!["Welcome!".to_string(), String::new()]);
        assert_eq!(events.completed, 1);
        assert!(events.errors.is_empty());
    }

    #[test]
    fn decode_error_terminates_once() {
        let mut framed = FramedObserver::new(LengthPrefixedDecoder::new(), Events::default());
        Observer::<Bytes, FrameError>::on_next(&mut framed, Bytes::from_static(&[0, 0, 0, 0]));
        Observer::<Bytes, FrameError>::on_next(&mut framed, Bytes::from_static(&[0, 0, 0, 1, 9]));
        Observer::<Bytes, FrameError>::on_completed(&mut framed);
        assert!(framed.is_terminated());
        let events = framed.into_inner();
        assert!(events.items.is_empty());
        assert_eq!(events.errors, vec![FrameError::InvalidLength { declared: 0 }]);
        assert_eq!(events.completed, 0);
    }

    #[test]
    fn truncated_tail_reported_on_completion() {
        let mut framed = FramedObserver::new(LengthPrefixedDecoder::new(), Events::default());
        Observer::<&[u8], FrameError>::on_next(&mut framed, &[0, 0]);
        Observer::<&[u8], FrameError>::on_completed(&mut framed);
        let events = framed.into_inner();
        assert_eq!(
            events.errors,
            vec![FrameError::Incomplete {
                expected: 4,
                received: 2
            }]
        );
        assert_eq!(events.completed, 0);
    }
}
