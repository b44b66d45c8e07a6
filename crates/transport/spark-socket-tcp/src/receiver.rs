use crate::{
    ConnectionError, PeerClosePolicy,
    error::{cancelled_error, map_io_error, op},
    util::{Raced, race},
};
use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use spark_socket_core::{CancelSource, Cancellation, LinkedCancellation, Logger};
use std::{
    fmt, io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};
use tokio::{
    io::AsyncReadExt,
    net::tcp::OwnedReadHalf,
    sync::Mutex as AsyncMutex,
};

pub(crate) type SharedReadHalf = Arc<AsyncMutex<Option<OwnedReadHalf>>>;

const RECEIVE: &str = "tcp receive";

/// 连接的接收侧：持有读半部，按需产出接收流。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接收与发送使用各自的半部，读循环阻塞时发送仍可进行；
/// - 读半部放在共享互斥锁里，释放流程可以在接收流结束后取走它完成排空。
///
/// ## 契约 (What)
/// - 读半部只在单次拉取期间加锁，两次拉取之间不持有，未被轮询的接收流不会阻塞释放；
/// - 调用方应保证单一消费者：多个并发接收流按拉取轮流读取，字节在它们之间的分配不确定；
/// - 释放令牌触发时接收流正常结束，调用方令牌触发时产出一次
///   [`ConnectionError::Cancelled`] 后结束。
#[derive(Clone)]
pub(crate) struct SocketReceiver {
    reader: SharedReadHalf,
    connected: Arc<AtomicBool>,
    disposal: Cancellation,
    buffer_size: usize,
    peer_close: PeerClosePolicy,
    logger: Arc<dyn Logger>,
}

impl SocketReceiver {
    pub(crate) fn new(
        reader: OwnedReadHalf,
        connected: Arc<AtomicBool>,
        disposal: Cancellation,
        buffer_size: usize,
        peer_close: PeerClosePolicy,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            reader: Arc::new(AsyncMutex::new(Some(reader))),
            connected,
            disposal,
            buffer_size,
            peer_close,
            logger,
        }
    }

    pub(crate) fn reader(&self) -> &SharedReadHalf {
        &self.reader
    }

    pub(crate) fn receive_all(&self, cancellation: Cancellation) -> ReceiveStream {
        let state = ReceiveLoop {
            linked: LinkedCancellation::new(self.disposal.clone(), cancellation),
            receiver: self.clone(),
            buffer: BytesMut::with_capacity(self.buffer_size),
            finished: false,
        };
        let inner = stream::unfold(state, |mut state| async move {
            let item = state.next_chunk().await?;
            Some((item, state))
        })
        .boxed();
        ReceiveStream { inner }
    }
}

struct ReceiveLoop {
    receiver: SocketReceiver,
    linked: LinkedCancellation,
    buffer: BytesMut,
    finished: bool,
}

impl ReceiveLoop {
    /// 每次拉取最多执行一次 `read`。
    async fn next_chunk(&mut self) -> Option<Result<Bytes, ConnectionError>> {
        if self.finished {
            return None;
        }

        let reader = Arc::clone(&self.receiver.reader);
        let mut guard = match race(&self.linked, reader.lock()).await {
            Raced::Completed(guard) => guard,
            Raced::Interrupted(source) => return self.interrupted(source),
        };

        loop {
            let Some(half) = guard.as_mut() else {
                // 读半部已被释放流程回收。
                self.finished = true;
                return None;
            };

            if self.buffer.capacity() < self.receiver.buffer_size {
                self.buffer.reserve(self.receiver.buffer_size);
            }
            let read = race(&self.linked, half.read_buf(&mut self.buffer)).await;
            match read {
                Raced::Interrupted(source) => return self.interrupted(source),
                Raced::Completed(Ok(0)) => {
                    self.finished = true;
                    return self.on_peer_shutdown();
                }
                Raced::Completed(Ok(_)) => {
                    return Some(Ok(self.buffer.split().freeze()));
                }
                Raced::Completed(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {
                    continue;
                }
                Raced::Completed(Err(err)) => {
                    self.finished = true;
                    return self.on_read_error(err);
                }
            }
        }
    }

    fn interrupted(&mut self, source: CancelSource) -> Option<Result<Bytes, ConnectionError>> {
        self.finished = true;
        match source {
            CancelSource::Disposal => None,
            CancelSource::External => Some(Err(cancelled_error(RECEIVE))),
        }
    }

    fn on_peer_shutdown(&mut self) -> Option<Result<Bytes, ConnectionError>> {
        self.receiver.connected.store(false, Ordering::Release);
        if self.linked.disposal().is_cancelled() {
            return None;
        }
        self.receiver.logger.debug("tcp peer closed the connection");
        match self.receiver.peer_close {
            PeerClosePolicy::Complete => None,
            PeerClosePolicy::Error => Some(Err(ConnectionError::RemoteClosed { source: None })),
        }
    }

    fn on_read_error(&mut self, err: io::Error) -> Option<Result<Bytes, ConnectionError>> {
        if self.linked.disposal().is_cancelled() {
            // 释放流程关闭套接字引起的读错误不外泄。
            return None;
        }
        let error = map_io_error(op::READ, err);
        if error.is_remote_closed() {
            self.receiver.connected.store(false, Ordering::Release);
        }
        self.receiver
            .logger
            .warn_with_fields("tcp receive failed", Some(&error), &[]);
        Some(Err(error))
    }
}

/// 按到达顺序产出字节块的接收流。
pub struct ReceiveStream {
    inner: BoxStream<'static, Result<Bytes, ConnectionError>>,
}

impl ReceiveStream {
    /// 转换为逐字节视图。
    pub fn into_bytes(self) -> ByteStream {
        ByteStream {
            chunks: self,
            current: Bytes::new(),
        }
    }
}

impl Stream for ReceiveStream {
    type Item = Result<Bytes, ConnectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for ReceiveStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveStream").finish_non_exhaustive()
    }
}

/// 逐字节产出的接收流视图。
#[derive(Debug)]
pub struct ByteStream {
    chunks: ReceiveStream,
    current: Bytes,
}

impl Stream for ByteStream {
    type Item = Result<u8, ConnectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.current.has_remaining() {
                let byte = self.current.get_u8();
                return Poll::Ready(Some(Ok(byte)));
            }
            match self.chunks.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.current = chunk,
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
