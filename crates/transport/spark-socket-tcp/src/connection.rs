use crate::{
    ConnectionError, DisposalCoordinator, DisposeOutcome, ReceiveStream, TcpSocketConfig,
    error::{map_io_error, op},
    receiver::SocketReceiver,
    util::{Raced, race},
};
use bytes::Bytes;
use socket2::SockRef;
use spark_codec_frame::{FrameDecoder, FramedStream};
use spark_socket_core::{CancelSource, Cancellation, LinkedCancellation, Observer, drive};
use std::{
    fmt, io,
    net::{Shutdown, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, tcp::OwnedReadHalf, tcp::OwnedWriteHalf},
    sync::Mutex as AsyncMutex,
    task::JoinHandle,
};

struct ConnectionInner {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    connected: Arc<AtomicBool>,
    receiver: SocketReceiver,
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    coordinator: DisposalCoordinator,
    config: TcpSocketConfig,
}

/// 一条 TCP 连接：全双工字节流、本地/对端地址与幂等释放。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接收循环、发送方与监听器的级联释放会同时持有同一连接，因此 `Connection`
///   是廉价克隆的句柄，内部状态以 `Arc` 共享；
/// - 套接字的所有权在构造时完整交给释放协调器管理，任何路径都不会重复关闭。
///
/// ## 逻辑 (How)
/// - 构造时通过 `into_split` 拆成读写半部：读半部交给接收侧，写半部由异步互斥锁串行化；
/// - 所有阻塞操作都与释放令牌、调用方令牌竞速，释放令牌优先；
/// - 释放流程：若仍连接则写半关闭（FIN），在 `disconnect_timeout` 内排空读侧直到对端 EOF，
///   期间错误只记录不外泄；超时则双向关闭套接字，最后无条件回收两个半部。
///
/// ## 契约 (What)
/// - `is_connected` 只在套接字报告断开（EOF、重置、发送失败）或开始释放后变为 `false`；
/// - 释放后继续 `send` 返回 [`ConnectionError::Disposed`]；
/// - 释放期间中断的接收流正常结束，而对端主动关闭时接收流产出
///   [`ConnectionError::RemoteClosed`]（可通过 [`PeerClosePolicy`](crate::PeerClosePolicy) 调整）。
///
/// ## 注意事项 (Trade-offs)
/// - 被取消的 `send` 可能已经写出部分字节，调用方应视连接上的帧边界为不可信；
/// - 同一连接上的多个接收流按单次拉取轮流加锁读取，调用方应保证单一消费者。
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn from_stream(
        stream: TcpStream,
        config: TcpSocketConfig,
    ) -> Result<Self, ConnectionError> {
        config
            .apply(&stream)
            .map_err(|err| map_io_error(op::CONFIGURE, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(op::CONFIGURE, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(op::CONFIGURE, err))?;

        let (reader, writer) = stream.into_split();
        let connected = Arc::new(AtomicBool::new(true));
        let coordinator = DisposalCoordinator::new();
        let receiver = SocketReceiver::new(
            reader,
            Arc::clone(&connected),
            coordinator.token().clone(),
            config.receive_buffer_size(),
            config.peer_close(),
            Arc::clone(config.logger()),
        );
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                local_addr,
                peer_addr,
                connected,
                receiver,
                writer: AsyncMutex::new(Some(writer)),
                coordinator,
                config,
            }),
        })
    }

    /// 本地地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// 对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// 连接是否仍处于已连接状态。
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// 是否已开始释放。
    pub fn is_disposed(&self) -> bool {
        self.inner.coordinator.is_disposed()
    }

    /// 构造时使用的套接字配置。
    pub fn config(&self) -> &TcpSocketConfig {
        &self.inner.config
    }

    /// 发送整个缓冲区，返回写出的字节数。
    pub async fn send(&self, bytes: &[u8]) -> Result<usize, ConnectionError> {
        self.send_with(bytes, &Cancellation::new()).await
    }

    /// 发送整个缓冲区，可由 `cancellation` 中断。
    ///
    /// # 契约说明（What）
    /// - 已释放：[`ConnectionError::Disposed`]，不做任何 IO；
    /// - 空缓冲：直接返回 `Ok(0)`；
    /// - 发送失败会把连接标记为未连接；对端重置映射为 [`ConnectionError::RemoteClosed`]。
    pub async fn send_with(
        &self,
        bytes: &[u8],
        cancellation: &Cancellation,
    ) -> Result<usize, ConnectionError> {
        if self.is_disposed() {
            return Err(ConnectionError::Disposed);
        }
        if bytes.is_empty() {
            return Ok(0);
        }

        let linked = LinkedCancellation::new(
            self.inner.coordinator.token().clone(),
            cancellation.clone(),
        );
        let written = race(&linked, async {
            let mut guard = self.inner.writer.lock().await;
            match guard.as_mut() {
                Some(writer) => writer.write_all(bytes).await.map(|()| Some(bytes.len())),
                None => Ok(None),
            }
        })
        .await;

        match written {
            Raced::Interrupted(CancelSource::Disposal) | Raced::Completed(Ok(None)) => {
                Err(ConnectionError::Disposed)
            }
            Raced::Interrupted(CancelSource::External) => Err(ConnectionError::Cancelled {
                operation: op::WRITE,
            }),
            Raced::Completed(Ok(Some(len))) => Ok(len),
            Raced::Completed(Err(err)) => {
                self.inner.connected.store(false, Ordering::Release);
                let error = map_io_error(op::WRITE, err);
                self.inner.config.logger().warn_with_fields(
                    "tcp send failed",
                    Some(&error),
                    &[("peer", &self.inner.peer_addr)],
                );
                Err(error)
            }
        }
    }

    /// 按到达顺序产出接收到的字节块。
    pub fn receive_all(&self, cancellation: Cancellation) -> ReceiveStream {
        self.inner.receiver.receive_all(cancellation)
    }

    /// 在接收流之上用 `decoder` 分帧。
    pub fn receive_framed<D>(
        &self,
        cancellation: Cancellation,
        decoder: D,
    ) -> FramedStream<ReceiveStream, D>
    where
        D: FrameDecoder + Unpin,
    {
        FramedStream::new(self.receive_all(cancellation), decoder)
    }

    /// 推送式订阅：在独立任务中驱动接收流，结束后交还观察者。
    pub fn subscribe<O>(&self, observer: O, cancellation: Cancellation) -> JoinHandle<O>
    where
        O: Observer<Bytes, ConnectionError> + 'static,
    {
        let stream = self.receive_all(cancellation);
        tokio::spawn(async move {
            let mut observer = observer;
            drive(stream, &mut observer).await;
            observer
        })
    }

    /// 释放连接；可并发多次调用，只执行一次拆除，所有调用者得到同一结果。
    pub async fn dispose(&self) -> DisposeOutcome {
        let inner = Arc::clone(&self.inner);
        self.inner
            .coordinator
            .dispose_with(move || teardown(inner))
            .await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("local_addr", &self.inner.local_addr)
            .field("peer_addr", &self.inner.peer_addr)
            .field("connected", &self.is_connected())
            .field("disposal", &self.inner.coordinator.state())
            .finish()
    }
}

async fn teardown(inner: Arc<ConnectionInner>) -> DisposeOutcome {
    let logger = Arc::clone(inner.config.logger());
    let was_connected = inner.connected.swap(false, Ordering::AcqRel);
    let peer = inner.peer_addr;

    let Some(mut writer) = inner.writer.lock().await.take() else {
        return DisposeOutcome::NotConnected;
    };

    let mut outcome = if was_connected {
        DisposeOutcome::Graceful
    } else {
        DisposeOutcome::NotConnected
    };

    if was_connected && let Err(err) = writer.shutdown().await {
        logger.debug_with_fields("tcp half-close failed", &[("peer", &peer), ("error", &err)]);
        outcome = DisposeOutcome::Forced;
    }

    let reader = Arc::clone(inner.receiver.reader());
    let drained = tokio::time::timeout(inner.config.disconnect_timeout(), async {
        let mut guard = reader.lock().await;
        let half = guard.take();
        match half {
            Some(mut half) if was_connected => drain_until_eof(&mut half).await,
            _ => Ok(()),
        }
    })
    .await;

    match drained {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            logger.debug_with_fields(
                "tcp graceful disconnect interrupted",
                &[("peer", &peer), ("error", &err)],
            );
            if outcome == DisposeOutcome::Graceful {
                outcome = DisposeOutcome::Forced;
            }
        }
        Err(_) => {
            // 对端迟迟不回 FIN。
            if let Err(err) = SockRef::from(writer.as_ref()).shutdown(Shutdown::Both) {
                logger.debug_with_fields("tcp forced shutdown failed", &[("error", &err)]);
            }
            logger.warn_with_fields(
                "tcp graceful disconnect timed out",
                None,
                &[("peer", &peer)],
            );
            if outcome == DisposeOutcome::Graceful {
                outcome = DisposeOutcome::Forced;
            }
        }
    }

    drop(writer);
    logger.debug_with_fields("tcp connection disposed", &[("peer", &peer)]);
    outcome
}

async fn drain_until_eof(half: &mut OwnedReadHalf) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        match half.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(_) => continue,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}
