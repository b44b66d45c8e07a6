use crate::{
    Connection, ConnectionError, DisposeOutcome, TcpSocketConfig,
    error::{map_io_error, op},
    util::{Raced, race},
};
use futures_util::{
    future::join_all,
    stream::{self, BoxStream, Stream, StreamExt},
};
use spark_socket_core::{Cancellation, LinkedCancellation};
use std::{
    fmt,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
};
use tokio::net::TcpListener;

/// 监听器的接受侧：持有监听套接字与已接受连接的跟踪表。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 监听器释放时必须级联释放仍然打开的连接，因此每个接受到的连接都登记在案；
/// - 释放与接受可能竞速：释放已开始后接受到的连接不能交给调用方，否则会泄露。
///
/// ## 逻辑 (How)
/// - 登记时在跟踪表锁内检查释放令牌；释放流程在令牌触发之后才在同一把锁内取走跟踪表，
///   两者互斥，因此任何连接要么被登记并随后级联释放，要么在登记时被直接释放；
/// - 登记时顺带清理已经释放的条目，跟踪表不会无限增长。
pub(crate) struct SocketAcceptor {
    listener: Mutex<Option<Arc<TcpListener>>>,
    tracked: Mutex<Vec<Connection>>,
    config: TcpSocketConfig,
    disposal: Cancellation,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SocketAcceptor {
    pub(crate) fn new(listener: TcpListener, config: TcpSocketConfig, disposal: Cancellation) -> Self {
        Self {
            listener: Mutex::new(Some(Arc::new(listener))),
            tracked: Mutex::new(Vec::new()),
            config,
            disposal,
        }
    }

    pub(crate) fn config(&self) -> &TcpSocketConfig {
        &self.config
    }

    pub(crate) fn tracked_len(&self) -> usize {
        lock(&self.tracked)
            .iter()
            .filter(|connection| !connection.is_disposed())
            .count()
    }

    fn current_listener(&self) -> Option<Arc<TcpListener>> {
        lock(&self.listener).clone()
    }

    /// 登记新连接；释放已开始时返回 `false`。
    fn track(&self, connection: &Connection) -> bool {
        let mut tracked = lock(&self.tracked);
        if self.disposal.is_cancelled() {
            return false;
        }
        tracked.retain(|existing| !existing.is_disposed());
        tracked.push(connection.clone());
        true
    }

    pub(crate) fn accept_all(self: &Arc<Self>, cancellation: Cancellation) -> AcceptStream {
        let state = AcceptLoop {
            acceptor: Arc::clone(self),
            linked: LinkedCancellation::new(self.disposal.clone(), cancellation),
            finished: false,
        };
        let inner = stream::unfold(state, |mut state| async move {
            let item = state.next_connection().await?;
            Some((item, state))
        })
        .boxed();
        AcceptStream { inner }
    }

    /// 释放流程：关闭监听套接字，并发释放所有仍在跟踪的连接。
    pub(crate) async fn teardown(self: Arc<Self>) -> DisposeOutcome {
        drop(lock(&self.listener).take());
        let connections = std::mem::take(&mut *lock(&self.tracked));
        let logger = self.config.logger();
        logger.info_with_fields(
            "tcp listener cascading disposal",
            &[("connections", &connections.len())],
        );
        let outcomes = join_all(connections.iter().map(|connection| connection.dispose())).await;
        if outcomes.contains(&DisposeOutcome::Aborted) {
            DisposeOutcome::Forced
        } else {
            DisposeOutcome::Graceful
        }
    }
}

struct AcceptLoop {
    acceptor: Arc<SocketAcceptor>,
    linked: LinkedCancellation,
    finished: bool,
}

impl AcceptLoop {
    /// 单个已接受套接字的初始化失败只丢弃该连接，不结束接受流。
    async fn next_connection(&mut self) -> Option<Result<Connection, ConnectionError>> {
        loop {
            if self.finished {
                return None;
            }
            let Some(listener) = self.acceptor.current_listener() else {
                self.finished = true;
                return None;
            };

            let accepted = race(&self.linked, listener.accept()).await;
            drop(listener);
            let (stream, remote) = match accepted {
                Raced::Interrupted(_) => {
                    self.finished = true;
                    return None;
                }
                Raced::Completed(Ok(accepted)) => accepted,
                Raced::Completed(Err(err)) => {
                    self.finished = true;
                    if self.linked.disposal().is_cancelled() {
                        return None;
                    }
                    let error = map_io_error(op::ACCEPT, err);
                    self.acceptor
                        .config
                        .logger()
                        .warn_with_fields("tcp accept failed", Some(&error), &[]);
                    return Some(Err(error));
                }
            };

            let connection = match Connection::from_stream(stream, self.acceptor.config.clone()) {
                Ok(connection) => connection,
                Err(err) => {
                    self.acceptor.config.logger().warn_with_fields(
                        "tcp accepted connection dropped",
                        Some(&err),
                        &[("peer", &remote)],
                    );
                    continue;
                }
            };
            if self.acceptor.track(&connection) {
                self.acceptor
                    .config
                    .logger()
                    .debug_with_fields("tcp connection accepted", &[("peer", &remote)]);
                return Some(Ok(connection));
            }
            connection.dispose().await;
            self.finished = true;
            return None;
        }
    }
}

/// 已接受连接的流；仅在取消、释放或监听出错时结束。
pub struct AcceptStream {
    inner: BoxStream<'static, Result<Connection, ConnectionError>>,
}

impl Stream for AcceptStream {
    type Item = Result<Connection, ConnectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for AcceptStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptStream").finish_non_exhaustive()
    }
}
