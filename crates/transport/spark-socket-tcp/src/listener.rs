use crate::{
    AcceptStream, Connection, ConnectionError, DisposalCoordinator, DisposeOutcome,
    TcpSocketConfig,
    acceptor::SocketAcceptor,
    error::{map_io_error, op},
};
use spark_socket_core::{Cancellation, Observer, drive};
use std::{fmt, net::SocketAddr, sync::Arc};
use tokio::{net::TcpSocket, task::JoinHandle};

/// 未指定时使用的监听队列长度。
pub const DEFAULT_BACKLOG: u32 = 10;

struct ListenerInner {
    acceptor: Arc<SocketAcceptor>,
    coordinator: DisposalCoordinator,
    local_addr: SocketAddr,
}

/// 处于监听状态的 TCP 服务端。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 以“接受连接的流”形式暴露服务端，调用方自行决定每条连接的处理任务；
/// - 释放监听器时一并释放它接受过且仍然打开的连接，避免宿主逐个追踪。
///
/// ## 逻辑 (How)
/// - `listen` 通过 `TcpSocket` 绑定并以指定 backlog 进入监听；
/// - [`Listener::accept_all`] 与释放令牌、调用方令牌竞速，二者任一触发都正常结束；
/// - [`Listener::dispose`] 经释放协调器执行一次拆除：关闭监听套接字，并发释放所有跟踪中的连接并等待。
///
/// ## 契约 (What)
/// - **前置条件**：必须在 Tokio 运行时中使用；
/// - **后置条件**：释放返回后监听端口已关闭，`tracked_len() == 0`，之后的 `accept_all`
///   立即结束。
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

/// 以默认配置在 `endpoint` 上监听。
pub async fn listen(endpoint: SocketAddr, backlog: u32) -> Result<Listener, ConnectionError> {
    listen_with_config(endpoint, backlog, TcpSocketConfig::default()).await
}

/// 在 `endpoint` 上监听，接受的连接统一应用 `config`。
///
/// 端口 `0` 表示由系统分配，实际地址通过 [`Listener::local_addr`] 读取。
pub async fn listen_with_config(
    endpoint: SocketAddr,
    backlog: u32,
    config: TcpSocketConfig,
) -> Result<Listener, ConnectionError> {
    if backlog == 0 {
        return Err(ConnectionError::InvalidArgument {
            reason: "listen backlog must be positive",
        });
    }
    let socket = if endpoint.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|err| map_io_error(op::BIND, err))?;
    #[cfg(not(windows))]
    socket
        .set_reuseaddr(true)
        .map_err(|err| map_io_error(op::BIND, err))?;
    socket
        .bind(endpoint)
        .map_err(|err| map_io_error(op::BIND, err))?;
    let listener = socket
        .listen(backlog)
        .map_err(|err| map_io_error(op::LISTEN, err))?;
    let local_addr = listener
        .local_addr()
        .map_err(|err| map_io_error(op::LISTEN, err))?;

    config
        .logger()
        .info_with_fields("tcp listener bound", &[("local", &local_addr), ("backlog", &backlog)]);

    let coordinator = DisposalCoordinator::new();
    let acceptor = SocketAcceptor::new(listener, config, coordinator.token().clone());
    Ok(Listener {
        inner: Arc::new(ListenerInner {
            acceptor: Arc::new(acceptor),
            coordinator,
            local_addr,
        }),
    })
}

impl Listener {
    /// 实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// 新连接继承的套接字配置。
    pub fn config(&self) -> &TcpSocketConfig {
        self.inner.acceptor.config()
    }

    /// 持续接受连接，直到取消、释放或监听出错。
    pub fn accept_all(&self, cancellation: Cancellation) -> AcceptStream {
        self.inner.acceptor.accept_all(cancellation)
    }

    /// 推送式订阅：在独立任务中驱动接受流，结束后交还观察者。
    pub fn subscribe<O>(&self, observer: O, cancellation: Cancellation) -> JoinHandle<O>
    where
        O: Observer<Connection, ConnectionError> + 'static,
    {
        let stream = self.accept_all(cancellation);
        tokio::spawn(async move {
            let mut observer = observer;
            drive(stream, &mut observer).await;
            observer
        })
    }

    /// 仍在跟踪且未释放的连接数量。
    pub fn tracked_len(&self) -> usize {
        self.inner.acceptor.tracked_len()
    }

    /// 是否已开始释放。
    pub fn is_disposed(&self) -> bool {
        self.inner.coordinator.is_disposed()
    }

    /// 释放监听器并级联释放跟踪中的连接；可并发多次调用。
    pub async fn dispose(&self) -> DisposeOutcome {
        let acceptor = Arc::clone(&self.inner.acceptor);
        self.inner
            .coordinator
            .dispose_with(move || acceptor.teardown())
            .await
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.inner.local_addr)
            .field("tracked", &self.tracked_len())
            .field("disposal", &self.inner.coordinator.state())
            .finish()
    }
}
