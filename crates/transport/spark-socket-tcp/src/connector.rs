use crate::{
    Connection, ConnectionError, TcpSocketConfig,
    error::op,
    util::{run_with_deadline, validate_remote_endpoint},
};
use spark_socket_core::Cancellation;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpSocket;

/// 以默认配置连接 `endpoint`。
pub async fn connect(
    endpoint: SocketAddr,
    timeout: Option<Duration>,
    cancellation: &Cancellation,
) -> Result<Connection, ConnectionError> {
    connect_with_config(endpoint, timeout, cancellation, TcpSocketConfig::default()).await
}

/// 建立到 `endpoint` 的连接，并应用 `config`。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 建连可能被对端拒绝、长时间无响应或被调用方放弃，三者需要给出可区分的错误；
/// - 失败路径上不能遗留半创建的套接字。
///
/// ## 契约（What）
/// - 依次检查：地址（未指定 IP 或端口 0 ⇒ [`ConnectionError::InvalidArgument`]）、
///   预先取消（⇒ [`ConnectionError::Cancelled`]）、零超时（⇒ [`ConnectionError::TimedOut`]），
///   这三种情况都不创建套接字；
/// - `timeout = None` 表示不限时；
/// - 无人监听 ⇒ [`ConnectionError::Refused`]；超时 ⇒ `TimedOut`；建连中途取消 ⇒ `Cancelled`；
/// - **后置条件**：成功返回的连接 `is_connected() == true`。
///
/// ## 实现逻辑（How）
/// - 套接字由建连 Future 独占，失败或被竞速淘汰时随 Future 一起析构，描述符立即释放；
/// - 成功后通过 `Connection::from_stream` 应用 `config` 并拆分读写半部。
pub async fn connect_with_config(
    endpoint: SocketAddr,
    timeout: Option<Duration>,
    cancellation: &Cancellation,
    config: TcpSocketConfig,
) -> Result<Connection, ConnectionError> {
    validate_remote_endpoint(endpoint)?;

    let logger = Arc::clone(config.logger());
    logger.debug_with_fields("tcp connecting", &[("endpoint", &endpoint)]);

    let attempt = async {
        let socket = if endpoint.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }?;
        socket.connect(endpoint).await
    };
    let stream = match run_with_deadline(cancellation, timeout, op::CONNECT, attempt).await {
        Ok(stream) => stream,
        Err(err) => {
            logger.warn_with_fields("tcp connect failed", Some(&err), &[("endpoint", &endpoint)]);
            return Err(err);
        }
    };

    let connection = Connection::from_stream(stream, config)?;
    logger.debug_with_fields(
        "tcp connected",
        &[
            ("local", &connection.local_addr()),
            ("endpoint", &endpoint),
        ],
    );
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unspecified_endpoint_is_rejected_before_io() {
        let endpoint: SocketAddr = "0.0.0.0:9".parse().expect("addr");
        let err = connect(endpoint, None, &Cancellation::new())
            .await
            .expect_err("invalid endpoint");
        assert!(matches!(err, ConnectionError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn invalid_endpoint_wins_over_cancellation() {
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let endpoint: SocketAddr = "127.0.0.1:0".parse().expect("addr");
        let err = connect(endpoint, Some(Duration::ZERO), &cancellation)
            .await
            .expect_err("invalid endpoint");
        assert!(matches!(err, ConnectionError::InvalidArgument { .. }));
    }
}
