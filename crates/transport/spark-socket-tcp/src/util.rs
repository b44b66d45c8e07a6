use crate::error::{ConnectionError, cancelled_error, map_io_error, timeout_error};
use spark_socket_core::{CancelSource, Cancellation, LinkedCancellation};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// 一次竞速的结果：IO 先完成，或某个取消源先触发。
pub(crate) enum Raced<T> {
    Completed(T),
    Interrupted(CancelSource),
}

/// 让 `future` 与“释放令牌 + 调用方令牌”竞速。
///
/// 释放令牌排在最前，使本地释放与调用方取消同时发生时总按释放处理。
pub(crate) async fn race<F>(linked: &LinkedCancellation, future: F) -> Raced<F::Output>
where
    F: Future,
{
    if let Some(source) = linked.fired() {
        return Raced::Interrupted(source);
    }
    tokio::select! {
        biased;
        _ = linked.disposal().cancelled() => Raced::Interrupted(CancelSource::Disposal),
        _ = linked.external().cancelled() => Raced::Interrupted(CancelSource::External),
        output = future => Raced::Completed(output),
    }
}

/// 在保留取消/超时语义的前提下执行 IO Future。
///
/// `timeout` 为 `None` 表示不限时；`Some(Duration::ZERO)` 不做任何 IO，直接超时。
pub(crate) async fn run_with_deadline<F, T>(
    cancellation: &Cancellation,
    timeout: Option<Duration>,
    operation: &'static str,
    future: F,
) -> Result<T, ConnectionError>
where
    F: Future<Output = io::Result<T>>,
{
    if cancellation.is_cancelled() {
        return Err(cancelled_error(operation));
    }

    match timeout {
        Some(limit) if limit.is_zero() => Err(timeout_error(operation)),
        Some(limit) => {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => Err(cancelled_error(operation)),
                _ = tokio::time::sleep(limit) => Err(timeout_error(operation)),
                result = future => result.map_err(|err| map_io_error(operation, err)),
            }
        }
        None => {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => Err(cancelled_error(operation)),
                result = future => result.map_err(|err| map_io_error(operation, err)),
            }
        }
    }
}

/// 拒绝无法作为连接目标的地址。
pub(crate) fn validate_remote_endpoint(endpoint: SocketAddr) -> Result<(), ConnectionError> {
    if endpoint.ip().is_unspecified() {
        return Err(ConnectionError::InvalidArgument {
            reason: "remote endpoint address is unspecified",
        });
    }
    if endpoint.port() == 0 {
        return Err(ConnectionError::InvalidArgument {
            reason: "remote endpoint port is zero",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_and_zero_port_are_rejected() {
        let any: SocketAddr = "0.0.0.0:80".parse().expect("addr");
        let zero: SocketAddr = "127.0.0.1:0".parse().expect("addr");
        let ok: SocketAddr = "[::1]:8080".parse().expect("addr");
        assert!(validate_remote_endpoint(any).is_err());
        assert!(validate_remote_endpoint(zero).is_err());
        assert!(validate_remote_endpoint(ok).is_ok());
    }

    #[tokio::test]
    async fn disposal_wins_when_both_sources_fired() {
        let disposal = Cancellation::new();
        let external = Cancellation::new();
        disposal.cancel();
        external.cancel();
        let linked = LinkedCancellation::new(disposal, external);
        let raced = race(&linked, std::future::pending::<()>()).await;
        assert!(matches!(raced, Raced::Interrupted(CancelSource::Disposal)));
    }

    #[tokio::test]
    async fn pending_io_yields_to_external_cancellation() {
        let linked = LinkedCancellation::new(Cancellation::new(), Cancellation::new());
        let trigger = linked.external().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let raced = race(&linked, std::future::pending::<()>()).await;
        assert!(matches!(raced, Raced::Interrupted(CancelSource::External)));
    }

    #[tokio::test]
    async fn zero_timeout_fails_even_for_ready_io() {
        let result = run_with_deadline(
            &Cancellation::new(),
            Some(Duration::ZERO),
            "probe",
            std::future::ready(Ok::<(), io::Error>(())),
        )
        .await;
        assert!(matches!(result, Err(ConnectionError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn cancellation_is_checked_before_timeout() {
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let result = run_with_deadline(
            &cancellation,
            Some(Duration::ZERO),
            "probe",
            std::future::ready(Ok::<(), io::Error>(())),
        )
        .await;
        assert!(matches!(result, Err(ConnectionError::Cancelled { .. })));
    }
}
