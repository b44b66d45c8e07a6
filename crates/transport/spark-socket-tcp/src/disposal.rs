//! 释放协调器：保证“任意多次、任意并发的释放调用”只执行一次真实拆除。
//!
//! # 教案级说明
//!
//! ## 意图（Why）
//! - 连接与监听器会被多个任务同时持有：接收循环、发送方、监听器的级联释放都可能
//!   同时调用 `dispose`；物理关闭必须恰好发生一次，且所有调用者都要等到它真正完成。
//!
//! ## 逻辑（How）
//! 1. 原子状态 `Active(0) → DisposeRequested(1) → Disposed(2)`，CAS 胜出者负责拆除；
//! 2. 胜出者先触发释放令牌，使所有阻塞中的 `read`/`accept`/`write` 立即让出；
//! 3. 拆除过程在独立任务中运行，发起者被丢弃也不会让其他等待者悬挂；
//! 4. 结果通过 `tokio::sync::watch` 广播；发布动作放在 `Drop` 守卫中，拆除 panic 或
//!    运行时关闭时同样会发布 [`DisposeOutcome::Aborted`]。
//!
//! ## 契约（What）
//! - `dispose_with` 从不返回错误；N 次调用得到 N 个相同的 [`DisposeOutcome`]；
//! - 必须在 Tokio 运行时中调用。

use spark_socket_core::Cancellation;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;

const ACTIVE: u8 = 0;
const DISPOSE_REQUESTED: u8 = 1;
const DISPOSED: u8 = 2;

/// 释放状态快照。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisposalState {
    /// 尚未请求释放。
    Active,
    /// 拆除进行中。
    DisposeRequested,
    /// 拆除已完成。
    Disposed,
}

/// 一次释放的最终结果，所有调用者观察到同一个值。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisposeOutcome {
    /// 完成优雅关闭：已发送 FIN 并确认对端 EOF（监听器则为所有连接均已释放）。
    Graceful,
    /// 未能在时限内确认对端 EOF，套接字被强制关闭。
    Forced,
    /// 释放时连接已经断开，只回收了资源。
    NotConnected,
    /// 拆除过程被中断（panic 或运行时关闭）。
    Aborted,
}

struct DisposalShared {
    state: AtomicU8,
    token: Cancellation,
    outcome: watch::Sender<Option<DisposeOutcome>>,
}

/// 幂等、无竞态的释放协调器。
#[derive(Clone)]
pub struct DisposalCoordinator {
    shared: Arc<DisposalShared>,
}

impl DisposalCoordinator {
    /// 创建处于 `Active` 状态的协调器。
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            shared: Arc::new(DisposalShared {
                state: AtomicU8::new(ACTIVE),
                token: Cancellation::new(),
                outcome,
            }),
        }
    }

    /// 释放令牌：释放开始时由胜出者触发。
    pub fn token(&self) -> &Cancellation {
        &self.shared.token
    }

    /// 当前状态。
    pub fn state(&self) -> DisposalState {
        match self.shared.state.load(Ordering::Acquire) {
            ACTIVE => DisposalState::Active,
            DISPOSE_REQUESTED => DisposalState::DisposeRequested,
            _ => DisposalState::Disposed,
        }
    }

    /// 是否已开始释放。
    pub fn is_disposed(&self) -> bool {
        self.state() != DisposalState::Active
    }

    /// 请求释放；首个调用者在独立任务中运行 `teardown`，所有调用者等待同一个结果。
    pub async fn dispose_with<F, Fut>(&self, teardown: F) -> DisposeOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DisposeOutcome> + Send + 'static,
    {
        let receiver = self.shared.outcome.subscribe();
        if self
            .shared
            .state
            .compare_exchange(ACTIVE, DISPOSE_REQUESTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.shared.token.cancel();
            let guard = PublishGuard {
                shared: Arc::clone(&self.shared),
                outcome: DisposeOutcome::Aborted,
            };
            let work = teardown();
            tokio::spawn(async move {
                // 整个守卫移入任务，只捕获字段会让守卫在这里提前析构。
                let mut guard = guard;
                guard.outcome = work.await;
            });
        }
        wait_for_outcome(receiver).await
    }

    /// 等待释放完成；尚未请求释放时会一直等待。
    pub async fn disposed(&self) -> DisposeOutcome {
        wait_for_outcome(self.shared.outcome.subscribe()).await
    }
}

impl Default for DisposalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DisposalCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposalCoordinator")
            .field("state", &self.state())
            .finish()
    }
}

async fn wait_for_outcome(mut receiver: watch::Receiver<Option<DisposeOutcome>>) -> DisposeOutcome {
    match receiver.wait_for(Option::is_some).await {
        Ok(published) => (*published).unwrap_or(DisposeOutcome::Aborted),
        Err(_) => DisposeOutcome::Aborted,
    }
}

/// 拆除任务结束（含 panic 展开与任务被丢弃）时发布结果。
struct PublishGuard {
    shared: Arc<DisposalShared>,
    outcome: DisposeOutcome,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        self.shared.state.store(DISPOSED, Ordering::Release);
        self.shared.outcome.send_replace(Some(self.outcome));
    }
}
