//! 取消契约：可等待的取消令牌，以及区分“释放”与“调用方”两个来源的组合视图。

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// 取消原语，统一表达跨模块的可中断性契约。
///
/// # 设计背景（Why）
/// - 阻塞中的 `accept`/`read`/`connect` 必须能被外部及时打断，否则释放流程会被
///   一个永不返回的系统调用拖住；
/// - 仅靠原子位需要轮询，因此内部同时持有 [`CancellationToken`]，让等待方可以直接
///   `await` 取消事件。
///
/// # 逻辑解析（How）
/// - `flag` 记录“首次取消”的归属：`cancel` 通过 CAS 决定唯一的胜出者；
/// - `token` 负责唤醒所有正在等待 [`Cancellation::cancelled`] 的任务；
/// - `child` 返回共享同一状态的克隆，便于在不同子系统传播。
///
/// # 契约说明（What）
/// - **前置条件**：无，默认处于“未取消”状态；
/// - **后置条件**：一旦 `cancel` 成功，`is_cancelled` 全局可见，所有等待者被唤醒。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
    token: CancellationToken,
}

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 将当前令牌标记为取消。
    ///
    /// 返回 `true` 表示本次调用首次触发取消；返回 `false` 表示之前已被取消。
    pub fn cancel(&self) -> bool {
        let first = self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.token.cancel();
        }
        first
    }

    /// 派生共享同一状态的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }

    /// 等待取消发生；若已取消则立即完成。
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + '_ {
        self.inner.token.cancelled()
    }
}

/// 标识一次中断来自哪个取消源。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelSource {
    /// 对象自身的释放流程触发。
    Disposal,
    /// 调用方传入的令牌触发。
    External,
}

/// “释放令牌 + 调用方令牌”的组合视图。
///
/// # 设计背景（Why）
/// - 接收循环因**本地释放**结束应视为正常完成，因**调用方取消**结束则需显式告知；
///   两个取消源必须保持可区分，不能合并成单一令牌。
///
/// # 契约说明（What）
/// - [`fired`](Self::fired) 在两者都已取消时优先报告 [`CancelSource::Disposal`]，
///   与传输层 `select!` 的 `biased` 顺序保持一致。
#[derive(Clone, Debug)]
pub struct LinkedCancellation {
    disposal: Cancellation,
    external: Cancellation,
}

impl LinkedCancellation {
    /// 组合两个取消源。
    pub fn new(disposal: Cancellation, external: Cancellation) -> Self {
        Self { disposal, external }
    }

    /// 释放令牌。
    pub fn disposal(&self) -> &Cancellation {
        &self.disposal
    }

    /// 调用方令牌。
    pub fn external(&self) -> &Cancellation {
        &self.external
    }

    /// 返回已触发的取消源；都未触发时返回 `None`。
    pub fn fired(&self) -> Option<CancelSource> {
        if self.disposal.is_cancelled() {
            Some(CancelSource::Disposal)
        } else if self.external.is_cancelled() {
            Some(CancelSource::External)
        } else {
            None
        }
    }
}
