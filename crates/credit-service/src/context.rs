//! 请求上下文
//!
//! 携带调用方的取消信号与截止时间，贯穿仓储调用和任务提交。
//! 取消信号基于 `watch` channel，截止时间基于 tokio 时钟（测试中可暂停推进）。

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{CreditError, Result};

/// 请求上下文
///
/// Clone 代价很低，所有克隆共享同一个取消信号。
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// 取消句柄
///
/// drop 句柄不会触发取消。
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl RequestContext {
    /// 既不会取消也不会超时的上下文
    pub fn background() -> Self {
        Self::default()
    }

    /// 与调用方生命周期脱钩的上下文
    ///
    /// worker 执行已入队任务时使用，调用方放弃等待不会中断已开始的处理。
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// 可手动取消的上下文
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: Some(rx),
            },
            CancelHandle { tx },
        )
    }

    /// 在当前上下文基础上收紧截止时间，保留取消信号
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            deadline: Some(self.deadline.map_or(candidate, |d| d.min(candidate))),
            cancel: self.cancel.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 立即检查上下文是否已结束
    pub fn err(&self) -> Option<CreditError> {
        if let Some(rx) = &self.cancel
            && *rx.borrow()
        {
            return Some(CreditError::Canceled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Some(CreditError::DeadlineExceeded);
        }
        None
    }

    /// 同 `err`，以 Result 形式返回便于 `?`
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 等待上下文结束并返回原因
    ///
    /// 既没有截止时间也没有取消信号时永远不会完成。
    pub async fn done(&self) -> CreditError {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let canceled = async {
            if let Some(mut rx) = self.cancel.clone() {
                let fired = rx.wait_for(|canceled| *canceled).await.is_ok();
                if fired {
                    return;
                }
            }
            // 句柄已 drop 且从未取消
            std::future::pending::<()>().await
        };

        tokio::select! {
            biased;
            _ = canceled => CreditError::Canceled,
            _ = deadline => CreditError::DeadlineExceeded,
        }
    }

    /// 在上下文约束下执行 future，上下文先结束时丢弃该 future
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_background_never_finishes() {
        let ctx = RequestContext::background();
        assert!(ctx.err().is_none());

        let mut done = tokio_test::task::spawn(ctx.done());
        assert_pending!(done.poll());
    }

    #[tokio::test]
    async fn test_cancel_handle() {
        let (ctx, handle) = RequestContext::with_cancel();
        let mut done = tokio_test::task::spawn(ctx.done());
        assert_pending!(done.poll());

        handle.cancel();
        assert!(done.is_woken());
        let err = assert_ready!(done.poll());
        assert!(matches!(err, CreditError::Canceled));
        assert!(matches!(ctx.err(), Some(CreditError::Canceled)));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = RequestContext::with_cancel();
        drop(handle);
        assert!(ctx.err().is_none());

        let mut done = tokio_test::task::spawn(ctx.done());
        assert_pending!(done.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        assert!(ctx.err().is_none());

        let err = ctx.done().await;
        assert!(matches!(err, CreditError::DeadlineExceeded));
        assert!(matches!(ctx.check(), Err(CreditError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_deadline_and_cancel() {
        let (parent, handle) = RequestContext::with_cancel();
        let parent = parent.child_with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        handle.cancel();
        assert!(matches!(child.err(), Some(CreditError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_aborts_slow_future() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(10));
        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CreditError::DeadlineExceeded)));

        let quick = RequestContext::background().run(async { Ok(7) }).await;
        assert_eq!(quick.unwrap(), 7);
    }
}
