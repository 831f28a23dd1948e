//! “would block” 型后端的挂起原语。
//!
//! 只暴露非阻塞原语的后端（事件驱动、preview-2 风格的套接字 API、内存管道）需要在内部反复尝试，
//! 直到就绪或截止时间到期。这里把“尝试 + 挂起”收敛为一个函数：挂起点落在 Tokio 的 `Notify`
//! 上，由数据生产方显式唤醒，不使用固定间隔的睡眠轮询。

use std::task::Poll;

use tokio::sync::Notify;

use crate::deadline::Deadline;
use crate::error::{NetError, OperationKind};

/// 反复执行 `attempt` 直到其就绪，期间在 `notify` 上挂起。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - 截止时间已过期时立即返回超时，不调用 `attempt`；
/// - `attempt` 返回 `Poll::Pending` 表示“would block”，返回 `Poll::Ready` 即结束等待；
/// - 生产方在状态变化后调用 `notify.notify_waiters()`；
/// - 返回的 future 可在任意 `.await` 点被安全丢弃，`attempt` 自身须保证单次调用的原子性。
///
/// ## 逻辑（How）
/// 1. 每轮先创建 `Notified` 并 `enable()` 登记兴趣，再执行 `attempt`，
///    保证“尝试失败之后、挂起之前”发生的唤醒不会丢失；
/// 2. 有截止时间时用 `timeout_at` 包裹挂起，到期返回超时；
/// 3. 被唤醒后回到第 1 步，虚假唤醒只会多一次尝试。
pub async fn wait_until<T, F>(
    op: OperationKind,
    deadline: Deadline,
    notify: &Notify,
    mut attempt: F,
) -> Result<T, NetError>
where
    F: FnMut() -> Poll<Result<T, NetError>>,
{
    loop {
        if deadline.is_elapsed() {
            return Err(NetError::timeout(op));
        }

        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Poll::Ready(result) = attempt() {
            return result;
        }

        match deadline.instant() {
            None => notified.await,
            Some(instant) => {
                if tokio::time::timeout_at(instant, notified).await.is_err() {
                    return Err(NetError::timeout(op));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn elapsed_deadline_returns_without_attempting() {
        let notify = Notify::new();
        let attempts = AtomicUsize::new(0);
        let err = wait_until(OperationKind::RECV, Deadline::Elapsed, &notify, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(1usize))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_attempt_times_out_at_deadline() {
        let notify = Notify::new();
        let started = tokio::time::Instant::now();
        let err = wait_until::<usize, _>(
            OperationKind::SEND,
            Deadline::after(Duration::from_millis(50)),
            &notify,
            || Poll::Pending,
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn notification_drives_a_new_attempt() {
        let notify = Arc::new(Notify::new());
        let ready = Arc::new(AtomicUsize::new(0));

        let producer = {
            let notify = Arc::clone(&notify);
            let ready = Arc::clone(&ready);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ready.store(7, Ordering::SeqCst);
                notify.notify_waiters();
            })
        };

        let value = wait_until(OperationKind::RECV, Deadline::None, &notify, || {
            match ready.load(Ordering::SeqCst) {
                0 => Poll::Pending,
                n => Poll::Ready(Ok(n)),
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        producer.await.unwrap();
    }
}
