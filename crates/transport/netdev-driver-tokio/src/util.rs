use std::future::Future;
use std::io;

use netdev_transport::{CloseSignal, Deadline, NetError, OperationKind, map_io_error};

/// 在保留关闭/超时语义的前提下执行 IO Future。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - 截止时间已过期时立即返回超时，不轮询 `future`；句柄已关闭时立即返回 `Closed`；
/// - 否则三路竞速：关闭信号优先，其次截止时间，最后是 IO 结果；
/// - `future` 只在完成时产出结果，竞速失败时被丢弃，因此调用方只能传入取消安全的 IO。
pub(crate) async fn run_with_close<F, T>(
    closed: &CloseSignal,
    op: OperationKind,
    deadline: Deadline,
    future: F,
) -> Result<T, NetError>
where
    F: Future<Output = io::Result<T>>,
{
    if deadline.is_elapsed() {
        return Err(NetError::timeout(op));
    }
    if closed.is_closed() {
        return Err(NetError::closed(op));
    }

    let close = closed.closed();
    tokio::pin!(close);
    tokio::pin!(future);

    if let Some(instant) = deadline.instant() {
        let sleep = tokio::time::sleep_until(instant);
        tokio::pin!(sleep);
        tokio::select! {
            biased;
            _ = &mut close => Err(NetError::closed(op)),
            _ = &mut sleep => Err(NetError::timeout(op)),
            result = &mut future => result.map_err(|err| map_io_error(op, err)),
        }
    } else {
        tokio::select! {
            biased;
            _ = &mut close => Err(NetError::closed(op)),
            result = &mut future => result.map_err(|err| map_io_error(op, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_over_pending_io() {
        let closed = CloseSignal::new();
        let err = run_with_close(
            &closed,
            OperationKind::RECV,
            Deadline::after(Duration::from_millis(20)),
            std::future::pending::<io::Result<()>>(),
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn closed_signal_short_circuits() {
        let closed = CloseSignal::new();
        closed.close();
        let err = run_with_close(
            &closed,
            OperationKind::SEND,
            Deadline::None,
            async { Ok::<_, io::Error>(1usize) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), netdev_transport::ErrorKind::Closed);
    }

    #[tokio::test]
    async fn io_errors_are_mapped() {
        let closed = CloseSignal::new();
        let err = run_with_close(
            &closed,
            OperationKind::CONNECT,
            Deadline::None,
            async { Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionRefused)) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), netdev_transport::ErrorKind::ConnectionRefused);
    }
}
