//! 截止时间与关闭取消用例。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, ensure};
use futures::FutureExt;
use netdev::{Conn, Deadline};
use tokio::task::JoinSet;

use crate::case::{CaseFuture, Session};
use crate::support::{
    DEFAULT_CHUNK, check_timeout, discard, echo, flood, join_all, resync, roundtrip,
};

const SETTLE_DELAY: Duration = Duration::from_millis(100);

pub(crate) fn read_timeout(session: Session) -> CaseFuture {
    run_read_timeout(session).boxed()
}

pub(crate) fn write_timeout(session: Session) -> CaseFuture {
    run_write_timeout(session).boxed()
}

pub(crate) fn past_timeout(session: Session) -> CaseFuture {
    run_past_timeout(session).boxed()
}

pub(crate) fn present_timeout(session: Session) -> CaseFuture {
    run_present_timeout(session).boxed()
}

pub(crate) fn future_timeout(session: Session) -> CaseFuture {
    run_future_timeout(session).boxed()
}

pub(crate) fn close_timeout(session: Session) -> CaseFuture {
    run_close_timeout(session).boxed()
}

/// 读超时不影响写。
async fn run_read_timeout(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    let mut background = JoinSet::new();
    background.spawn(async move { discard(c2.as_ref(), chunk).await });

    c1.set_read_deadline(Deadline::Elapsed)?;
    check_timeout(c1.read(&mut [0u8; DEFAULT_CHUNK]).await).context("read")?;
    c1.write(&[0u8; DEFAULT_CHUNK])
        .await
        .context("write after read timeout")?;
    Ok(())
}

/// 写超时不影响读。
async fn run_write_timeout(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    let mut background = JoinSet::new();
    background.spawn(async move { flood(c2.as_ref(), chunk).await });

    c1.set_write_deadline(Deadline::Elapsed)?;
    check_timeout(c1.write(&[0u8; DEFAULT_CHUNK]).await).context("write")?;
    c1.read(&mut [0u8; DEFAULT_CHUNK])
        .await
        .context("read after write timeout")?;
    Ok(())
}

/// 已过期的截止时间令读写立即超时且不搬运任何字节，恢复后连接照常可用。
async fn run_past_timeout(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    let mut background = JoinSet::new();
    background.spawn(async move { echo(c2.as_ref(), chunk).await });

    roundtrip(c1.as_ref()).await.context("before deadline")?;

    c1.set_deadline(Deadline::Elapsed)?;
    check_timeout(c1.write(&[0u8; DEFAULT_CHUNK]).await).context("write")?;
    check_timeout(c1.read(&mut [0u8; DEFAULT_CHUNK]).await).context("read")?;

    roundtrip(c1.as_ref()).await.context("after deadline")?;
    Ok(())
}

/// 在读写阻塞期间由另一任务设置过期截止时间，阻塞中的调用随即超时，且不早于设置时刻。
async fn run_present_timeout(session: Session) -> anyhow::Result<()> {
    let c1 = session.c1;
    let deadline_set = Arc::new(AtomicBool::new(false));
    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();

    {
        let c1 = c1.clone();
        let deadline_set = deadline_set.clone();
        workers.spawn(async move {
            tokio::time::sleep(SETTLE_DELAY).await;
            deadline_set.store(true, Ordering::SeqCst);
            c1.set_read_deadline(Deadline::Elapsed)?;
            c1.set_write_deadline(Deadline::Elapsed)?;
            Ok(())
        });
    }
    {
        let c1 = c1.clone();
        let deadline_set = deadline_set.clone();
        workers.spawn(async move {
            check_timeout(c1.read(&mut [0u8; DEFAULT_CHUNK]).await).context("read")?;
            ensure!(
                deadline_set.load(Ordering::SeqCst),
                "read timed out before deadline was set"
            );
            Ok(())
        });
    }
    {
        let c1 = c1.clone();
        let deadline_set = deadline_set.clone();
        workers.spawn(async move {
            let buf = [0u8; DEFAULT_CHUNK];
            let error = loop {
                if let Err(error) = c1.write(&buf).await {
                    break error;
                }
            };
            check_timeout(Err(error)).context("write")?;
            ensure!(
                deadline_set.load(Ordering::SeqCst),
                "write timed out before deadline was set"
            );
            Ok(())
        });
    }
    join_all(workers).await
}

/// 设在不远将来的截止时间最终令先行开始的读写超时。
async fn run_future_timeout(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    c1.set_deadline(Deadline::after(SETTLE_DELAY))?;

    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();
    {
        let c1 = c1.clone();
        workers.spawn(async move {
            check_timeout(c1.read(&mut [0u8; DEFAULT_CHUNK]).await).context("read")
        });
    }
    {
        let c1 = c1.clone();
        workers.spawn(async move {
            let buf = [0u8; DEFAULT_CHUNK];
            let error = loop {
                if let Err(error) = c1.write(&buf).await {
                    break error;
                }
            };
            check_timeout(Err(error)).context("write")
        });
    }
    join_all(workers).await?;

    let mut background = JoinSet::new();
    background.spawn(async move { echo(c2.as_ref(), chunk).await });
    resync(&c1).await?;
    roundtrip(c1.as_ref()).await
}

/// 关闭连接立即打断阻塞中的读写。
async fn run_close_timeout(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    let mut background = JoinSet::new();
    background.spawn(async move { echo(c2.as_ref(), chunk).await });

    c1.set_deadline(Deadline::None)?;
    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();
    {
        let c1 = c1.clone();
        workers.spawn(async move {
            tokio::time::sleep(SETTLE_DELAY).await;
            let _ = c1.close();
            Ok(())
        });
    }
    {
        let c1 = c1.clone();
        workers.spawn(async move {
            let mut buf = [0u8; DEFAULT_CHUNK];
            while c1.read(&mut buf).await.is_ok() {}
            Ok(())
        });
    }
    {
        let c1 = c1.clone();
        workers.spawn(async move {
            let buf = [0u8; DEFAULT_CHUNK];
            while c1.write(&buf).await.is_ok() {}
            Ok(())
        });
    }
    join_all(workers).await
}
