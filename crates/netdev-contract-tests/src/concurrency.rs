//! 并发方法调用用例。

use std::time::Duration;

use futures::FutureExt;
use netdev::{Conn, Deadline};
use tokio::task::JoinSet;

use crate::case::{CaseFuture, Session};
use crate::support::{DEFAULT_CHUNK, echo, join_all, resync, roundtrip};

const ROUNDS: usize = 100;
const SHORT_DEADLINE: Duration = Duration::from_millis(10);

pub(crate) fn concurrent_methods(session: Session) -> CaseFuture {
    run_concurrent_methods(session).boxed()
}

/// 100 轮并发调用全部方法，结果可以无意义，但不得崩溃或死锁；之后连接仍可正常往返。
async fn run_concurrent_methods(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    let mut background = JoinSet::new();
    background.spawn(async move { echo(c2.as_ref(), chunk).await });

    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();
    for _ in 0..ROUNDS {
        let c = c1.clone();
        workers.spawn(async move {
            let _ = c.read(&mut [0u8; DEFAULT_CHUNK]).await;
            Ok(())
        });
        let c = c1.clone();
        workers.spawn(async move {
            let _ = c.write(&[0u8; DEFAULT_CHUNK]).await;
            Ok(())
        });
        let c = c1.clone();
        workers.spawn(async move {
            let _ = c.set_deadline(Deadline::after(SHORT_DEADLINE));
            Ok(())
        });
        let c = c1.clone();
        workers.spawn(async move {
            let _ = c.set_read_deadline(Deadline::Elapsed);
            Ok(())
        });
        let c = c1.clone();
        workers.spawn(async move {
            let _ = c.set_write_deadline(Deadline::Elapsed);
            Ok(())
        });
        let c = c1.clone();
        workers.spawn(async move {
            let _ = c.local_addr();
            Ok(())
        });
        let c = c1.clone();
        workers.spawn(async move {
            let _ = c.remote_addr();
            Ok(())
        });
    }
    join_all(workers).await?;

    resync(&c1).await?;
    roundtrip(c1.as_ref()).await
}
