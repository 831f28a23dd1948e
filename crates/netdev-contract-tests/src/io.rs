//! 数据完整性与缓冲区安全用例。

use std::time::Duration;

use anyhow::{Context, ensure};
use futures::FutureExt;
use netdev::{Conn, Deadline};
use rand::RngCore;
use tokio::task::JoinSet;

use crate::case::{CaseFuture, Session};
use crate::pair::DynConn;
use crate::support::{
    DEFAULT_CHUNK, discard, flood, join_all, read_full, read_to_end, seeded_rng, write_all,
};

const BASIC_IO_BYTES: usize = 1 << 20;
const PING_PONG_SENTINEL: u64 = 1000;
const RACY_WORKERS: usize = 10;
const RACY_ITERATIONS: usize = 100;
const RACY_DEADLINE: Duration = Duration::from_millis(1);

pub(crate) fn basic_io(session: Session) -> CaseFuture {
    run_basic_io(session).boxed()
}

pub(crate) fn ping_pong(session: Session) -> CaseFuture {
    run_ping_pong(session).boxed()
}

pub(crate) fn racy_read(session: Session) -> CaseFuture {
    run_racy_read(session).boxed()
}

pub(crate) fn racy_write(session: Session) -> CaseFuture {
    run_racy_write(session).boxed()
}

/// 1 MiB 伪随机数据按块从 `c1` 写入，`c2` 读到流结束后逐字节比对。
async fn run_basic_io(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    let mut want = vec![0u8; BASIC_IO_BYTES];
    seeded_rng().fill_bytes(&mut want);

    let writer = async {
        for piece in want.chunks(chunk) {
            write_all(c1.as_ref(), piece).await.context("c1 write")?;
        }
        c1.close().context("c1 close")?;
        anyhow::Ok(())
    };
    let reader = async {
        let got = read_to_end(c2.as_ref(), chunk).await.context("c2 read")?;
        c2.close().context("c2 close")?;
        anyhow::Ok(got)
    };
    let ((), got) = tokio::try_join!(writer, reader)?;

    ensure!(
        got == want,
        "transmitted data differs: received {} of {} bytes",
        got.len(),
        want.len()
    );
    Ok(())
}

async fn ping_ponger(conn: DynConn) -> anyhow::Result<()> {
    let mut buf = [0u8; 8];
    let mut prev = 0u64;
    while read_full(conn.as_ref(), &mut buf).await? {
        let value = u64::from_le_bytes(buf);
        ensure!(
            prev == 0 || prev + 2 == value,
            "mismatching value: got {value}, want {}",
            prev + 2
        );
        prev = value;
        if value == PING_PONG_SENTINEL {
            break;
        }
        write_all(conn.as_ref(), &(value + 1).to_le_bytes())
            .await
            .context("write")?;
    }
    conn.close().context("close")?;
    Ok(())
}

/// 两端交替回送递增的 8 字节小端计数器，直到哨兵值。
async fn run_ping_pong(session: Session) -> anyhow::Result<()> {
    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();
    workers.spawn(ping_ponger(session.c1.clone()));
    workers.spawn(ping_ponger(session.c2.clone()));

    write_all(session.c1.as_ref(), &0u64.to_le_bytes())
        .await
        .context("c1 initial write")?;
    join_all(workers).await
}

/// 读在极短截止时间下反复超时，返回后立即改写读缓冲区。
async fn run_racy_read(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    let mut background = JoinSet::new();
    background.spawn(async move { flood(c2.as_ref(), chunk).await });

    c1.set_read_deadline(Deadline::after(RACY_DEADLINE))?;
    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();
    for _ in 0..RACY_WORKERS {
        let c1 = c1.clone();
        workers.spawn(async move {
            let mut b1 = vec![0u8; DEFAULT_CHUNK];
            let b2 = vec![0u8; DEFAULT_CHUNK];
            for _ in 0..RACY_ITERATIONS {
                let result = c1.read(&mut b1).await;
                b1.copy_from_slice(&b2);
                if let Err(error) = result {
                    ensure!(error.is_timeout(), "unexpected read error: {error}");
                    c1.set_read_deadline(Deadline::after(RACY_DEADLINE))?;
                }
            }
            Ok(())
        });
    }
    join_all(workers).await
}

/// 写在极短截止时间下反复超时，返回后立即改写写缓冲区。
async fn run_racy_write(session: Session) -> anyhow::Result<()> {
    let Session { c1, c2, chunk } = session;
    let mut background = JoinSet::new();
    background.spawn(async move { discard(c2.as_ref(), chunk).await });

    c1.set_write_deadline(Deadline::after(RACY_DEADLINE))?;
    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();
    for _ in 0..RACY_WORKERS {
        let c1 = c1.clone();
        workers.spawn(async move {
            let mut b1 = vec![0u8; DEFAULT_CHUNK];
            let b2 = vec![0u8; DEFAULT_CHUNK];
            for _ in 0..RACY_ITERATIONS {
                let result = c1.write(&b1).await;
                b1.copy_from_slice(&b2);
                if let Err(error) = result {
                    ensure!(error.is_timeout(), "unexpected write error: {error}");
                    c1.set_write_deadline(Deadline::after(RACY_DEADLINE))?;
                }
            }
            Ok(())
        });
    }
    join_all(workers).await
}
