//! 用例共享的搬运与校验工具。

use anyhow::{Context, bail, ensure};
use netdev::{Conn, Deadline, OpError};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::task::JoinSet;

/// 批量搬运的块大小；面向报文的连接假定最大报文不小于该值。
pub const DEFAULT_CHUNK: usize = 1024;

const ROUNDTRIP_TEXT: &[u8] = b"Hello, world!";
const RESYNC_MARK: u8 = 0xff;

/// 以固定种子生成的伪随机字节源。
pub(crate) fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(0)
}

/// 循环写出整个缓冲区。
pub(crate) async fn write_all(conn: &dyn Conn, mut buf: &[u8]) -> Result<(), OpError> {
    while !buf.is_empty() {
        let n = conn.write(buf).await?;
        buf = &buf[n..];
    }
    Ok(())
}

/// 读满整个缓冲区；返回 `Ok(false)` 表示在读到任何字节之前遇到流结束。
pub(crate) async fn read_full(conn: &dyn Conn, buf: &mut [u8]) -> anyhow::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = conn.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            bail!("unexpected EOF after {filled} of {} bytes", buf.len());
        }
        filled += n;
    }
    Ok(true)
}

/// 从 `conn` 读到流结束，按块收集全部字节。
pub(crate) async fn read_to_end(conn: &dyn Conn, chunk: usize) -> Result<Vec<u8>, OpError> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// 把 `conn` 读到的数据原样写回，直到出错或流结束。
pub(crate) async fn echo(conn: &dyn Conn, chunk: usize) -> Result<(), OpError> {
    let mut buf = vec![0u8; chunk];
    loop {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        write_all(conn, &buf[..n]).await?;
    }
}

/// 持续丢弃 `conn` 读到的数据。
pub(crate) async fn discard(conn: &dyn Conn, chunk: usize) -> Result<(), OpError> {
    let mut buf = vec![0u8; chunk];
    while conn.read(&mut buf).await? > 0 {}
    Ok(())
}

/// 持续向 `conn` 写入伪随机数据，直到出错。
pub(crate) async fn flood(conn: &dyn Conn, chunk: usize) -> Result<(), OpError> {
    let mut rng = seeded_rng();
    let mut buf = vec![0u8; chunk];
    loop {
        rng.fill_bytes(&mut buf);
        write_all(conn, &buf).await?;
    }
}

/// 断言结果为超时错误。
pub(crate) fn check_timeout(result: Result<usize, OpError>) -> anyhow::Result<()> {
    match result {
        Err(error) if error.is_timeout() => Ok(()),
        Err(error) => bail!("want timeout error, got {error}"),
        Ok(n) => bail!("want timeout error, got {n} bytes transferred"),
    }
}

/// 向回显连接写入一段文本并读回比对。
pub(crate) async fn roundtrip(conn: &dyn Conn) -> anyhow::Result<()> {
    conn.set_deadline(Deadline::None)
        .context("roundtrip set_deadline")?;
    write_all(conn, ROUNDTRIP_TEXT)
        .await
        .context("roundtrip write")?;
    let mut buf = vec![0u8; ROUNDTRIP_TEXT.len()];
    ensure!(
        read_full(conn, &mut buf).await.context("roundtrip read")?,
        "roundtrip read hit EOF"
    );
    ensure!(
        buf == ROUNDTRIP_TEXT,
        "roundtrip data mismatch: got {:?}",
        String::from_utf8_lossy(&buf)
    );
    Ok(())
}

/// 让回显连接回到干净状态：写入一个标记字节，丢弃读到的数据直到标记恰好出现在块尾。
///
/// 前提是标记字节此刻不在线路上，也不在对端缓冲中。
pub(crate) async fn resync(conn: &crate::DynConn) -> anyhow::Result<()> {
    conn.set_deadline(Deadline::None)
        .context("resync set_deadline")?;
    let writer = {
        let conn = conn.clone();
        tokio::spawn(async move { write_all(conn.as_ref(), &[RESYNC_MARK]).await })
    };

    let mut buf = vec![0u8; DEFAULT_CHUNK];
    loop {
        let n = conn.read(&mut buf).await.context("resync read")?;
        ensure!(n > 0, "resync read hit EOF");
        if buf[..n].iter().position(|byte| *byte == RESYNC_MARK) == Some(n - 1) {
            break;
        }
    }
    writer
        .await
        .context("resync writer task")?
        .context("resync write")?;
    Ok(())
}

/// 等待全部工作任务结束，返回第一个失败。
pub(crate) async fn join_all(mut workers: JoinSet<anyhow::Result<()>>) -> anyhow::Result<()> {
    while let Some(joined) = workers.join_next().await {
        joined.context("worker task panicked")??;
    }
    Ok(())
}
