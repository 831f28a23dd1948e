//! 关闭与截止时间：阻塞操作的打断、重复关闭与读写截止时间的独立性。

use std::sync::Arc;
use std::time::Duration;

use netdev::{Conn, Deadline, ErrorKind, Listener, Net, NetAddr, StreamSocket};
use netdev_driver_loopback::LoopbackDriver;

async fn pair() -> anyhow::Result<(Net, LoopbackDriver, Listener, Arc<dyn Conn>, StreamSocket)> {
    let driver = LoopbackDriver::new();
    let net = Net::new(Arc::new(driver.clone()));
    let listener = net.listen("tcp", "127.0.0.1:0").await?;
    let NetAddr::Stream(bound) = listener.local_addr() else {
        anyhow::bail!("listener must report a stream address");
    };
    let target = bound.to_string();
    let (client, server) = tokio::join!(net.dial("tcp", &target), listener.accept());
    Ok((net, driver, listener, client?, server?))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_unblocks_a_pending_read() -> anyhow::Result<()> {
    let (_net, _driver, _listener, client, _server) = pair().await?;
    let reader = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut buf = [0u8; 8];
            client.read(&mut buf).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.close()?;

    let err = tokio::time::timeout(Duration::from_secs(5), reader)
        .await?
        .expect("reader task panicked")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
    assert_eq!(err.op(), "read");
    Ok(())
}

#[tokio::test]
async fn second_close_and_late_calls_report_closed() -> anyhow::Result<()> {
    let (_net, driver, listener, client, server) = pair().await?;
    server.close()?;
    assert_eq!(server.close().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(
        server.set_deadline(Deadline::None).unwrap_err().kind(),
        ErrorKind::Closed
    );
    assert_eq!(server.set_keep_alive(true).unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(
        server.write(b"x").await.unwrap_err().kind(),
        ErrorKind::Closed
    );

    client.close()?;
    listener.close()?;
    assert_eq!(listener.close().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(driver.live_handles(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listener_close_unblocks_accept() -> anyhow::Result<()> {
    let net = Net::new(Arc::new(LoopbackDriver::new()));
    let listener = net.listen("tcp", "127.0.0.1:0").await?;
    let acceptor = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.accept().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    listener.close()?;

    let err = tokio::time::timeout(Duration::from_secs(5), acceptor)
        .await?
        .expect("accept task panicked")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn accept_deadline_expires() -> anyhow::Result<()> {
    let net = Net::new(Arc::new(LoopbackDriver::new()));
    let listener = net.listen("tcp", "127.0.0.1:0").await?;
    listener.set_deadline(Deadline::after(Duration::from_millis(50)))?;
    let err = listener.accept().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.op(), "accept");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn read_and_write_deadlines_are_independent() -> anyhow::Result<()> {
    let (_net, _driver, _listener, client, server) = pair().await?;

    client.set_read_deadline(Deadline::Elapsed)?;
    let err = client.read(&mut [0u8; 4]).await.unwrap_err();
    assert!(err.is_timeout());
    // 写方向不受读截止时间影响。
    assert_eq!(client.write(b"ok").await?, 2);
    let mut buf = [0u8; 4];
    let n = server.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"ok");

    // 清除截止时间后读恢复正常。
    client.set_read_deadline(Deadline::None)?;
    server.write(b"back").await?;
    let n = client.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"back");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn extending_a_deadline_reaches_a_blocked_read() -> anyhow::Result<()> {
    let (_net, _driver, _listener, client, server) = pair().await?;
    client.set_read_deadline(Deadline::after(Duration::from_millis(50)))?;

    let reader = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let n = client.read(&mut buf).await?;
            anyhow::Ok(buf[..n].to_vec())
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.set_read_deadline(Deadline::after(Duration::from_secs(10)))?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.write(b"late").await?;

    assert_eq!(reader.await??, b"late");
    Ok(())
}

#[tokio::test]
async fn half_close_is_unimplemented() -> anyhow::Result<()> {
    let (_net, _driver, _listener, _client, server) = pair().await?;
    let err = server.close_write().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unimplemented);
    Ok(())
}
