//! 通过套接字层驱动内核后端：拨号、监听、数据报与选项。

use std::sync::Arc;
use std::time::Duration;

use netdev::{Conn, Dialer, ErrorKind, KeepAlive, Net, NetAddr};
use netdev_driver_tokio::TokioDriver;

fn kernel_net() -> (Net, TokioDriver) {
    let driver = TokioDriver::new();
    (Net::new(Arc::new(driver.clone())), driver)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_roundtrip_over_kernel_sockets() -> anyhow::Result<()> {
    let (net, driver) = kernel_net();
    let listener = net.listen("tcp4", "127.0.0.1:0").await?;
    let NetAddr::Stream(bound) = listener.local_addr() else {
        anyhow::bail!("listener address must be a stream address");
    };
    assert_ne!(bound.port(), 0);

    let server = {
        let listener = listener.clone();
        tokio::spawn(async move {
            let conn = listener.accept().await?;
            let mut buf = [0u8; 5];
            let n = conn.read(&mut buf).await?;
            conn.write(&buf[..n]).await?;
            conn.close()?;
            anyhow::Ok(())
        })
    };

    let client = net.dial("tcp", &bound.to_string()).await?;
    assert_eq!(client.write(b"hello").await?, 5);
    let mut buf = [0u8; 5];
    let mut filled = 0;
    while filled < buf.len() {
        let n = client.read(&mut buf[filled..]).await?;
        assert!(n > 0, "unexpected EOF");
        filled += n;
    }
    assert_eq!(&buf, b"hello");
    server.await??;

    // 对端关闭后读到流结束。
    assert_eq!(client.read(&mut buf).await?, 0);
    client.close()?;
    listener.close()?;
    assert_eq!(driver.live_handles(), 0);
    Ok(())
}

#[tokio::test]
async fn refused_dial_releases_the_handle() -> anyhow::Result<()> {
    let (net, driver) = kernel_net();
    // 先占用再释放一个端口，使其大概率无人监听。
    let port = {
        let listener = net.listen("tcp", "127.0.0.1:0").await?;
        let NetAddr::Stream(bound) = listener.local_addr() else {
            anyhow::bail!("listener address must be a stream address");
        };
        listener.close()?;
        bound.port()
    };

    let err = net
        .dial("tcp", &format!("127.0.0.1:{port}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
    assert_eq!(err.op(), "dial");
    assert_eq!(driver.live_handles(), 0);
    Ok(())
}

#[tokio::test]
async fn datagram_exchange_uses_ephemeral_port() -> anyhow::Result<()> {
    let (net, driver) = kernel_net();
    let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;

    let conn = net.dial("udp", &peer_addr.to_string()).await?;
    let NetAddr::Datagram(local) = conn.local_addr() else {
        anyhow::bail!("dialed datagram must report a datagram address");
    };
    assert!(local.port() >= 49152, "port {} outside ephemeral range", local.port());

    conn.write(b"ping").await?;
    let mut buf = [0u8; 16];
    let (n, from) = peer.recv_from(&mut buf).await?;
    assert_eq!(&buf[..n], b"ping");
    peer.send_to(b"pong", from).await?;

    let n = conn.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"pong");
    conn.close()?;
    assert_eq!(driver.live_handles(), 0);
    Ok(())
}

#[tokio::test]
async fn keep_alive_and_linger_apply_to_streams() -> anyhow::Result<()> {
    let (net, _driver) = kernel_net();
    let listener = net.listen("tcp", "127.0.0.1:0").await?;
    let NetAddr::Stream(bound) = listener.local_addr() else {
        anyhow::bail!("listener address must be a stream address");
    };

    let dialer = Dialer::new()
        .with_timeout(Duration::from_secs(5))
        .with_keep_alive(KeepAlive::Period(Duration::from_secs(30)));
    let target = bound.to_string();
    let (client, accepted) = tokio::join!(dialer.dial(&net, "tcp", &target), listener.accept());
    let client = client?;
    let accepted = accepted?;

    accepted.set_keep_alive(true)?;
    accepted.set_linger(Some(Duration::from_secs(1)))?;
    accepted.close()?;
    client.close()?;
    listener.close()?;
    Ok(())
}

fn needs_pair(_session: netdev_contract_tests::Session) -> netdev_contract_tests::CaseFuture {
    Box::pin(async { Err::<(), _>(anyhow::anyhow!("case must not run without a pair")) })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wildcard_listener_pair_fails_setup_instead_of_hanging() {
    use netdev_contract_tests::{CaseError, ListenerPairFactory, TckCase, run_case};

    // 监听方报告 0.0.0.0:port，拨号方把它当作通配远端拒绝。
    let (net, driver) = kernel_net();
    let factory = ListenerPairFactory::new(net, "tcp", "0.0.0.0:0");
    let case = TckCase {
        name: "needs_pair",
        run: needs_pair,
    };

    let err = tokio::time::timeout(
        Duration::from_secs(3),
        run_case(&factory, &case, Duration::from_millis(200)),
    )
    .await
    .expect("pair setup must fail fast")
    .unwrap_err();
    assert!(matches!(err, CaseError::Setup { .. }), "{err}");
    assert_eq!(driver.live_handles(), 0);
}
