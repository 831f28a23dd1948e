use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use netdev_transport::{
    AddressFamily, ConfigError, Deadline, EndpointAddr, EphemeralPorts, ErrorKind, Handle, HostSpec, IpVersion,
    NetAddr, NetConfig, NetDriver, NetError, Network, NopDriver, OperationKind, Protocol,
    SocketKind, parse_endpoint,
};
use tracing::{debug, warn};

use crate::conn::{Conn, SocketCore};
use crate::datagram::DatagramSocket;
use crate::error::OpError;
use crate::listener::Listener;
use crate::stream::StreamSocket;

/// 套接字层的能力对象：后端 + 配置 + 临时端口分配器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 后端以显式参数注入，而不是进程级可变全局量：同一进程可以并存多个后端，
///   测试可以直接构造基于内存后端的 `Net`；
/// - 所有拨号、监听、地址解析都从这里出发，保证它们看到同一份配置。
///
/// ## 契约（What）
/// - [`Net::dial`]/[`Net::listen`] 只接受流与数据报两类网络名；原始 IP 与 Unix 网络返回
///   `Unimplemented`，无法识别的网络名返回 `UnknownNetwork`，两种情况都不会创建任何句柄；
/// - 拨号或监听流程中任一步失败时，已创建的句柄在返回错误之前被关闭。
///
/// ## 逻辑（How）
/// - 内部以 `Arc` 共享，克隆成本为一次引用计数递增。
#[derive(Clone)]
pub struct Net {
    inner: Arc<NetInner>,
}

struct NetInner {
    driver: Arc<dyn NetDriver>,
    config: NetConfig,
    ports: EphemeralPorts,
}

/// 解析结果：端点地址与需要转交给后端 `connect` 的主机名（字面量地址为空）。
#[derive(Clone, Debug)]
pub(crate) struct Resolved {
    pub(crate) endpoint: EndpointAddr,
    pub(crate) host: String,
}

impl Net {
    pub fn new(driver: Arc<dyn NetDriver>) -> Self {
        Self::from_parts(driver, NetConfig::default())
    }

    /// 以自定义配置构造；配置先经过 [`NetConfig::validate`]，与从 TOML 加载时同样严格。
    pub fn with_config(driver: Arc<dyn NetDriver>, config: NetConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(driver, config))
    }

    fn from_parts(driver: Arc<dyn NetDriver>, config: NetConfig) -> Self {
        let ports = EphemeralPorts::new(config.ephemeral_ports);
        Self {
            inner: Arc::new(NetInner {
                driver,
                config,
                ports,
            }),
        }
    }

    /// 未安装后端时使用的实例，所有操作都返回“no transport configured”。
    pub fn unconfigured() -> Self {
        Self::new(Arc::new(NopDriver))
    }

    pub fn driver(&self) -> &Arc<dyn NetDriver> {
        &self.inner.driver
    }

    pub fn config(&self) -> &NetConfig {
        &self.inner.config
    }

    /// 以默认 [`Dialer`] 拨号。
    pub async fn dial(&self, network: &str, address: &str) -> Result<Arc<dyn Conn>, OpError> {
        Dialer::new().dial(self, network, address).await
    }

    /// 拨号，名称解析与连接建立共享 `timeout`。
    pub async fn dial_timeout(
        &self,
        network: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn Conn>, OpError> {
        Dialer::new()
            .with_timeout(timeout)
            .dial(self, network, address)
            .await
    }

    /// 在本地地址上监听流式连接。
    pub async fn listen(&self, network: &str, address: &str) -> Result<Listener, OpError> {
        let parsed = Network::parse(network).map_err(|error| OpError::new("listen", network, error))?;
        match parsed {
            Network::Tcp(_) => {}
            Network::Udp(_) => {
                return Err(OpError::new(
                    "listen",
                    network,
                    NetError::unimplemented("listening on datagram networks"),
                ));
            }
            Network::Ip { .. } | Network::Unix(_) => {
                return Err(OpError::new(
                    "listen",
                    network,
                    NetError::unimplemented("listening on raw IP or unix networks"),
                ));
            }
        }

        let resolved = self
            .resolve_endpoint(parsed, address)
            .await
            .map_err(|error| OpError::new("listen", network, error))?;
        self.listen_stream(parsed, resolved.endpoint)
    }

    /// 解析流式网络地址。
    pub async fn resolve_stream_addr(
        &self,
        network: &str,
        address: &str,
    ) -> Result<EndpointAddr, NetError> {
        match Network::parse(network)? {
            parsed @ Network::Tcp(_) => Ok(self.resolve_endpoint(parsed, address).await?.endpoint),
            _ => Err(NetError::unknown_network(network)),
        }
    }

    /// 解析数据报网络地址。
    pub async fn resolve_datagram_addr(
        &self,
        network: &str,
        address: &str,
    ) -> Result<EndpointAddr, NetError> {
        match Network::parse(network)? {
            parsed @ Network::Udp(_) => Ok(self.resolve_endpoint(parsed, address).await?.endpoint),
            _ => Err(NetError::unknown_network(network)),
        }
    }

    /// 原始 IP 地址解析，当前未实现。
    pub async fn resolve_ip_addr(&self, network: &str, _address: &str) -> Result<NetAddr, NetError> {
        match Network::parse(network)? {
            Network::Ip { .. } => Err(NetError::unimplemented("resolving raw IP addresses")),
            _ => Err(NetError::unknown_network(network)),
        }
    }

    /// Unix 域地址解析，当前未实现。
    pub fn resolve_unix_addr(&self, network: &str, _address: &str) -> Result<NetAddr, NetError> {
        match Network::parse(network)? {
            Network::Unix(_) => Err(NetError::unimplemented("unix domain sockets")),
            _ => Err(NetError::unknown_network(network)),
        }
    }

    /// 以已解析的端点建立流式连接。
    pub async fn dial_stream(
        &self,
        network: &str,
        local: Option<EndpointAddr>,
        remote: EndpointAddr,
        deadline: Deadline,
    ) -> Result<StreamSocket, OpError> {
        let parsed = match Network::parse(network) {
            Ok(parsed @ Network::Tcp(_)) => parsed,
            Ok(_) => return Err(OpError::new("dial", network, NetError::unknown_network(network))),
            Err(error) => return Err(OpError::new("dial", network, error)),
        };
        self.connect_stream(parsed, local, remote, "", deadline).await
    }

    /// 以已解析的端点建立数据报连接；未指定本地端口时分配临时端口。
    pub async fn dial_datagram(
        &self,
        network: &str,
        local: Option<EndpointAddr>,
        remote: EndpointAddr,
        deadline: Deadline,
    ) -> Result<DatagramSocket, OpError> {
        let parsed = match Network::parse(network) {
            Ok(parsed @ Network::Udp(_)) => parsed,
            Ok(_) => return Err(OpError::new("dial", network, NetError::unknown_network(network))),
            Err(error) => return Err(OpError::new("dial", network, error)),
        };
        self.connect_datagram(parsed, local, remote, "", deadline).await
    }

    pub(crate) async fn resolve_endpoint(
        &self,
        network: Network,
        address: &str,
    ) -> Result<Resolved, NetError> {
        let (host, port) = parse_endpoint(&network.to_string(), address)?;
        let version = network.version();
        match host {
            HostSpec::Wildcard => Ok(Resolved {
                endpoint: EndpointAddr::wildcard(port),
                host: String::new(),
            }),
            HostSpec::Literal { ip, zone } => {
                ensure_family(version, ip, address)?;
                let endpoint = EndpointAddr::new(ip, port);
                Ok(Resolved {
                    endpoint: match zone {
                        Some(zone) => endpoint.with_zone(zone),
                        None => endpoint,
                    },
                    host: String::new(),
                })
            }
            HostSpec::Name(name) => {
                let ip = self
                    .inner
                    .driver
                    .resolve_host(&name)
                    .await
                    .map_err(|error| match error.kind() {
                        ErrorKind::NotConfigured | ErrorKind::Resolution | ErrorKind::Timeout => {
                            error
                        }
                        _ => {
                            let wrapped = NetError::resolution(&name, &error);
                            wrapped.with_source(error)
                        }
                    })?;
                ensure_family(version, ip, address)?;
                debug!(host = %name, %ip, "resolved host name");
                Ok(Resolved {
                    endpoint: EndpointAddr::new(ip, port),
                    host: name,
                })
            }
        }
    }

    pub(crate) async fn connect_stream(
        &self,
        network: Network,
        local: Option<EndpointAddr>,
        remote: EndpointAddr,
        host: &str,
        deadline: Deadline,
    ) -> Result<StreamSocket, OpError> {
        let driver = &self.inner.driver;
        let remote_addr = NetAddr::Stream(remote.clone());
        let fail = |error: NetError| {
            OpError::new("dial", network.to_string(), error).with_remote(remote_addr.clone())
        };

        let Some(ip) = remote.ip().filter(|ip| !ip.is_unspecified()) else {
            return Err(fail(NetError::wildcard_remote()));
        };

        let pending = driver
            .socket(AddressFamily::of(ip), SocketKind::Stream, Protocol::Tcp)
            .map(|handle| PendingHandle::new(driver, handle, "dial"))
            .map_err(fail)?;
        let handle = pending.handle();
        if let Some(local) = &local {
            driver.bind(handle, local.to_socket_addr(ip)).map_err(fail)?;
        }
        // 调用方在此处丢弃拨号 future 时，`pending` 负责关闭句柄。
        driver
            .connect(handle, host, remote.to_socket_addr(ip), deadline)
            .await
            .map_err(fail)?;

        let local_addr = self.bound_addr(handle, local).map_or(NetAddr::Unspecified, NetAddr::Stream);
        debug!(driver = driver.name(), %handle, local = %local_addr, remote = %remote_addr, "stream dialed");
        Ok(StreamSocket::new(SocketCore::new(
            Arc::clone(driver),
            pending.release(),
            network,
            local_addr,
            remote_addr,
        )))
    }

    pub(crate) async fn connect_datagram(
        &self,
        network: Network,
        local: Option<EndpointAddr>,
        remote: EndpointAddr,
        host: &str,
        deadline: Deadline,
    ) -> Result<DatagramSocket, OpError> {
        let driver = &self.inner.driver;
        let remote_addr = NetAddr::Datagram(remote.clone());
        let fail = |error: NetError| {
            OpError::new("dial", network.to_string(), error).with_remote(remote_addr.clone())
        };

        let Some(ip) = remote.ip().filter(|ip| !ip.is_unspecified()) else {
            return Err(fail(NetError::wildcard_remote()));
        };

        let mut local = local.unwrap_or_else(|| EndpointAddr::wildcard(0));
        if local.port() == 0 {
            local = local.with_port(self.inner.ports.next_port());
        }

        let pending = driver
            .socket(AddressFamily::of(ip), SocketKind::Datagram, Protocol::Udp)
            .map(|handle| PendingHandle::new(driver, handle, "dial"))
            .map_err(fail)?;
        let handle = pending.handle();
        driver.bind(handle, local.to_socket_addr(ip)).map_err(fail)?;
        driver
            .connect(handle, host, remote.to_socket_addr(ip), deadline)
            .await
            .map_err(fail)?;

        let local_addr = self
            .bound_addr(handle, Some(local))
            .map_or(NetAddr::Unspecified, NetAddr::Datagram);
        debug!(driver = driver.name(), %handle, local = %local_addr, remote = %remote_addr, "datagram dialed");
        Ok(DatagramSocket::new(SocketCore::new(
            Arc::clone(driver),
            pending.release(),
            network,
            local_addr,
            remote_addr,
        )))
    }

    fn listen_stream(&self, network: Network, local: EndpointAddr) -> Result<Listener, OpError> {
        let driver = &self.inner.driver;
        let local_addr = NetAddr::Stream(local.clone());
        let fail = |error: NetError| {
            OpError::new("listen", network.to_string(), error).with_local(local_addr.clone())
        };

        let bind_ip = local.ip().unwrap_or(match network.version() {
            IpVersion::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            IpVersion::V4 | IpVersion::Any => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        });
        let pending = driver
            .socket(AddressFamily::of(bind_ip), SocketKind::Stream, Protocol::Tcp)
            .map(|handle| PendingHandle::new(driver, handle, "listen"))
            .map_err(fail)?;
        let handle = pending.handle();
        driver
            .bind(handle, local.to_socket_addr(bind_ip))
            .and_then(|()| driver.listen(handle, self.inner.config.listen_backlog))
            .map_err(fail)?;

        let bound = self
            .bound_addr(handle, Some(local))
            .map_or(NetAddr::Unspecified, NetAddr::Stream);
        debug!(driver = driver.name(), %handle, local = %bound, backlog = self.inner.config.listen_backlog, "listening");
        Ok(Listener::new(
            Arc::clone(driver),
            pending.release(),
            network,
            bound,
            self.inner.config.keep_alive(),
        ))
    }

    /// 优先采用后端报告的实际绑定地址。
    fn bound_addr(&self, handle: Handle, fallback: Option<EndpointAddr>) -> Option<EndpointAddr> {
        match self.inner.driver.local_addr(handle) {
            Ok(addr) => Some(EndpointAddr::from(addr)),
            Err(_) => fallback,
        }
    }
}

/// 尚未移交给套接字对象的句柄。
///
/// 拨号或监听的任一步失败、或者拨号 future 在 `connect` 期间被调用方丢弃，都会在这里关闭句柄；
/// 只有 [`PendingHandle::release`] 把所有权交给 `SocketCore`/`Listener` 之后才不再负责。
struct PendingHandle<'a> {
    driver: &'a Arc<dyn NetDriver>,
    handle: Handle,
    op: &'static str,
    armed: bool,
}

impl<'a> PendingHandle<'a> {
    fn new(driver: &'a Arc<dyn NetDriver>, handle: Handle, op: &'static str) -> Self {
        Self {
            driver,
            handle,
            op,
            armed: true,
        }
    }

    fn handle(&self) -> Handle {
        self.handle
    }

    fn release(mut self) -> Handle {
        self.armed = false;
        self.handle
    }
}

impl Drop for PendingHandle<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(error) = self.driver.close(self.handle) {
            warn!(op = self.op, handle = %self.handle, %error, "closing handle after failed setup");
        }
    }
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("driver", &self.inner.driver.name())
            .field("config", &self.inner.config)
            .finish()
    }
}

fn ensure_family(version: IpVersion, ip: IpAddr, address: &str) -> Result<(), NetError> {
    if version.admits(ip) {
        Ok(())
    } else {
        Err(NetError::addr_parse(address, "address family mismatch"))
    }
}

/// 拨号时对新连接生效的保活策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeepAlive {
    /// 采用 [`NetConfig::keep_alive`]。
    #[default]
    Default,
    Disabled,
    Period(Duration),
}

/// 拨号参数。
///
/// # 契约（What）
/// - `timeout` 同时约束名称解析与连接建立，到期返回超时错误；
/// - `local_addr` 指定本地绑定端点；数据报拨号未指定端口时从临时端口区间分配；
/// - 保活在流式连接建立后尽力开启：后端不支持时仅记录日志，拨号仍然成功。
#[derive(Clone, Debug, Default)]
pub struct Dialer {
    timeout: Option<Duration>,
    local_addr: Option<EndpointAddr>,
    keep_alive: KeepAlive,
}

impl Dialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_local_addr(mut self, local: EndpointAddr) -> Self {
        self.local_addr = Some(local);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub async fn dial(
        &self,
        net: &Net,
        network: &str,
        address: &str,
    ) -> Result<Arc<dyn Conn>, OpError> {
        let deadline = Deadline::from_timeout(self.timeout);
        let parsed = Network::parse(network).map_err(|error| OpError::new("dial", network, error))?;
        match parsed {
            Network::Tcp(_) => {
                let resolved = resolve_within(deadline, net.resolve_endpoint(parsed, address))
                    .await
                    .map_err(|error| OpError::new("dial", network, error))?;
                let socket = net
                    .connect_stream(
                        parsed,
                        self.local_addr.clone(),
                        resolved.endpoint,
                        &resolved.host,
                        deadline,
                    )
                    .await?;
                let period = match self.keep_alive {
                    KeepAlive::Default => net.config().keep_alive(),
                    KeepAlive::Disabled => None,
                    KeepAlive::Period(period) => Some(period),
                };
                if let Some(period) = period {
                    enable_keep_alive(&socket, period);
                }
                Ok(Arc::new(socket))
            }
            Network::Udp(_) => {
                let resolved = resolve_within(deadline, net.resolve_endpoint(parsed, address))
                    .await
                    .map_err(|error| OpError::new("dial", network, error))?;
                let socket = net
                    .connect_datagram(
                        parsed,
                        self.local_addr.clone(),
                        resolved.endpoint,
                        &resolved.host,
                        deadline,
                    )
                    .await?;
                Ok(Arc::new(socket))
            }
            Network::Ip { .. } | Network::Unix(_) => Err(OpError::new(
                "dial",
                network,
                NetError::unimplemented("dialing raw IP or unix networks"),
            )),
        }
    }
}

async fn resolve_within<F>(deadline: Deadline, resolve: F) -> Result<Resolved, NetError>
where
    F: Future<Output = Result<Resolved, NetError>>,
{
    if deadline.is_elapsed() {
        return Err(NetError::timeout(OperationKind::RESOLVE));
    }
    match deadline.instant() {
        None => resolve.await,
        Some(instant) => tokio::time::timeout_at(instant, resolve)
            .await
            .unwrap_or_else(|_| Err(NetError::timeout(OperationKind::RESOLVE))),
    }
}

/// 尽力开启保活；失败只记录日志。
pub(crate) fn enable_keep_alive(socket: &StreamSocket, period: Duration) {
    let result = socket
        .set_keep_alive(true)
        .and_then(|()| socket.set_keep_alive_period(period));
    match result {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::Unsupported => {
            debug!(handle = %socket.handle(), %error, "keep-alive not supported by backend");
        }
        Err(error) => {
            warn!(handle = %socket.handle(), %error, "failed to enable keep-alive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netdev_transport::SockOpt;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// 建连总是失败、关闭也失败的后端，用于观察回滚路径。
    #[derive(Default)]
    struct BrokenDriver {
        closes: AtomicUsize,
    }

    fn refused() -> NetError {
        NetError::new(
            ErrorKind::ConnectionRefused,
            OperationKind::CONNECT.code,
            "refused",
        )
    }

    #[async_trait]
    impl NetDriver for BrokenDriver {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn resolve_host(&self, name: &str) -> Result<IpAddr, NetError> {
            Err(NetError::new(ErrorKind::Io, "test.resolver", format!("resolver down for {name}")))
        }

        fn local_ip(&self) -> Result<IpAddr, NetError> {
            Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
        }

        fn socket(&self, _: AddressFamily, _: SocketKind, _: Protocol) -> Result<Handle, NetError> {
            Ok(Handle::from_raw(7))
        }

        fn bind(&self, _: Handle, _: SocketAddr) -> Result<(), NetError> {
            Ok(())
        }

        async fn connect(&self, _: Handle, _: &str, _: SocketAddr, _: Deadline) -> Result<(), NetError> {
            Err(refused())
        }

        fn listen(&self, _: Handle, _: u32) -> Result<(), NetError> {
            Err(NetError::unsupported("listen"))
        }

        async fn accept(&self, _: Handle, _: Deadline) -> Result<(Handle, SocketAddr), NetError> {
            Err(NetError::unsupported("accept"))
        }

        async fn send(&self, _: Handle, _: &[u8], _: Deadline) -> Result<usize, NetError> {
            Err(NetError::unsupported("send"))
        }

        async fn recv(&self, _: Handle, _: &mut [u8], _: Deadline) -> Result<usize, NetError> {
            Err(NetError::unsupported("recv"))
        }

        fn close(&self, handle: Handle) -> Result<(), NetError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Err(NetError::invalid_handle(handle))
        }

        fn set_option(&self, _: Handle, _: SockOpt) -> Result<(), NetError> {
            Err(NetError::unsupported("options"))
        }
    }

    /// `connect` 永不完成、按句柄计数的后端，用于观察拨号 future 被丢弃后的句柄归属。
    #[derive(Default)]
    struct StallingDriver {
        next: AtomicUsize,
        live: AtomicUsize,
    }

    #[async_trait]
    impl NetDriver for StallingDriver {
        fn name(&self) -> &'static str {
            "stalling"
        }

        async fn resolve_host(&self, name: &str) -> Result<IpAddr, NetError> {
            Err(NetError::resolution(name, "no resolver"))
        }

        fn local_ip(&self) -> Result<IpAddr, NetError> {
            Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
        }

        fn socket(&self, _: AddressFamily, _: SocketKind, _: Protocol) -> Result<Handle, NetError> {
            self.live.fetch_add(1, Ordering::SeqCst);
            let raw = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Handle::from_raw(raw as u32))
        }

        fn bind(&self, _: Handle, _: SocketAddr) -> Result<(), NetError> {
            Ok(())
        }

        async fn connect(&self, _: Handle, _: &str, _: SocketAddr, _: Deadline) -> Result<(), NetError> {
            std::future::pending().await
        }

        fn listen(&self, _: Handle, _: u32) -> Result<(), NetError> {
            Ok(())
        }

        async fn accept(&self, _: Handle, _: Deadline) -> Result<(Handle, SocketAddr), NetError> {
            std::future::pending().await
        }

        async fn send(&self, _: Handle, _: &[u8], _: Deadline) -> Result<usize, NetError> {
            Err(NetError::unsupported("send"))
        }

        async fn recv(&self, _: Handle, _: &mut [u8], _: Deadline) -> Result<usize, NetError> {
            Err(NetError::unsupported("recv"))
        }

        fn close(&self, _: Handle) -> Result<(), NetError> {
            self.live.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        fn set_option(&self, _: Handle, _: SockOpt) -> Result<(), NetError> {
            Err(NetError::unsupported("options"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_pending_dial_closes_its_handle() {
        let driver = Arc::new(StallingDriver::default());
        let net = Net::new(driver.clone());

        for (network, address) in [("tcp", "192.0.2.1:80"), ("udp", "192.0.2.1:53")] {
            let dial = tokio::time::timeout(Duration::from_millis(50), net.dial(network, address));
            assert!(dial.await.is_err(), "{network} dial must still be pending");
            assert_eq!(driver.live.load(Ordering::SeqCst), 0, "{network}");
        }
        assert_eq!(driver.next.load(Ordering::SeqCst), 2);

        let listener = net.listen("tcp", ":8080").await.unwrap();
        assert_eq!(driver.live.load(Ordering::SeqCst), 1, "listener owns its handle");
        drop(listener);
        assert_eq!(driver.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_setup_closes_the_handle_and_logs_close_failure() {
        let driver = Arc::new(BrokenDriver::default());
        let net = Net::new(driver.clone());

        let err = net.dial("tcp", "192.0.2.1:80").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
        assert_eq!(driver.closes.load(Ordering::SeqCst), 1);

        let err = net.listen("tcp", ":8080").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(driver.closes.load(Ordering::SeqCst), 2);
        assert!(logs_contain("closing handle after failed setup"));
    }

    #[tokio::test]
    async fn resolver_failures_surface_as_resolution_errors() {
        let net = Net::new(Arc::new(BrokenDriver::default()));
        let err = net.dial("tcp", "db.internal:5432").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(std::error::Error::source(err.error()).is_some());
    }

    #[tokio::test]
    async fn unconfigured_net_reports_not_configured() {
        let net = Net::unconfigured();
        let err = net.dial("udp", "10.0.0.1:53").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
        let err = net.resolve_stream_addr("tcp", "example.test:80").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
    }

    #[test]
    fn hand_built_configs_are_validated() {
        let inverted = NetConfig {
            ephemeral_ports: netdev_transport::PortRange {
                start: 60000,
                end: 50000,
            },
            ..NetConfig::default()
        };
        let err = Net::with_config(Arc::new(NopDriver), inverted).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPortRange {
                start: 60000,
                end: 50000
            }
        ));

        let zero_backlog = NetConfig {
            listen_backlog: 0,
            ..NetConfig::default()
        };
        assert!(matches!(
            Net::with_config(Arc::new(NopDriver), zero_backlog),
            Err(ConfigError::ZeroBacklog)
        ));
        assert!(Net::with_config(Arc::new(NopDriver), NetConfig::default()).is_ok());
    }

    #[test]
    fn dialer_defaults_follow_the_config() {
        let dialer = Dialer::new();
        assert_eq!(dialer.keep_alive, KeepAlive::Default);
        assert!(dialer.timeout.is_none());
        assert!(dialer.local_addr.is_none());
    }
}
