use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::Poll;

use async_trait::async_trait;
use netdev_transport::readiness::wait_until;
use netdev_transport::{
    AddressFamily, Deadline, ErrorKind, Handle, HandleTable, NetDriver, NetError, OperationKind,
    Protocol, SockOpt, SocketKind,
};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::LoopbackConfig;
use crate::pipe::{Mailbox, Pipe, same_endpoint};

/// 自动绑定使用的端口区间，与套接字层的临时端口区间错开。
const AUTO_PORT_START: u16 = 40000;
const AUTO_PORT_END: u16 = 49151;

/// 进程内回环后端。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 代表“只提供非阻塞原语”的一类后端（事件驱动模组、preview-2 风格 API）：每个操作要么立即完成，
///   要么报告 would block，挂起统一交给 [`wait_until`]，在 `Notify` 上等待生产方唤醒；
/// - 不依赖操作系统网络栈，测试可以精确控制名称解析、缓冲容量与句柄生命周期。
///
/// ## 契约（What）
/// - 所有克隆共享同一张“网络”：在一个克隆上监听的地址，可以从另一个克隆拨入；
/// - 流连接在 `connect` 时立即建立，服务端句柄进入监听者的等待队列，队列长度达到 backlog 时拒绝连接；
/// - 数据报发往无人绑定的地址时静默丢弃，与真实 UDP 一致；
/// - 流句柄接受保活与 linger 选项并记录下来，原始三元组选项与数据报句柄上的任何选项返回 `Unsupported`；
/// - [`LoopbackDriver::live_handles`] 报告当前未关闭的句柄数，用于断言没有泄漏。
///
/// ## 注意事项（Trade-offs）
/// - 绑定冲突只按“种类 + 精确地址”检测，通配地址与具体地址可以同时绑定同一端口。
#[derive(Clone)]
pub struct LoopbackDriver {
    fabric: Arc<Fabric>,
}

struct Fabric {
    config: LoopbackConfig,
    table: HandleTable<Endpoint>,
    bindings: Mutex<HashMap<(SocketKind, SocketAddr), Handle>>,
    next_port: AtomicU32,
}

struct Endpoint {
    family: AddressFamily,
    kind: SocketKind,
    local: Mutex<Option<SocketAddr>>,
    role: Mutex<Role>,
    options: Mutex<Vec<SockOpt>>,
}

#[derive(Clone)]
enum Role {
    Idle,
    Listening(Arc<AcceptQueue>),
    Stream {
        rx: Arc<Pipe>,
        tx: Arc<Pipe>,
    },
    Datagram {
        mailbox: Arc<Mailbox>,
        peer: Option<SocketAddr>,
    },
}

struct AcceptQueue {
    state: Mutex<AcceptState>,
    ready: Notify,
}

struct AcceptState {
    pending: VecDeque<(Handle, SocketAddr)>,
    backlog: usize,
    closed: bool,
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self::with_config(LoopbackConfig::default())
    }

    pub fn with_config(config: LoopbackConfig) -> Self {
        Self {
            fabric: Arc::new(Fabric {
                config,
                table: HandleTable::new(),
                bindings: Mutex::new(HashMap::new()),
                next_port: AtomicU32::new(0),
            }),
        }
    }

    pub fn config(&self) -> &LoopbackConfig {
        &self.fabric.config
    }

    /// 当前未关闭的句柄数。
    pub fn live_handles(&self) -> usize {
        self.fabric.table.len()
    }

    /// 句柄上已生效的选项，按设置顺序排列。
    pub fn recorded_options(&self, handle: Handle) -> Result<Vec<SockOpt>, NetError> {
        Ok(self.fabric.table.get(handle)?.options.lock().clone())
    }

    fn endpoint(&self, handle: Handle) -> Result<Arc<Endpoint>, NetError> {
        self.fabric.table.get(handle)
    }

    fn auto_port(&self) -> u16 {
        let span = u32::from(AUTO_PORT_END - AUTO_PORT_START) + 1;
        let offset = self.fabric.next_port.fetch_add(1, Ordering::Relaxed) % span;
        AUTO_PORT_START + offset as u16
    }

    /// 为尚未绑定的端点分配本地地址。
    fn ensure_bound(&self, handle: Handle, endpoint: &Endpoint) -> Result<SocketAddr, NetError> {
        if let Some(local) = *endpoint.local.lock() {
            return Ok(local);
        }
        let ip = match endpoint.family {
            AddressFamily::Inet => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::Inet6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        self.bind(handle, SocketAddr::new(ip, 0))?;
        endpoint
            .local
            .lock()
            .ok_or_else(|| NetError::invalid_handle(handle))
    }

    /// 精确匹配优先，其次匹配同端口的通配绑定。
    fn lookup_binding(&self, kind: SocketKind, addr: SocketAddr) -> Option<Handle> {
        let bindings = self.fabric.bindings.lock();
        if let Some(handle) = bindings.get(&(kind, addr)) {
            return Some(*handle);
        }
        let wildcard = match addr.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        bindings
            .get(&(kind, SocketAddr::new(wildcard, addr.port())))
            .copied()
    }

    /// 把通配的本地 IP 替换为设备地址，作为对端看到的来源地址。
    fn visible_addr(&self, local: SocketAddr) -> SocketAddr {
        if local.ip().is_unspecified() {
            SocketAddr::new(self.fabric.config.local_ip, local.port())
        } else {
            local
        }
    }

    fn connect_stream(
        &self,
        handle: Handle,
        endpoint: &Endpoint,
        addr: SocketAddr,
    ) -> Result<(), NetError> {
        let refused = || {
            NetError::new(
                ErrorKind::ConnectionRefused,
                OperationKind::CONNECT.code,
                format!("connection refused by {addr}"),
            )
        };

        let queue = self
            .lookup_binding(SocketKind::Stream, addr)
            .and_then(|listener| self.fabric.table.get(listener).ok())
            .and_then(|listener| match &*listener.role.lock() {
                Role::Listening(queue) => Some(Arc::clone(queue)),
                _ => None,
            })
            .ok_or_else(refused)?;

        let client_local = self.visible_addr(self.ensure_bound(handle, endpoint)?);
        let capacity = self.fabric.config.buffer_capacity;
        let to_server = Arc::new(Pipe::new(capacity));
        let to_client = Arc::new(Pipe::new(capacity));

        let server = Endpoint::new(AddressFamily::of(addr.ip()), SocketKind::Stream);
        *server.local.lock() = Some(addr);
        *server.role.lock() = Role::Stream {
            rx: Arc::clone(&to_server),
            tx: Arc::clone(&to_client),
        };
        let server_handle = self.fabric.table.insert(server);

        {
            let mut state = queue.state.lock();
            if state.closed || state.pending.len() >= state.backlog {
                drop(state);
                let _ = self.fabric.table.remove(server_handle);
                return Err(refused());
            }
            state.pending.push_back((server_handle, client_local));
        }
        *endpoint.role.lock() = Role::Stream {
            rx: to_client,
            tx: to_server,
        };
        queue.ready.notify_waiters();
        debug!(%handle, server = %server_handle, %addr, "loopback stream connected");
        Ok(())
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoopbackDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackDriver")
            .field("config", &self.fabric.config)
            .field("live_handles", &self.fabric.table.len())
            .finish()
    }
}

impl Endpoint {
    fn new(family: AddressFamily, kind: SocketKind) -> Self {
        Self {
            family,
            kind,
            local: Mutex::new(None),
            role: Mutex::new(Role::Idle),
            options: Mutex::new(Vec::new()),
        }
    }

    fn role(&self) -> Role {
        self.role.lock().clone()
    }
}

impl AcceptQueue {
    fn try_pop(&self) -> Poll<Result<(Handle, SocketAddr), NetError>> {
        let mut state = self.state.lock();
        if state.closed {
            return Poll::Ready(Err(NetError::closed(OperationKind::ACCEPT)));
        }
        match state.pending.pop_front() {
            Some(conn) => Poll::Ready(Ok(conn)),
            None => Poll::Pending,
        }
    }
}

fn not_connected(op: OperationKind) -> NetError {
    NetError::new(
        ErrorKind::Io,
        op.code,
        format!("{} on unconnected socket", op.message),
    )
}

#[async_trait]
impl NetDriver for LoopbackDriver {
    fn name(&self) -> &'static str {
        "loopback"
    }

    async fn resolve_host(&self, name: &str) -> Result<IpAddr, NetError> {
        let config = &self.fabric.config;
        if let Some(ip) = config.hosts.get(name) {
            return Ok(*ip);
        }
        if name.eq_ignore_ascii_case("localhost") {
            return Ok(config.local_ip);
        }
        Err(NetError::resolution(name, "no such host"))
    }

    fn local_ip(&self) -> Result<IpAddr, NetError> {
        Ok(self.fabric.config.local_ip)
    }

    fn socket(
        &self,
        family: AddressFamily,
        kind: SocketKind,
        protocol: Protocol,
    ) -> Result<Handle, NetError> {
        match (kind, protocol) {
            (SocketKind::Stream, Protocol::Tcp) | (SocketKind::Datagram, Protocol::Udp) => {}
            _ => {
                return Err(NetError::unsupported(format!(
                    "{kind:?} socket with {protocol:?}"
                )));
            }
        }
        let handle = self.fabric.table.insert(Endpoint::new(family, kind));
        debug!(%handle, ?family, ?kind, "loopback socket created");
        Ok(handle)
    }

    fn bind(&self, handle: Handle, addr: SocketAddr) -> Result<(), NetError> {
        let endpoint = self.endpoint(handle)?;
        let mut local = endpoint.local.lock();
        if local.is_some() {
            return Err(NetError::new(
                ErrorKind::AddrInUse,
                OperationKind::BIND.code,
                "socket already bound",
            ));
        }

        let mut bindings = self.fabric.bindings.lock();
        let addr = if addr.port() == 0 {
            let free = (0..=(AUTO_PORT_END - AUTO_PORT_START))
                .map(|_| SocketAddr::new(addr.ip(), self.auto_port()))
                .find(|candidate| !bindings.contains_key(&(endpoint.kind, *candidate)));
            free.ok_or_else(|| {
                NetError::new(
                    ErrorKind::AddrNotAvailable,
                    OperationKind::BIND.code,
                    "no free loopback port",
                )
            })?
        } else {
            addr
        };
        if bindings.contains_key(&(endpoint.kind, addr)) {
            return Err(NetError::new(
                ErrorKind::AddrInUse,
                OperationKind::BIND.code,
                format!("address {addr} already in use"),
            ));
        }
        bindings.insert((endpoint.kind, addr), handle);
        *local = Some(addr);

        if endpoint.kind == SocketKind::Datagram {
            *endpoint.role.lock() = Role::Datagram {
                mailbox: Arc::new(Mailbox::new(self.fabric.config.datagram_queue_depth)),
                peer: None,
            };
        }
        Ok(())
    }

    async fn connect(
        &self,
        handle: Handle,
        _host: &str,
        addr: SocketAddr,
        deadline: Deadline,
    ) -> Result<(), NetError> {
        if deadline.is_elapsed() {
            return Err(NetError::timeout(OperationKind::CONNECT));
        }
        let endpoint = self.endpoint(handle)?;
        match endpoint.kind {
            SocketKind::Stream => self.connect_stream(handle, &endpoint, addr),
            SocketKind::Datagram => {
                self.ensure_bound(handle, &endpoint)?;
                if let Role::Datagram { peer, .. } = &mut *endpoint.role.lock() {
                    *peer = Some(addr);
                }
                Ok(())
            }
        }
    }

    fn listen(&self, handle: Handle, backlog: u32) -> Result<(), NetError> {
        let endpoint = self.endpoint(handle)?;
        if endpoint.kind != SocketKind::Stream {
            return Err(NetError::unsupported("listening on datagram sockets"));
        }
        let local = self.ensure_bound(handle, &endpoint)?;
        *endpoint.role.lock() = Role::Listening(Arc::new(AcceptQueue {
            state: Mutex::new(AcceptState {
                pending: VecDeque::new(),
                backlog: backlog.max(1) as usize,
                closed: false,
            }),
            ready: Notify::new(),
        }));
        debug!(%handle, %local, backlog, "loopback listening");
        Ok(())
    }

    async fn accept(
        &self,
        handle: Handle,
        deadline: Deadline,
    ) -> Result<(Handle, SocketAddr), NetError> {
        let Role::Listening(queue) = self.endpoint(handle)?.role() else {
            return Err(not_connected(OperationKind::ACCEPT));
        };
        wait_until(OperationKind::ACCEPT, deadline, &queue.ready, || {
            queue.try_pop()
        })
        .await
    }

    async fn send(
        &self,
        handle: Handle,
        buf: &[u8],
        deadline: Deadline,
    ) -> Result<usize, NetError> {
        let endpoint = self.endpoint(handle)?;
        match endpoint.role() {
            Role::Stream { tx, .. } => {
                wait_until(OperationKind::SEND, deadline, &tx.writable, || {
                    tx.try_send(buf)
                })
                .await
            }
            Role::Datagram {
                peer: Some(peer), ..
            } => {
                if deadline.is_elapsed() {
                    return Err(NetError::timeout(OperationKind::SEND));
                }
                let from = endpoint
                    .local
                    .lock()
                    .map(|local| self.visible_addr(local))
                    .ok_or_else(|| not_connected(OperationKind::SEND))?;
                let target = self
                    .lookup_binding(SocketKind::Datagram, peer)
                    .and_then(|target| self.fabric.table.get(target).ok());
                if let Some(Role::Datagram { mailbox, .. }) = target.map(|target| target.role()) {
                    if !mailbox.deliver(from, buf) {
                        debug!(%handle, %peer, "loopback datagram dropped");
                    }
                }
                Ok(buf.len())
            }
            _ => Err(not_connected(OperationKind::SEND)),
        }
    }

    async fn recv(
        &self,
        handle: Handle,
        buf: &mut [u8],
        deadline: Deadline,
    ) -> Result<usize, NetError> {
        match self.endpoint(handle)?.role() {
            Role::Stream { rx, .. } => {
                wait_until(OperationKind::RECV, deadline, &rx.readable, || {
                    rx.try_recv(buf)
                })
                .await
            }
            Role::Datagram {
                mailbox,
                peer: Some(peer),
            } => {
                wait_until(OperationKind::RECV, deadline, &mailbox.readable, || {
                    mailbox.try_recv(peer, buf)
                })
                .await
            }
            _ => Err(not_connected(OperationKind::RECV)),
        }
    }

    fn close(&self, handle: Handle) -> Result<(), NetError> {
        let endpoint = self.fabric.table.remove(handle)?;
        if let Some(local) = *endpoint.local.lock() {
            let mut bindings = self.fabric.bindings.lock();
            if bindings.get(&(endpoint.kind, local)) == Some(&handle) {
                bindings.remove(&(endpoint.kind, local));
            }
        }

        match endpoint.role() {
            Role::Idle => {}
            Role::Stream { rx, tx } => {
                rx.close_reader();
                tx.close_writer();
            }
            Role::Listening(queue) => {
                let pending: Vec<_> = {
                    let mut state = queue.state.lock();
                    state.closed = true;
                    state.pending.drain(..).collect()
                };
                queue.ready.notify_waiters();
                for (pending, _) in pending {
                    if let Err(error) = self.close(pending) {
                        warn!(listener = %handle, %pending, %error, "closing unaccepted connection failed");
                    }
                }
            }
            Role::Datagram { mailbox, .. } => mailbox.close(),
        }
        debug!(%handle, "loopback handle closed");
        Ok(())
    }

    fn set_option(&self, handle: Handle, option: SockOpt) -> Result<(), NetError> {
        let endpoint = self.endpoint(handle)?;
        if endpoint.kind == SocketKind::Datagram {
            return Err(NetError::unsupported("socket options on datagram sockets"));
        }
        if let SockOpt::Raw { .. } = option {
            return Err(NetError::unsupported(format!(
                "raw socket option {:?}",
                option.triple()
            )));
        }
        endpoint.options.lock().push(option);
        Ok(())
    }

    fn local_addr(&self, handle: Handle) -> Result<SocketAddr, NetError> {
        let endpoint = self.endpoint(handle)?;
        let local = *endpoint.local.lock();
        local
            .map(|local| self.visible_addr(local))
            .ok_or_else(|| NetError::unsupported("local address of unbound socket"))
    }
}
