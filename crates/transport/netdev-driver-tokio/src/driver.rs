use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netdev_transport::{
    AddressFamily, CloseSignal, Deadline, ErrorKind, Handle, HandleTable, NetDriver, NetError,
    OperationKind, Protocol, SockOpt, SocketKind, map_io_error,
};
use parking_lot::Mutex;
use socket2::{Domain, SockRef, Type};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};
use tracing::{debug, trace};

use crate::util::run_with_close;

/// 基于宿主机内核套接字的传输后端。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 内核本身提供阻塞语义，后端只需把句柄映射到 Tokio 套接字，并让每个阻塞操作与
///   句柄的关闭信号、截止时间竞速；
/// - 克隆共享同一张句柄表，可同时交给多个 [`netdev::Net`] 实例。
///
/// ## 契约（What）
/// - 流式读写采用 `readable()`/`try_read` 与 `writable()`/`try_write` 循环，数据报收发采用
///   `recv`/`send`，均为取消安全的原语，竞速失败时不会丢失字节；
/// - `close` 从句柄表移除条目并触发关闭信号；流式连接额外执行双向 `shutdown`，
///   使仍持有套接字的进行中操作不会延迟对端看到流结束；
/// - [`NetDriver::resolve_host`] 使用系统解析器，存在 IPv4 结果时优先返回 IPv4。
///
/// [`netdev::Net`]: https://docs.rs/netdev
#[derive(Clone)]
pub struct TokioDriver {
    table: Arc<HandleTable<Entry>>,
    local_ip: IpAddr,
}

struct Entry {
    state: Mutex<State>,
    closed: CloseSignal,
}

/// 句柄背后的套接字所处阶段。
enum State {
    /// 已创建的 TCP 套接字，可能已绑定。
    Tcp(TcpSocket),
    /// `TcpSocket::connect` 消费了套接字，结果尚未返回。
    Connecting,
    Stream(Arc<TcpStream>),
    Listening(Arc<TcpListener>),
    /// 尚未绑定的 UDP 套接字；Tokio 的 `UdpSocket` 只能由已绑定的套接字构造。
    UdpUnbound(socket2::Socket),
    Udp(Arc<UdpSocket>),
    /// 建连或监听失败后套接字已被消费，只能关闭。
    Failed,
}

/// 一次读写所需的套接字引用，在锁外使用。
enum Io {
    Stream(Arc<TcpStream>),
    Datagram(Arc<UdpSocket>),
}

impl Entry {
    fn new(state: State) -> Self {
        Self {
            state: Mutex::new(state),
            closed: CloseSignal::new(),
        }
    }

    fn io(&self, op: OperationKind) -> Result<Io, NetError> {
        match &*self.state.lock() {
            State::Stream(stream) => Ok(Io::Stream(Arc::clone(stream))),
            State::Udp(socket) => Ok(Io::Datagram(Arc::clone(socket))),
            _ if self.closed.is_closed() => Err(NetError::closed(op)),
            _ => Err(not_connected(op)),
        }
    }
}

impl TokioDriver {
    pub fn new() -> Self {
        Self {
            table: Arc::new(HandleTable::new()),
            local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    /// 覆盖 [`NetDriver::local_ip`] 报告的本机地址，默认 `127.0.0.1`。
    pub fn with_local_ip(mut self, ip: IpAddr) -> Self {
        self.local_ip = ip;
        self
    }

    /// 当前仍存活的句柄数量，用于检测泄漏。
    pub fn live_handles(&self) -> usize {
        self.table.len()
    }

    fn entry(&self, handle: Handle) -> Result<Arc<Entry>, NetError> {
        self.table.get(handle)
    }
}

impl Default for TokioDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokioDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioDriver")
            .field("local_ip", &self.local_ip)
            .field("live_handles", &self.table.len())
            .finish()
    }
}

fn not_connected(op: OperationKind) -> NetError {
    NetError::new(
        ErrorKind::Io,
        op.code,
        format!("{} on unconnected socket", op.message),
    )
}

fn wrong_state(op: OperationKind, what: &str) -> NetError {
    NetError::new(ErrorKind::Io, op.code, format!("{}: {what}", op.message))
}

fn into_tokio_udp(socket: socket2::Socket) -> io::Result<UdpSocket> {
    UdpSocket::from_std(socket.into())
}

async fn read_some(stream: &TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    loop {
        stream.readable().await?;
        match stream.try_read(buf) {
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            other => return other,
        }
    }
}

async fn write_some(stream: &TcpStream, buf: &[u8]) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    loop {
        stream.writable().await?;
        match stream.try_write(buf) {
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            other => return other,
        }
    }
}

fn apply_option(sock: &SockRef<'_>, option: SockOpt) -> Result<(), NetError> {
    let result = match option {
        SockOpt::KeepAlive(on) => sock.set_keepalive(on),
        SockOpt::KeepAliveInterval(interval) => set_keepalive_interval(sock, interval),
        SockOpt::Linger(linger) => sock.set_linger(linger),
        SockOpt::Raw { level, name, .. } => {
            return Err(NetError::unsupported(format!(
                "raw socket option ({level}, {name})"
            )));
        }
    };
    result.map_err(|err| map_io_error(OperationKind::SET_OPTION, err))
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "windows",
))]
fn set_keepalive_interval(sock: &SockRef<'_>, interval: Duration) -> io::Result<()> {
    // 空闲时间与探测间隔取同一值。
    let params = socket2::TcpKeepalive::new()
        .with_time(interval)
        .with_interval(interval);
    sock.set_tcp_keepalive(&params)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "windows",
)))]
fn set_keepalive_interval(_sock: &SockRef<'_>, _interval: Duration) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[async_trait]
impl NetDriver for TokioDriver {
    fn name(&self) -> &'static str {
        "tokio"
    }

    async fn resolve_host(&self, name: &str) -> Result<IpAddr, NetError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((name, 0))
            .await
            .map_err(|err| NetError::resolution(name, &err).with_source(err))?
            .collect();
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .map(SocketAddr::ip)
            .ok_or_else(|| NetError::resolution(name, "no addresses found"))
    }

    fn local_ip(&self) -> Result<IpAddr, NetError> {
        Ok(self.local_ip)
    }

    fn socket(
        &self,
        family: AddressFamily,
        kind: SocketKind,
        protocol: Protocol,
    ) -> Result<Handle, NetError> {
        let to_error = |err| map_io_error(OperationKind::SOCKET, err);
        let state = match (kind, protocol) {
            (SocketKind::Stream, Protocol::Tcp) => {
                let socket = match family {
                    AddressFamily::Inet => TcpSocket::new_v4(),
                    AddressFamily::Inet6 => TcpSocket::new_v6(),
                }
                .map_err(to_error)?;
                State::Tcp(socket)
            }
            (SocketKind::Datagram, Protocol::Udp) => {
                let domain = match family {
                    AddressFamily::Inet => Domain::IPV4,
                    AddressFamily::Inet6 => Domain::IPV6,
                };
                let socket =
                    socket2::Socket::new(domain, Type::DGRAM, Some(socket2::Protocol::UDP))
                        .map_err(to_error)?;
                socket.set_nonblocking(true).map_err(to_error)?;
                State::UdpUnbound(socket)
            }
            (kind, protocol) => {
                return Err(NetError::unsupported(format!(
                    "{kind:?} socket over {protocol:?}"
                )));
            }
        };
        let handle = self.table.insert(Entry::new(state));
        trace!(%handle, ?family, ?kind, "socket created");
        Ok(handle)
    }

    fn bind(&self, handle: Handle, addr: SocketAddr) -> Result<(), NetError> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        let to_error = |err| map_io_error(OperationKind::BIND, err);
        match std::mem::replace(&mut *state, State::Failed) {
            State::Tcp(socket) => {
                let result = socket.bind(addr).map_err(to_error);
                *state = State::Tcp(socket);
                result
            }
            State::UdpUnbound(socket) => {
                if let Err(err) = socket.bind(&addr.into()) {
                    *state = State::UdpUnbound(socket);
                    return Err(to_error(err));
                }
                let socket = into_tokio_udp(socket).map_err(to_error)?;
                *state = State::Udp(Arc::new(socket));
                Ok(())
            }
            other => {
                *state = other;
                Err(wrong_state(OperationKind::BIND, "socket already bound"))
            }
        }
    }

    async fn connect(
        &self,
        handle: Handle,
        _host: &str,
        addr: SocketAddr,
        deadline: Deadline,
    ) -> Result<(), NetError> {
        let entry = self.entry(handle)?;
        let op = OperationKind::CONNECT;
        let pending = {
            let mut state = entry.state.lock();
            match std::mem::replace(&mut *state, State::Connecting) {
                State::Tcp(socket) => Ok(socket),
                State::Udp(socket) => {
                    *state = State::Udp(Arc::clone(&socket));
                    Err(Some(socket))
                }
                State::UdpUnbound(socket) => {
                    // 未绑定的数据报套接字由内核在连接时隐式绑定。
                    if let Err(err) = socket.connect(&addr.into()) {
                        *state = State::UdpUnbound(socket);
                        return Err(map_io_error(op, err));
                    }
                    let socket = into_tokio_udp(socket).map_err(|err| {
                        *state = State::Failed;
                        map_io_error(op, err)
                    })?;
                    *state = State::Udp(Arc::new(socket));
                    Err(None)
                }
                other => {
                    *state = other;
                    return Err(wrong_state(op, "socket cannot connect in its current state"));
                }
            }
        };

        match pending {
            Ok(socket) => {
                let result = run_with_close(&entry.closed, op, deadline, socket.connect(addr)).await;
                let mut state = entry.state.lock();
                match result {
                    Ok(stream) => {
                        *state = State::Stream(Arc::new(stream));
                        debug!(%handle, %addr, "stream connected");
                        Ok(())
                    }
                    Err(err) => {
                        *state = State::Failed;
                        Err(err)
                    }
                }
            }
            Err(Some(socket)) => {
                run_with_close(&entry.closed, op, deadline, socket.connect(addr)).await
            }
            Err(None) => Ok(()),
        }
    }

    fn listen(&self, handle: Handle, backlog: u32) -> Result<(), NetError> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        match std::mem::replace(&mut *state, State::Failed) {
            State::Tcp(socket) => {
                let listener = socket
                    .listen(backlog)
                    .map_err(|err| map_io_error(OperationKind::LISTEN, err))?;
                *state = State::Listening(Arc::new(listener));
                Ok(())
            }
            State::UdpUnbound(socket) => {
                *state = State::UdpUnbound(socket);
                Err(NetError::unsupported("listening on datagram sockets"))
            }
            State::Udp(socket) => {
                *state = State::Udp(socket);
                Err(NetError::unsupported("listening on datagram sockets"))
            }
            other => {
                *state = other;
                Err(wrong_state(
                    OperationKind::LISTEN,
                    "socket cannot listen in its current state",
                ))
            }
        }
    }

    async fn accept(
        &self,
        handle: Handle,
        deadline: Deadline,
    ) -> Result<(Handle, SocketAddr), NetError> {
        let entry = self.entry(handle)?;
        let op = OperationKind::ACCEPT;
        let listener = match &*entry.state.lock() {
            State::Listening(listener) => Arc::clone(listener),
            _ if entry.closed.is_closed() => return Err(NetError::closed(op)),
            _ => return Err(wrong_state(op, "socket is not listening")),
        };
        let (stream, peer) = run_with_close(&entry.closed, op, deadline, listener.accept()).await?;
        let accepted = self
            .table
            .insert(Entry::new(State::Stream(Arc::new(stream))));
        debug!(listener = %handle, %accepted, %peer, "connection accepted");
        Ok((accepted, peer))
    }

    async fn send(
        &self,
        handle: Handle,
        buf: &[u8],
        deadline: Deadline,
    ) -> Result<usize, NetError> {
        let entry = self.entry(handle)?;
        let op = OperationKind::SEND;
        match entry.io(op)? {
            Io::Stream(stream) => {
                run_with_close(&entry.closed, op, deadline, write_some(&stream, buf)).await
            }
            Io::Datagram(socket) => {
                run_with_close(&entry.closed, op, deadline, socket.send(buf)).await
            }
        }
    }

    async fn recv(
        &self,
        handle: Handle,
        buf: &mut [u8],
        deadline: Deadline,
    ) -> Result<usize, NetError> {
        let entry = self.entry(handle)?;
        let op = OperationKind::RECV;
        match entry.io(op)? {
            Io::Stream(stream) => {
                run_with_close(&entry.closed, op, deadline, read_some(&stream, buf)).await
            }
            Io::Datagram(socket) => {
                run_with_close(&entry.closed, op, deadline, socket.recv(buf)).await
            }
        }
    }

    fn close(&self, handle: Handle) -> Result<(), NetError> {
        let entry = self.table.remove(handle)?;
        entry.closed.close();
        let state = std::mem::replace(&mut *entry.state.lock(), State::Failed);
        if let State::Stream(stream) = &state {
            // 进行中的读写仍持有套接字克隆，先关闭两个方向，文件描述符随最后一个引用释放。
            if let Err(err) = SockRef::from(stream.as_ref()).shutdown(Shutdown::Both) {
                if err.kind() != io::ErrorKind::NotConnected {
                    debug!(%handle, error = %err, "shutdown before close failed");
                }
            }
        }
        drop(state);
        trace!(%handle, "socket closed");
        Ok(())
    }

    fn set_option(&self, handle: Handle, option: SockOpt) -> Result<(), NetError> {
        let entry = self.entry(handle)?;
        let state = entry.state.lock();
        let sock = match &*state {
            State::Tcp(socket) => SockRef::from(socket),
            State::Stream(stream) => SockRef::from(stream.as_ref()),
            State::Listening(listener) => SockRef::from(listener.as_ref()),
            State::UdpUnbound(_) | State::Udp(_) => {
                return Err(NetError::unsupported(format!(
                    "{} on datagram sockets",
                    option.name()
                )));
            }
            State::Connecting | State::Failed => {
                return Err(not_connected(OperationKind::SET_OPTION));
            }
        };
        apply_option(&sock, option)?;
        trace!(%handle, ?option, "socket option applied");
        Ok(())
    }

    fn local_addr(&self, handle: Handle) -> Result<SocketAddr, NetError> {
        let entry = self.entry(handle)?;
        let state = entry.state.lock();
        let result = match &*state {
            State::Tcp(socket) => socket.local_addr(),
            State::Stream(stream) => stream.local_addr(),
            State::Listening(listener) => listener.local_addr(),
            State::Udp(socket) => socket.local_addr(),
            State::UdpUnbound(socket) => socket.local_addr().and_then(|addr| {
                addr.as_socket()
                    .ok_or_else(|| io::Error::from(io::ErrorKind::Unsupported))
            }),
            State::Connecting | State::Failed => Err(io::Error::from(io::ErrorKind::NotConnected)),
        };
        result.map_err(|err| map_io_error(OperationKind::BIND, err))
    }
}
