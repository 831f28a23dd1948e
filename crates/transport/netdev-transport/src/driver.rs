use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;

use crate::deadline::Deadline;
use crate::error::NetError;
use crate::handle::Handle;

/// 参考嵌入式 ABI 中的数值常量，供需要 `(level, option, value)` 三元组的后端直接使用。
pub mod abi {
    pub const AF_INET: i32 = 2;
    pub const AF_INET6: i32 = 10;
    pub const SOCK_STREAM: i32 = 1;
    pub const SOCK_DGRAM: i32 = 2;
    pub const IPPROTO_TCP: i32 = 6;
    pub const IPPROTO_UDP: i32 = 0x11;
    pub const SOL_SOCKET: i32 = 1;
    pub const SO_KEEPALIVE: i32 = 9;
    pub const SO_LINGER: i32 = 0xd;
    pub const SOL_TCP: i32 = 6;
    pub const TCP_KEEPINTVL: i32 = 5;
}

/// 地址族。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Inet,
            IpAddr::V6(_) => AddressFamily::Inet6,
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            AddressFamily::Inet => abi::AF_INET,
            AddressFamily::Inet6 => abi::AF_INET6,
        }
    }
}

/// 套接字类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Stream,
    Datagram,
}

impl SocketKind {
    pub const fn code(self) -> i32 {
        match self {
            SocketKind::Stream => abi::SOCK_STREAM,
            SocketKind::Datagram => abi::SOCK_DGRAM,
        }
    }
}

/// 传输协议。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub const fn code(self) -> i32 {
        match self {
            Protocol::Tcp => abi::IPPROTO_TCP,
            Protocol::Udp => abi::IPPROTO_UDP,
        }
    }
}

/// 套接字选项，`(level, option, value)` 三元组的强类型形式。
///
/// # 契约（What）
/// - 后端不支持的选项必须返回 [`ErrorKind::Unsupported`](crate::ErrorKind::Unsupported)，不得静默忽略；
/// - [`SockOpt::triple`] 按参考 ABI 渲染三元组，其中保活间隔以半秒为单位。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockOpt {
    KeepAlive(bool),
    KeepAliveInterval(Duration),
    /// `None` 关闭 linger，`Some(d)` 表示关闭时最多等待 `d` 完成发送。
    Linger(Option<Duration>),
    Raw { level: i32, name: i32, value: i64 },
}

impl SockOpt {
    pub fn triple(&self) -> (i32, i32, i64) {
        match *self {
            SockOpt::KeepAlive(on) => (abi::SOL_SOCKET, abi::SO_KEEPALIVE, i64::from(on)),
            SockOpt::KeepAliveInterval(interval) => (
                abi::SOL_TCP,
                abi::TCP_KEEPINTVL,
                (interval.as_millis() / 500).min(i64::MAX as u128) as i64,
            ),
            SockOpt::Linger(None) => (abi::SOL_SOCKET, abi::SO_LINGER, -1),
            SockOpt::Linger(Some(linger)) => (
                abi::SOL_SOCKET,
                abi::SO_LINGER,
                linger.as_secs().min(i64::MAX as u64) as i64,
            ),
            SockOpt::Raw { level, name, value } => (level, name, value),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SockOpt::KeepAlive(_) => "keep-alive",
            SockOpt::KeepAliveInterval(_) => "keep-alive interval",
            SockOpt::Linger(_) => "linger",
            SockOpt::Raw { .. } => "raw option",
        }
    }
}

/// 每个传输后端必须实现的能力接口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“字节如何真正流动”隔离在后端内部：内核套接字、嵌入式模组、preview-2 风格 API
///   各有不同的阻塞模型，套接字层只依赖这组操作；
/// - 以 `Arc<dyn NetDriver>` 注入，允许同一进程内并存多个后端，也便于测试替身。
///
/// ## 契约（What）
/// - **句柄**：`socket` 分配的句柄由后端的侧表独占；`close` 之后任何使用都必须返回
///   [`ErrorKind::InvalidHandle`](crate::ErrorKind::InvalidHandle) 或 `Closed`，不得出现未定义行为；
/// - **截止时间**：`connect`/`accept`/`send`/`recv` 必须遵守传入的 [`Deadline`]，到期时返回
///   [`ErrorKind::Timeout`](crate::ErrorKind::Timeout)；截止时间已过期时须立即返回，不做任何等待；
/// - **并发关闭**：可从另一任务对正在 `send`/`recv`/`accept` 的句柄调用 `close`，阻塞中的调用须在
///   后端的取消延迟内以错误返回；
/// - **取消安全**：`send`/`recv` 返回的 future 在完成前被丢弃时，不得丢失或重复已计入的字节，
///   套接字层依赖这一点在截止时间变化时重新发起调用；
/// - **流结束**：流式句柄上 `recv` 以非空缓冲返回 `Ok(0)` 表示对端已结束发送；
/// - **阻塞模型**：只提供非阻塞原语的后端需自行在内部挂起重试，直到就绪或截止时间到期，
///   参见 [`crate::readiness::wait_until`]。
///
/// ## 注意事项（Trade-offs）
/// - `bind`/`listen`/`close`/`set_option` 保持同步签名：所有已知后端都能立即完成这些操作；
/// - `connect` 额外接收主机名，供具备 TLS/SNI 能力的模组使用，普通后端可忽略。
#[async_trait]
pub trait NetDriver: Send + Sync + 'static {
    /// 后端名称，用于日志。
    fn name(&self) -> &'static str;

    /// 将主机名解析为地址。
    async fn resolve_host(&self, name: &str) -> Result<IpAddr, NetError>;

    /// 设备自身的 IP 地址。
    fn local_ip(&self) -> Result<IpAddr, NetError>;

    fn socket(
        &self,
        family: AddressFamily,
        kind: SocketKind,
        protocol: Protocol,
    ) -> Result<Handle, NetError>;

    fn bind(&self, handle: Handle, addr: SocketAddr) -> Result<(), NetError>;

    async fn connect(
        &self,
        handle: Handle,
        host: &str,
        addr: SocketAddr,
        deadline: Deadline,
    ) -> Result<(), NetError>;

    fn listen(&self, handle: Handle, backlog: u32) -> Result<(), NetError>;

    /// 接受一个挂起的连接，返回新句柄与对端地址。
    async fn accept(
        &self,
        handle: Handle,
        deadline: Deadline,
    ) -> Result<(Handle, SocketAddr), NetError>;

    async fn send(&self, handle: Handle, buf: &[u8], deadline: Deadline)
    -> Result<usize, NetError>;

    async fn recv(
        &self,
        handle: Handle,
        buf: &mut [u8],
        deadline: Deadline,
    ) -> Result<usize, NetError>;

    fn close(&self, handle: Handle) -> Result<(), NetError>;

    fn set_option(&self, handle: Handle, option: SockOpt) -> Result<(), NetError>;

    /// 查询句柄实际绑定的本地地址；无法报告的后端保持默认实现。
    fn local_addr(&self, handle: Handle) -> Result<SocketAddr, NetError> {
        let _ = handle;
        Err(NetError::unsupported("local address query"))
    }
}

/// 尚未安装后端时使用的兜底实现：所有操作都返回“no transport configured”。
#[derive(Clone, Copy, Debug, Default)]
pub struct NopDriver;

#[async_trait]
impl NetDriver for NopDriver {
    fn name(&self) -> &'static str {
        "nop"
    }

    async fn resolve_host(&self, _name: &str) -> Result<IpAddr, NetError> {
        Err(NetError::not_configured())
    }

    fn local_ip(&self) -> Result<IpAddr, NetError> {
        Err(NetError::not_configured())
    }

    fn socket(
        &self,
        _family: AddressFamily,
        _kind: SocketKind,
        _protocol: Protocol,
    ) -> Result<Handle, NetError> {
        Err(NetError::not_configured())
    }

    fn bind(&self, _handle: Handle, _addr: SocketAddr) -> Result<(), NetError> {
        Err(NetError::not_configured())
    }

    async fn connect(
        &self,
        _handle: Handle,
        _host: &str,
        _addr: SocketAddr,
        _deadline: Deadline,
    ) -> Result<(), NetError> {
        Err(NetError::not_configured())
    }

    fn listen(&self, _handle: Handle, _backlog: u32) -> Result<(), NetError> {
        Err(NetError::not_configured())
    }

    async fn accept(
        &self,
        _handle: Handle,
        _deadline: Deadline,
    ) -> Result<(Handle, SocketAddr), NetError> {
        Err(NetError::not_configured())
    }

    async fn send(
        &self,
        _handle: Handle,
        _buf: &[u8],
        _deadline: Deadline,
    ) -> Result<usize, NetError> {
        Err(NetError::not_configured())
    }

    async fn recv(
        &self,
        _handle: Handle,
        _buf: &mut [u8],
        _deadline: Deadline,
    ) -> Result<usize, NetError> {
        Err(NetError::not_configured())
    }

    fn close(&self, _handle: Handle) -> Result<(), NetError> {
        Err(NetError::not_configured())
    }

    fn set_option(&self, _handle: Handle, _option: SockOpt) -> Result<(), NetError> {
        Err(NetError::not_configured())
    }

    fn local_addr(&self, _handle: Handle) -> Result<SocketAddr, NetError> {
        Err(NetError::not_configured())
    }
}

fn _assert_driver_object_safe(_: &dyn NetDriver) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn nop_driver_reports_not_configured_everywhere() {
        let driver: &dyn NetDriver = &NopDriver;
        let handle = Handle::from_raw(1);
        let addr: SocketAddr = "127.0.0.1:80".parse().unwrap();

        let errors = vec![
            driver.resolve_host("example.test").await.unwrap_err(),
            driver.local_ip().unwrap_err(),
            driver
                .socket(AddressFamily::Inet, SocketKind::Stream, Protocol::Tcp)
                .unwrap_err(),
            driver.bind(handle, addr).unwrap_err(),
            driver
                .connect(handle, "", addr, Deadline::None)
                .await
                .unwrap_err(),
            driver.listen(handle, 5).unwrap_err(),
            driver.accept(handle, Deadline::None).await.unwrap_err(),
            driver.send(handle, b"x", Deadline::None).await.unwrap_err(),
            driver
                .recv(handle, &mut [0u8; 4], Deadline::None)
                .await
                .unwrap_err(),
            driver.close(handle).unwrap_err(),
            driver
                .set_option(handle, SockOpt::KeepAlive(true))
                .unwrap_err(),
            driver.local_addr(handle).unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::NotConfigured);
            assert_eq!(err.to_string(), "no transport configured");
        }
    }

    #[test]
    fn option_triples_follow_the_embedded_abi() {
        assert_eq!(SockOpt::KeepAlive(true).triple(), (1, 9, 1));
        assert_eq!(
            SockOpt::KeepAliveInterval(Duration::from_secs(15)).triple(),
            (6, 5, 30)
        );
        assert_eq!(
            SockOpt::Linger(Some(Duration::from_secs(3))).triple(),
            (1, 0xd, 3)
        );
        assert_eq!(Protocol::Udp.code(), 17);
        assert_eq!(SocketKind::Stream.code(), 1);
    }
}
