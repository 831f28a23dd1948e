use std::sync::Arc;
use std::time::Duration;

use netdev_transport::{Deadline, Handle, NetAddr, NetError, SockOpt};

use crate::conn::{SocketCore, impl_conn};
use crate::error::OpError;

/// 面向连接的流式套接字。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 在任意传输后端之上提供与内核 TCP 套接字一致的使用体验：独立的读写截止时间、
///   可被并发关闭打断的阻塞读写、可查询的两端地址。
///
/// ## 逻辑 (How)
/// - 内部以 `Arc` 共享 [`SocketCore`]，克隆后的句柄指向同一连接，可分发到多个任务；
/// - 读写、截止时间与关闭全部委托给核心；保活与 linger 经后端的选项接口下发。
///
/// ## 契约 (What)
/// - 由 [`crate::Net::dial`] 或 [`crate::Listener::accept`] 创建；
/// - 最后一个克隆被丢弃时若尚未关闭，会自动释放句柄；
/// - `set_keep_alive`/`set_keep_alive_period`/`set_linger` 在后端不支持时返回
///   `Unsupported` 错误，不会静默忽略。
#[derive(Clone, Debug)]
pub struct StreamSocket {
    inner: Arc<SocketCore>,
}

impl StreamSocket {
    pub(crate) fn new(core: SocketCore) -> Self {
        Self {
            inner: Arc::new(core),
        }
    }

    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, OpError> {
        self.inner.read(buf).await
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize, OpError> {
        self.inner.write(buf).await
    }

    pub fn close(&self) -> Result<(), OpError> {
        self.inner.close()
    }

    pub fn local_addr(&self) -> NetAddr {
        self.inner.local_addr()
    }

    pub fn remote_addr(&self) -> NetAddr {
        self.inner.remote_addr()
    }

    pub fn set_deadline(&self, deadline: Deadline) -> Result<(), OpError> {
        self.inner.set_deadline(deadline)
    }

    pub fn set_read_deadline(&self, deadline: Deadline) -> Result<(), OpError> {
        self.inner.set_read_deadline(deadline)
    }

    pub fn set_write_deadline(&self, deadline: Deadline) -> Result<(), OpError> {
        self.inner.set_write_deadline(deadline)
    }

    /// 开关 TCP 保活。
    pub fn set_keep_alive(&self, enabled: bool) -> Result<(), OpError> {
        self.inner.set_option(SockOpt::KeepAlive(enabled))
    }

    /// 设置保活探测间隔；下发给后端时以半秒为单位。
    pub fn set_keep_alive_period(&self, period: Duration) -> Result<(), OpError> {
        self.inner.set_option(SockOpt::KeepAliveInterval(period))
    }

    pub fn set_linger(&self, linger: Option<Duration>) -> Result<(), OpError> {
        self.inner.set_option(SockOpt::Linger(linger))
    }

    /// 半关闭写方向，当前未实现。
    pub fn close_write(&self) -> Result<(), OpError> {
        Err(self
            .inner
            .op_error("close", NetError::unimplemented("close write")))
    }

    pub fn handle(&self) -> Handle {
        self.inner.handle()
    }

    pub fn network(&self) -> netdev_transport::Network {
        self.inner.network()
    }
}

impl_conn!(StreamSocket);
