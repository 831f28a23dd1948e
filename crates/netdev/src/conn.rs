use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use netdev_transport::{
    CloseSignal, Deadline, Handle, NetAddr, NetDriver, NetError, Network, OperationKind, SockOpt,
};
use tokio::sync::watch;
use tracing::debug;

use crate::error::OpError;

/// 面向连接的通用套接字接口，流式与数据报套接字都实现它。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 调用方（含一致性测试）只面向这一接口编程，不关心背后是流还是数据报、是哪种后端；
/// - 对象安全，`dial` 直接返回 `Arc<dyn Conn>` 供多个任务共享。
///
/// ## 契约（What）
/// - `read`/`write` 各执行恰好一次底层收发，并遵守当前生效的读/写截止时间；
///   `write` 可能只写出部分数据，调用方需循环；`read` 返回 `Ok(0)` 仅表示对端已结束发送；
/// - `close` 释放句柄并使其他任务中阻塞的 `read`/`write` 立即以错误返回；第二次关闭返回 `Closed` 错误；
/// - 截止时间可在任意时刻、从任意任务设置，并对进行中的操作立即生效；
/// - `local_addr`/`remote_addr` 返回保存的地址，既不阻塞也不失败。
#[async_trait]
pub trait Conn: Send + Sync + fmt::Debug {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, OpError>;

    async fn write(&self, buf: &[u8]) -> Result<usize, OpError>;

    fn close(&self) -> Result<(), OpError>;

    fn local_addr(&self) -> NetAddr;

    fn remote_addr(&self) -> NetAddr;

    /// 同时设置读、写截止时间。
    fn set_deadline(&self, deadline: Deadline) -> Result<(), OpError>;

    fn set_read_deadline(&self, deadline: Deadline) -> Result<(), OpError>;

    fn set_write_deadline(&self, deadline: Deadline) -> Result<(), OpError>;
}

fn _assert_conn_object_safe(_: &dyn Conn) {}

/// 流式与数据报套接字共享的核心：独占一个句柄、两条独立的截止时间与关闭信号。
///
/// # 教案级注释
///
/// ## 逻辑（How）
/// - 读、写截止时间各存于一个 `watch` 通道；进行中的操作订阅对应通道，
///   把后端调用与“截止时间变化”“关闭信号”三者竞速；
/// - 截止时间变化时丢弃进行中的后端 future（后端保证取消安全），以新截止时间重新发起；
///   新截止时间若已过期，下一轮开始前即返回超时；
/// - 读只观察读截止时间、写只观察写截止时间，二者互不干扰。
///
/// ## 注意事项（Trade-offs）
/// - 关闭后句柄由后端侧表注销，进行中的后端调用自行以错误结束，这里不等待它们；
/// - 析构时若尚未关闭则补一次关闭，保证句柄不泄漏。
pub(crate) struct SocketCore {
    driver: Arc<dyn NetDriver>,
    handle: Handle,
    network: Network,
    local: NetAddr,
    remote: NetAddr,
    read_deadline: watch::Sender<Deadline>,
    write_deadline: watch::Sender<Deadline>,
    closed: CloseSignal,
}

impl SocketCore {
    pub(crate) fn new(
        driver: Arc<dyn NetDriver>,
        handle: Handle,
        network: Network,
        local: NetAddr,
        remote: NetAddr,
    ) -> Self {
        Self {
            driver,
            handle,
            network,
            local,
            remote,
            read_deadline: watch::Sender::new(Deadline::None),
            write_deadline: watch::Sender::new(Deadline::None),
            closed: CloseSignal::new(),
        }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn network(&self) -> Network {
        self.network
    }

    pub(crate) fn local_addr(&self) -> NetAddr {
        self.local.clone()
    }

    pub(crate) fn remote_addr(&self) -> NetAddr {
        self.remote.clone()
    }

    pub(crate) fn op_error(&self, op: &'static str, error: NetError) -> OpError {
        OpError::new(op, self.network.to_string(), error)
            .with_local(self.local.clone())
            .with_remote(self.remote.clone())
    }

    pub(crate) async fn read(&self, buf: &mut [u8]) -> Result<usize, OpError> {
        let mut deadline_rx = self.read_deadline.subscribe();
        loop {
            let deadline = *deadline_rx.borrow_and_update();
            if self.closed.is_closed() {
                return Err(self.op_error("read", NetError::closed(OperationKind::RECV)));
            }
            if deadline.is_elapsed() {
                return Err(self.op_error("read", NetError::timeout(OperationKind::RECV)));
            }

            tokio::select! {
                biased;
                _ = self.closed.closed() => {
                    return Err(self.op_error("read", NetError::closed(OperationKind::RECV)));
                }
                Ok(()) = deadline_rx.changed() => continue,
                result = self.driver.recv(self.handle, &mut *buf, deadline) => {
                    return result.map_err(|error| self.op_error("read", error));
                }
            }
        }
    }

    pub(crate) async fn write(&self, buf: &[u8]) -> Result<usize, OpError> {
        let mut deadline_rx = self.write_deadline.subscribe();
        loop {
            let deadline = *deadline_rx.borrow_and_update();
            if self.closed.is_closed() {
                return Err(self.op_error("write", NetError::closed(OperationKind::SEND)));
            }
            if deadline.is_elapsed() {
                return Err(self.op_error("write", NetError::timeout(OperationKind::SEND)));
            }

            tokio::select! {
                biased;
                _ = self.closed.closed() => {
                    return Err(self.op_error("write", NetError::closed(OperationKind::SEND)));
                }
                Ok(()) = deadline_rx.changed() => continue,
                result = self.driver.send(self.handle, buf, deadline) => {
                    return result.map_err(|error| self.op_error("write", error));
                }
            }
        }
    }

    pub(crate) fn close(&self) -> Result<(), OpError> {
        if !self.closed.close() {
            return Err(self.op_error("close", NetError::closed(OperationKind::CLOSE)));
        }
        debug!(driver = self.driver.name(), handle = %self.handle, local = %self.local, remote = %self.remote, "socket closed");
        self.driver
            .close(self.handle)
            .map_err(|error| self.op_error("close", error))
    }

    fn ensure_open(&self, op: &'static str, kind: OperationKind) -> Result<(), OpError> {
        if self.closed.is_closed() {
            Err(self.op_error(op, NetError::closed(kind)))
        } else {
            Ok(())
        }
    }

    pub(crate) fn set_read_deadline(&self, deadline: Deadline) -> Result<(), OpError> {
        self.ensure_open("set", OperationKind::RECV)?;
        self.read_deadline.send_replace(deadline);
        Ok(())
    }

    pub(crate) fn set_write_deadline(&self, deadline: Deadline) -> Result<(), OpError> {
        self.ensure_open("set", OperationKind::SEND)?;
        self.write_deadline.send_replace(deadline);
        Ok(())
    }

    pub(crate) fn set_deadline(&self, deadline: Deadline) -> Result<(), OpError> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }

    pub(crate) fn set_option(&self, option: SockOpt) -> Result<(), OpError> {
        self.ensure_open("set", OperationKind::SET_OPTION)?;
        self.driver
            .set_option(self.handle, option)
            .map_err(|error| self.op_error("set", error))
    }
}

impl Drop for SocketCore {
    fn drop(&mut self) {
        if self.closed.close() {
            if let Err(error) = self.driver.close(self.handle) {
                debug!(handle = %self.handle, %error, "close on drop failed");
            }
        }
    }
}

impl fmt::Debug for SocketCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketCore")
            .field("driver", &self.driver.name())
            .field("handle", &self.handle)
            .field("network", &self.network)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("closed", &self.closed.is_closed())
            .finish()
    }
}

/// 为包裹 `Arc<SocketCore>` 的套接字类型生成 [`Conn`] 实现。
macro_rules! impl_conn {
    ($ty:ty) => {
        #[async_trait::async_trait]
        impl $crate::conn::Conn for $ty {
            async fn read(&self, buf: &mut [u8]) -> Result<usize, $crate::OpError> {
                self.inner.read(buf).await
            }

            async fn write(&self, buf: &[u8]) -> Result<usize, $crate::OpError> {
                self.inner.write(buf).await
            }

            fn close(&self) -> Result<(), $crate::OpError> {
                self.inner.close()
            }

            fn local_addr(&self) -> netdev_transport::NetAddr {
                self.inner.local_addr()
            }

            fn remote_addr(&self) -> netdev_transport::NetAddr {
                self.inner.remote_addr()
            }

            fn set_deadline(
                &self,
                deadline: netdev_transport::Deadline,
            ) -> Result<(), $crate::OpError> {
                self.inner.set_deadline(deadline)
            }

            fn set_read_deadline(
                &self,
                deadline: netdev_transport::Deadline,
            ) -> Result<(), $crate::OpError> {
                self.inner.set_read_deadline(deadline)
            }

            fn set_write_deadline(
                &self,
                deadline: netdev_transport::Deadline,
            ) -> Result<(), $crate::OpError> {
                self.inner.set_write_deadline(deadline)
            }
        }
    };
}

pub(crate) use impl_conn;
