use std::sync::Arc;

use netdev_transport::{Deadline, Handle, NetAddr, NetError};

use crate::conn::{SocketCore, impl_conn};
use crate::error::OpError;

/// 已连接的数据报套接字。
///
/// 拨号时已经绑定本地端点并通过 `connect` 固定了默认目的地址，`read`/`write`
/// 只与该对端交换报文。向任意对端定址收发（`write_to`/`read_from`）对当前后端集合不可用，
/// 调用时显式返回 `Unimplemented`。
#[derive(Clone, Debug)]
pub struct DatagramSocket {
    inner: Arc<SocketCore>,
}

impl DatagramSocket {
    pub(crate) fn new(core: SocketCore) -> Self {
        Self {
            inner: Arc::new(core),
        }
    }

    /// 接收一个报文；缓冲区不足时报文被截断。
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, OpError> {
        self.inner.read(buf).await
    }

    /// 以单个报文发送 `buf`。
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

    pub async fn write_to(&self, _buf: &[u8], _addr: &NetAddr) -> Result<usize, OpError> {
        Err(self
            .inner
            .op_error("write", NetError::unimplemented("write to")))
    }

    pub async fn read_from(&self, _buf: &mut [u8]) -> Result<(usize, NetAddr), OpError> {
        Err(self
            .inner
            .op_error("read", NetError::unimplemented("read from")))
    }

    pub fn handle(&self) -> Handle {
        self.inner.handle()
    }
}

impl_conn!(DatagramSocket);
