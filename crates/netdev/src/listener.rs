use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use netdev_transport::{
    CloseSignal, Deadline, EndpointAddr, Handle, NetAddr, NetDriver, NetError, Network,
    OperationKind,
};
use tokio::sync::watch;
use tracing::debug;

use crate::conn::SocketCore;
use crate::error::OpError;
use crate::stream::StreamSocket;

/// 流式监听器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 独占一个已进入监听状态的句柄，`accept` 是唯一推进状态的操作，每次产出一个新的 [`StreamSocket`]。
///
/// ## 契约（What）
/// - `accept` 阻塞直到有对端连入或截止时间到期；可从其他任务并发调用 [`Listener::close`]
///   打断阻塞中的 `accept`，后者以 `Closed` 错误返回；
/// - 产出的套接字携带后端报告的本地地址（无法报告时沿用监听地址）与对端地址；
/// - 配置了默认保活周期时，对新连接尽力开启保活，后端不支持不影响 accept 结果。
///
/// ## 逻辑（How）
/// - 与连接相同，截止时间存于 `watch` 通道，与关闭信号一起和后端 `accept` 竞速。
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    driver: Arc<dyn NetDriver>,
    handle: Handle,
    network: Network,
    local: NetAddr,
    keep_alive: Option<Duration>,
    deadline: watch::Sender<Deadline>,
    closed: CloseSignal,
}

impl Listener {
    pub(crate) fn new(
        driver: Arc<dyn NetDriver>,
        handle: Handle,
        network: Network,
        local: NetAddr,
        keep_alive: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                driver,
                handle,
                network,
                local,
                keep_alive,
                deadline: watch::Sender::new(Deadline::None),
                closed: CloseSignal::new(),
            }),
        }
    }

    pub async fn accept(&self) -> Result<StreamSocket, OpError> {
        let inner = &self.inner;
        let mut deadline_rx = inner.deadline.subscribe();
        let (handle, peer) = loop {
            let deadline = *deadline_rx.borrow_and_update();
            if inner.closed.is_closed() {
                return Err(inner.op_error("accept", NetError::closed(OperationKind::ACCEPT)));
            }
            if deadline.is_elapsed() {
                return Err(inner.op_error("accept", NetError::timeout(OperationKind::ACCEPT)));
            }

            tokio::select! {
                biased;
                _ = inner.closed.closed() => {
                    return Err(inner.op_error("accept", NetError::closed(OperationKind::ACCEPT)));
                }
                Ok(()) = deadline_rx.changed() => continue,
                result = inner.driver.accept(inner.handle, deadline) => {
                    break result.map_err(|error| inner.op_error("accept", error))?;
                }
            }
        };

        let local = inner
            .driver
            .local_addr(handle)
            .map(|addr| NetAddr::Stream(EndpointAddr::from(addr)))
            .unwrap_or_else(|_| inner.local.clone());
        let remote = NetAddr::Stream(EndpointAddr::from(peer));
        debug!(driver = inner.driver.name(), %handle, %local, %remote, "accepted connection");

        let socket = StreamSocket::new(SocketCore::new(
            Arc::clone(&inner.driver),
            handle,
            inner.network,
            local,
            remote,
        ));
        if let Some(period) = inner.keep_alive {
            crate::dial::enable_keep_alive(&socket, period);
        }
        Ok(socket)
    }

    /// 关闭监听器；进行中的 `accept` 立即返回。
    pub fn close(&self) -> Result<(), OpError> {
        let inner = &self.inner;
        if !inner.closed.close() {
            return Err(inner.op_error("close", NetError::closed(OperationKind::CLOSE)));
        }
        debug!(driver = inner.driver.name(), handle = %inner.handle, local = %inner.local, "listener closed");
        inner
            .driver
            .close(inner.handle)
            .map_err(|error| inner.op_error("close", error))
    }

    pub fn local_addr(&self) -> NetAddr {
        self.inner.local.clone()
    }

    /// 设置 `accept` 的截止时间，对阻塞中的 `accept` 立即生效。
    pub fn set_deadline(&self, deadline: Deadline) -> Result<(), OpError> {
        if self.inner.closed.is_closed() {
            return Err(self
                .inner
                .op_error("set", NetError::closed(OperationKind::ACCEPT)));
        }
        self.inner.deadline.send_replace(deadline);
        Ok(())
    }

    pub fn handle(&self) -> Handle {
        self.inner.handle
    }
}

impl ListenerInner {
    fn op_error(&self, op: &'static str, error: NetError) -> OpError {
        OpError::new(op, self.network.to_string(), error).with_local(self.local.clone())
    }
}

impl Drop for ListenerInner {
    fn drop(&mut self) {
        if self.closed.close() {
            if let Err(error) = self.driver.close(self.handle) {
                debug!(handle = %self.handle, %error, "listener close on drop failed");
            }
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("driver", &self.inner.driver.name())
            .field("handle", &self.inner.handle)
            .field("local", &self.inner.local)
            .finish()
    }
}
