//! 单向字节管道与数据报信箱。
//!
//! 两者都只提供非阻塞的 `try_*` 原语：就绪时立即完成，否则返回 `Poll::Pending`，
//! 由调用方借助 [`netdev_transport::readiness::wait_until`] 在对应的 `Notify` 上挂起。
//! 每次 `try_*` 在同一把锁内完成检查与搬运，因此在任意 `.await` 点丢弃等待方都不会丢失字节。

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::task::Poll;

use netdev_transport::{ErrorKind, NetError, OperationKind};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// 有界单向字节管道。
#[derive(Debug)]
pub(crate) struct Pipe {
    state: Mutex<PipeState>,
    pub(crate) readable: Notify,
    pub(crate) writable: Notify,
}

#[derive(Debug)]
struct PipeState {
    data: VecDeque<u8>,
    capacity: usize,
    writer_closed: bool,
    reader_closed: bool,
}

impl Pipe {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PipeState {
                data: VecDeque::with_capacity(capacity.min(4096)),
                capacity,
                writer_closed: false,
                reader_closed: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// 读出尽可能多的字节；写端已关闭且无剩余数据时返回 `Ok(0)`。
    pub(crate) fn try_recv(&self, buf: &mut [u8]) -> Poll<Result<usize, NetError>> {
        let mut state = self.state.lock();
        if state.reader_closed {
            return Poll::Ready(Err(NetError::closed(OperationKind::RECV)));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if !state.data.is_empty() {
            let n = buf.len().min(state.data.len());
            for (slot, byte) in buf.iter_mut().zip(state.data.drain(..n)) {
                *slot = byte;
            }
            self.writable.notify_waiters();
            return Poll::Ready(Ok(n));
        }
        if state.writer_closed {
            return Poll::Ready(Ok(0));
        }
        Poll::Pending
    }

    /// 写入尽可能多的字节；管道已满时挂起，读端已关闭时返回连接重置。
    pub(crate) fn try_send(&self, buf: &[u8]) -> Poll<Result<usize, NetError>> {
        let mut state = self.state.lock();
        if state.writer_closed {
            return Poll::Ready(Err(NetError::closed(OperationKind::SEND)));
        }
        if state.reader_closed {
            return Poll::Ready(Err(NetError::new(
                ErrorKind::ConnectionReset,
                OperationKind::SEND.code,
                "connection reset by peer",
            )));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let space = state.capacity.saturating_sub(state.data.len());
        if space == 0 {
            return Poll::Pending;
        }
        let n = buf.len().min(space);
        state.data.extend(&buf[..n]);
        self.readable.notify_waiters();
        Poll::Ready(Ok(n))
    }

    pub(crate) fn close_reader(&self) {
        self.state.lock().reader_closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    pub(crate) fn close_writer(&self) {
        self.state.lock().writer_closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }
}

/// 数据报端点的接收队列。
#[derive(Debug)]
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    pub(crate) readable: Notify,
}

#[derive(Debug)]
struct MailboxState {
    queue: VecDeque<(SocketAddr, Vec<u8>)>,
    depth: usize,
    closed: bool,
}

impl Mailbox {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                depth,
                closed: false,
            }),
            readable: Notify::new(),
        }
    }

    /// 投递一个报文；队列已满或已关闭时丢弃并返回 `false`。
    pub(crate) fn deliver(&self, from: SocketAddr, payload: &[u8]) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.queue.len() >= state.depth {
            return false;
        }
        state.queue.push_back((from, payload.to_vec()));
        self.readable.notify_waiters();
        true
    }

    /// 取出下一个来自 `peer` 的报文，超出缓冲区的部分被截断；其他来源的报文被丢弃。
    pub(crate) fn try_recv(&self, peer: SocketAddr, buf: &mut [u8]) -> Poll<Result<usize, NetError>> {
        let mut state = self.state.lock();
        if state.closed {
            return Poll::Ready(Err(NetError::closed(OperationKind::RECV)));
        }
        while let Some((from, payload)) = state.queue.pop_front() {
            if !same_endpoint(peer, from) {
                continue;
            }
            let n = buf.len().min(payload.len());
            buf[..n].copy_from_slice(&payload[..n]);
            return Poll::Ready(Ok(n));
        }
        Poll::Pending
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.queue.clear();
        self.readable.notify_waiters();
    }
}

/// 端口相同且 IP 相同（任一侧为未指定地址视为匹配）。
pub(crate) fn same_endpoint(a: SocketAddr, b: SocketAddr) -> bool {
    a.port() == b.port() && (a.ip() == b.ip() || a.ip().is_unspecified() || b.ip().is_unspecified())
}
