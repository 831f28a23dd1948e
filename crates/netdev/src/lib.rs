#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# netdev

## 使命（Why）
- 在可替换的传输后端之上提供熟悉的套接字编程模型：拨号、监听、读写、截止时间、关闭；
- 同一套上层代码既能跑在宿主机 Tokio 套接字上，也能跑在进程内回环后端或受限设备驱动上。

## 契约（What）
- [`Net`]：携带后端与配置的能力对象，所有操作的起点；
- [`Conn`]：流式与数据报连接共享的对象安全接口，`dial` 返回 `Arc<dyn Conn>`；
- [`StreamSocket`]、[`DatagramSocket`]、[`Listener`]：具体套接字类型；
- [`Dialer`]：超时、本地地址与保活策略；
- [`install`]/[`default_net`] 与自由函数 [`dial`]/[`dial_timeout`]/[`listen`]：进程级默认实例，
  只允许安装一次，未安装时所有操作返回“no transport configured”；
- 所有失败都以 [`OpError`] 返回，附带操作名、网络名与两端地址。

## 实现策略（How）
- 读写截止时间存放在 `watch` 通道中，进行中的操作与截止时间变化、关闭信号竞速，
  因此截止时间调整与并发关闭都会立即作用于阻塞中的调用；
- 拨号与监听流程中途失败时先关闭已分配的句柄再返回错误，不泄漏后端资源。
"#]

mod conn;
mod datagram;
mod dial;
mod error;
mod global;
mod listener;
mod stream;

pub use conn::Conn;
pub use datagram::DatagramSocket;
pub use dial::{Dialer, KeepAlive, Net};
pub use error::OpError;
pub use global::{InstallError, default_net, dial, dial_timeout, install, install_net, listen};
pub use listener::Listener;
pub use stream::StreamSocket;

pub use netdev_transport as transport;
pub use netdev_transport::{
    ConfigError, Deadline, EndpointAddr, ErrorCategory, ErrorKind, NetAddr, NetConfig, NetDriver, NetError,
    Network,
};
