#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# netdev-transport

## 使命（Why）
- 为 `netdev` 套接字层提供与具体后端无关的“传输能力”契约：无论字节最终经由内核套接字、
  嵌入式射频模组还是 preview-2 风格的非阻塞 API 流动，上层都只面向同一组操作。
- 把句柄、地址、截止时间与错误分类这些跨后端共享的概念集中定义，避免每个驱动各自发明一套。

## 契约（What）
- [`NetDriver`]：后端必须实现的异步能力接口（解析、建套接字、bind/connect/listen/accept、
  send/recv、close、选项设置）；[`NopDriver`] 是“尚未安装后端”时的兜底实现。
- [`Handle`] / [`HandleTable`]：句柄新类型与后端私有的句柄侧表，关闭后的句柄访问得到
  [`ErrorKind::InvalidHandle`]，绝不复用。
- [`Deadline`]：`None`/`Elapsed`/`At` 三态截止时间。
- [`EndpointAddr`]、[`NetAddr`]、[`Network`]：地址与网络种类的解析与格式化。
- [`NetError`]：带稳定错误码与分类的错误类型。
- [`NetConfig`]：可由 TOML 加载的套接字层配置。
- [`readiness::wait_until`] 与 [`CloseSignal`]：供“would block”型后端与套接字层复用的挂起原语。

## 实现策略（How）
- 异步接口统一使用 `async-trait` 保持对象安全，后端以 `Arc<dyn NetDriver>` 注入；
- 挂起点全部落在 Tokio 原生原语（`Notify`、`watch`、`timeout_at`）上，不做固定间隔轮询。
"#]

pub mod addr;
pub mod config;
pub mod deadline;
pub mod driver;
pub mod error;
pub mod handle;
pub mod network;
pub mod ports;
pub mod readiness;
pub mod signal;

pub use addr::{
    EndpointAddr, HostSpec, NetAddr, join_host_port, lookup_port, parse_endpoint, parse_port,
    split_host_port,
};
pub use config::{ConfigError, NetConfig, PortRange};
pub use deadline::Deadline;
pub use driver::{AddressFamily, NetDriver, NopDriver, Protocol, SockOpt, SocketKind, abi};
pub use error::{ErrorCategory, ErrorKind, NetError, OperationKind, map_io_error};
pub use handle::{Handle, HandleTable};
pub use network::{IpVersion, Network, UnixKind};
pub use ports::EphemeralPorts;
pub use signal::CloseSignal;

/// 统一的结果别名。
pub type Result<T, E = NetError> = std::result::Result<T, E>;
