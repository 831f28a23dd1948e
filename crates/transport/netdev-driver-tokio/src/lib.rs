#![deny(unsafe_code)]
#![doc = r#"
# netdev-driver-tokio

## 使命（Why）
- 以宿主机内核套接字实现 [`netdev_transport::NetDriver`]，让套接字层在普通操作系统上直接可用；
- 同时作为一致性测试的第二个真实后端，与回环后端互相印证行为。

## 契约（What）
- [`TokioDriver`] 必须在 Tokio 运行时上下文中使用：监听、UDP 绑定与所有异步操作都会向当前
  反应器注册；
- 阻塞操作与句柄的关闭信号、截止时间竞速，关闭或到期后立即返回；
- 数据报句柄不支持任何套接字选项，流式句柄支持保活、保活间隔与 linger，原始三元组一律返回
  `Unsupported`。
"#]

mod driver;
mod util;

pub use driver::TokioDriver;
