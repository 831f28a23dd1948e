#![deny(unsafe_code)]
#![doc = r#"
# netdev-driver-loopback

## 使命（Why）
- 提供一个完全在进程内运行的传输后端，模拟“只有非阻塞原语”的事件驱动型设备：
  每个操作要么立即完成，要么报告 would block，由 [`netdev_transport::readiness::wait_until`]
  在 Tokio `Notify` 上挂起，不做固定间隔的睡眠轮询；
- 作为套接字层与一致性测试的默认测试后端，不依赖宿主机网络栈。

## 契约（What）
- [`LoopbackDriver`] 实现 [`netdev_transport::NetDriver`]，克隆共享同一张内存网络；
- [`LoopbackConfig`] 控制缓冲容量、数据报队列深度、本机地址与名称解析表。
"#]

mod config;
mod driver;
mod pipe;

pub use config::{LoopbackConfig, LoopbackConfigError};
pub use driver::LoopbackDriver;
