//! 进程级默认实例。
//!
//! 嵌入式目标与简单程序往往只有一个传输后端，启动阶段安装一次，之后各处直接调用
//! [`dial`]/[`listen`]。需要多个后端并存时应直接构造 [`Net`] 并显式传递。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use netdev_transport::NetDriver;
use thiserror::Error;
use tracing::debug;

use crate::conn::Conn;
use crate::dial::Net;
use crate::error::OpError;
use crate::listener::Listener;

static DEFAULT_NET: OnceLock<Net> = OnceLock::new();

/// 安装默认实例失败。
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("默认传输后端已安装（当前后端：{existing}）")]
    AlreadyInstalled { existing: &'static str },
}

/// 以默认配置安装进程级后端；只能成功一次。
pub fn install(driver: Arc<dyn NetDriver>) -> Result<(), InstallError> {
    install_net(Net::new(driver))
}

/// 安装预先构造好的 [`Net`]；只能成功一次。
pub fn install_net(net: Net) -> Result<(), InstallError> {
    let name = net.driver().name();
    DEFAULT_NET.set(net).map_err(|_| InstallError::AlreadyInstalled {
        existing: DEFAULT_NET
            .get()
            .map_or("unknown", |existing| existing.driver().name()),
    })?;
    debug!(driver = name, "default transport installed");
    Ok(())
}

/// 返回进程级默认实例；未安装时返回绑定空后端的实例。
pub fn default_net() -> Net {
    DEFAULT_NET.get().cloned().unwrap_or_else(Net::unconfigured)
}

pub async fn dial(network: &str, address: &str) -> Result<Arc<dyn Conn>, OpError> {
    default_net().dial(network, address).await
}

pub async fn dial_timeout(
    network: &str,
    address: &str,
    timeout: Duration,
) -> Result<Arc<dyn Conn>, OpError> {
    default_net().dial_timeout(network, address, timeout).await
}

pub async fn listen(network: &str, address: &str) -> Result<Listener, OpError> {
    default_net().listen(network, address).await
}
