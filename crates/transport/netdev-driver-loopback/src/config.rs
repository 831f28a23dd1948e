use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 回环后端配置。
///
/// # 契约（What）
/// - `buffer_capacity`：每个方向的流管道容量（字节），写满后 `send` 挂起直到对端读取；
/// - `datagram_queue_depth`：每个数据报端点最多缓存的报文数，超出的报文被丢弃；
/// - `local_ip`：`local_ip()` 的返回值，也是 `localhost` 的解析结果；
/// - `hosts`：名称解析表，未命中的名称返回解析错误。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopbackConfig {
    pub buffer_capacity: usize,
    pub datagram_queue_depth: usize,
    pub local_ip: IpAddr,
    pub hosts: HashMap<String, IpAddr>,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 64 * 1024,
            datagram_queue_depth: 64,
            local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            hosts: HashMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoopbackConfigError {
    #[error("回环后端配置解析失败：{0}")]
    Parse(#[from] toml::de::Error),
    #[error("buffer_capacity 必须大于 0")]
    ZeroCapacity,
    #[error("datagram_queue_depth 必须大于 0")]
    ZeroQueueDepth,
}

impl LoopbackConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, LoopbackConfigError> {
        let config: LoopbackConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LoopbackConfigError> {
        if self.buffer_capacity == 0 {
            return Err(LoopbackConfigError::ZeroCapacity);
        }
        if self.datagram_queue_depth == 0 {
            return Err(LoopbackConfigError::ZeroQueueDepth);
        }
        Ok(())
    }

    /// 追加一条名称解析记录。
    pub fn with_host(mut self, name: impl Into<String>, ip: IpAddr) -> Self {
        self.hosts.insert(name.into(), ip);
        self
    }
}
