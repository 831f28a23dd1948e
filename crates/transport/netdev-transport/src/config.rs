use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 端口区间，闭区间 `[start, end]`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 49152,
            end: 65535,
        }
    }
}

/// 套接字层配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把 listen backlog、默认保活周期、临时端口区间这些散落的魔数集中到可审计的配置里，
///   嵌入式部署与测试可以各自覆写。
///
/// ## 契约（What）
/// - 默认值：`listen_backlog = 5`、`keep_alive_secs = 15`、`ephemeral_ports = 49152..=65535`、
///   `copy_chunk = 1024`；
/// - `keep_alive_secs = 0` 表示拨号与 accept 时不主动开启保活；
/// - [`NetConfig::from_toml_str`] 拒绝未知字段、零 backlog、零拷贝块与倒置的端口区间。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetConfig {
    pub listen_backlog: u32,
    pub keep_alive_secs: u64,
    pub ephemeral_ports: PortRange,
    pub copy_chunk: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            listen_backlog: 5,
            keep_alive_secs: 15,
            ephemeral_ports: PortRange::default(),
            copy_chunk: 1024,
        }
    }
}

/// 配置加载错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置解析失败：{0}")]
    Parse(#[from] toml::de::Error),
    #[error("临时端口区间非法：{start}..={end}")]
    InvalidPortRange { start: u16, end: u16 },
    #[error("listen_backlog 必须大于 0")]
    ZeroBacklog,
    #[error("copy_chunk 必须大于 0")]
    ZeroChunk,
}

impl NetConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: NetConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let PortRange { start, end } = self.ephemeral_ports;
        if start == 0 || start > end {
            return Err(ConfigError::InvalidPortRange { start, end });
        }
        if self.listen_backlog == 0 {
            return Err(ConfigError::ZeroBacklog);
        }
        if self.copy_chunk == 0 {
            return Err(ConfigError::ZeroChunk);
        }
        Ok(())
    }

    /// 默认保活周期；`None` 表示不主动开启。
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = NetConfig::from_toml_str("").unwrap();
        assert_eq!(config, NetConfig::default());
        assert_eq!(config.keep_alive(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn overrides_and_disabled_keep_alive() {
        let config = NetConfig::from_toml_str(
            r#"
            listen_backlog = 16
            keep_alive_secs = 0

            [ephemeral_ports]
            start = 40000
            end = 40010
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_backlog, 16);
        assert_eq!(config.keep_alive(), None);
        assert_eq!(config.ephemeral_ports, PortRange { start: 40000, end: 40010 });
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(
            NetConfig::from_toml_str("listen_backlog = 0"),
            Err(ConfigError::ZeroBacklog)
        ));
        assert!(matches!(
            NetConfig::from_toml_str("[ephemeral_ports]\nstart = 600\nend = 500"),
            Err(ConfigError::InvalidPortRange { start: 600, end: 500 })
        ));
        assert!(matches!(
            NetConfig::from_toml_str("backlog = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
