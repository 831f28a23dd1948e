use std::fmt;

use netdev_transport::{ErrorCategory, ErrorKind, NetAddr, NetError};

/// 套接字层对外暴露的错误：在底层 [`NetError`] 之上附加操作名、网络种类与两端地址。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 用户可见的报错需要回答“哪个操作、在哪条连接上、因为什么失败”；
///   底层错误只知道原因，上下文只有套接字层掌握。
///
/// ## 契约（What）
/// - `op` 取值 `dial`/`listen`/`accept`/`read`/`write`/`close`/`set`；
/// - [`OpError::is_timeout`] 与底层 [`NetError::is_timeout`] 一致，调用方据此重设截止时间后重试；
/// - `Display` 形如 `read tcp 10.0.0.2:49152->10.0.0.1:80: recv timed out`，缺失的地址被省略。
#[derive(Debug)]
pub struct OpError {
    op: &'static str,
    net: String,
    local: Option<NetAddr>,
    remote: Option<NetAddr>,
    error: NetError,
}

impl OpError {
    pub fn new(op: &'static str, net: impl Into<String>, error: NetError) -> Self {
        Self {
            op,
            net: net.into(),
            local: None,
            remote: None,
            error,
        }
    }

    pub fn with_local(mut self, local: NetAddr) -> Self {
        self.local = (!local.is_unspecified()).then_some(local);
        self
    }

    pub fn with_remote(mut self, remote: NetAddr) -> Self {
        self.remote = (!remote.is_unspecified()).then_some(remote);
        self
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn net(&self) -> &str {
        &self.net
    }

    pub fn local(&self) -> Option<&NetAddr> {
        self.local.as_ref()
    }

    pub fn remote(&self) -> Option<&NetAddr> {
        self.remote.as_ref()
    }

    pub fn error(&self) -> &NetError {
        &self.error
    }

    pub fn into_error(self) -> NetError {
        self.error
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn category(&self) -> ErrorCategory {
        self.error.category()
    }

    pub fn is_timeout(&self) -> bool {
        self.error.is_timeout()
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op)?;
        if !self.net.is_empty() {
            write!(f, " {}", self.net)?;
        }
        if let Some(local) = &self.local {
            write!(f, " {local}")?;
        }
        if let Some(remote) = &self.remote {
            let sep = if self.local.is_some() { "->" } else { " " };
            write!(f, "{sep}{remote}")?;
        }
        write!(f, ": {}", self.error)
    }
}

impl std::error::Error for OpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdev_transport::{EndpointAddr, OperationKind};

    #[test]
    fn display_includes_both_endpoints() {
        let local = NetAddr::Stream(EndpointAddr::new("10.0.0.2".parse().unwrap(), 49152));
        let remote = NetAddr::Stream(EndpointAddr::new("10.0.0.1".parse().unwrap(), 80));
        let err = OpError::new("read", "tcp", NetError::timeout(OperationKind::RECV))
            .with_local(local)
            .with_remote(remote);
        assert_eq!(
            err.to_string(),
            "read tcp 10.0.0.2:49152->10.0.0.1:80: recv timed out"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn display_without_local() {
        let remote = NetAddr::Datagram(EndpointAddr::new("10.0.0.1".parse().unwrap(), 53));
        let err = OpError::new("dial", "udp", NetError::not_configured())
            .with_local(NetAddr::Unspecified)
            .with_remote(remote);
        assert_eq!(err.to_string(), "dial udp 10.0.0.1:53: no transport configured");
        assert!(err.local().is_none());
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
