use std::borrow::Cow;
use std::fmt;
use std::io;

use thiserror::Error;

/// 错误的细分类型，驱动与套接字层据此决定返回给调用方的语义。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 调用方需要在不解析文案的前提下区分“超时可重试”“连接已失效”“能力未实现”等情况；
/// - 不同后端（内核、嵌入式驱动、preview-2 API）报告的原始错误五花八门，统一映射到同一组枚举后，
///   上层逻辑与一致性测试才能以后端无关的方式断言。
///
/// ## 契约（What）
/// - `Timeout` 是唯一代表“截止时间已到”的变体，任何其他失败都不得复用它；
/// - `NotConfigured` 专指进程内尚未安装任何后端；
/// - 新增变体需同步更新 [`ErrorKind::category`]。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 未安装任何传输后端。
    NotConfigured,
    /// 网络种类字符串无法识别。
    UnknownNetwork,
    /// 地址文本格式错误（缺失端口、端口越界、非法字面量等）。
    AddrParse,
    /// 主机名解析失败。
    Resolution,
    /// 截止时间已到。
    Timeout,
    /// 套接字或监听器已关闭。
    Closed,
    /// 句柄不存在或已被释放。
    InvalidHandle,
    /// 对端拒绝连接。
    ConnectionRefused,
    /// 连接被重置或对端已停止接收。
    ConnectionReset,
    /// 本地地址已被占用。
    AddrInUse,
    /// 本地地址不可用。
    AddrNotAvailable,
    /// 远端地址为通配地址，不能作为拨号目标。
    WildcardRemote,
    /// 后端不支持该选项或该操作。
    Unsupported,
    /// 套接字层尚未实现的能力面（定址收发、原始 IP、Unix 套接字等）。
    Unimplemented,
    /// 其他 IO 失败。
    Io,
}

/// 面向调用方的粗粒度错误分类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 配置类：未安装后端、网络种类或地址文本非法，永不重试。
    Configuration,
    /// 名称解析失败。
    Resolution,
    /// 截止时间到期，调用方可重设截止时间后重试。
    Timeout,
    /// 后端报告的连接级失败。
    Connection,
    /// 未实现或不支持的能力面。
    Unimplemented,
}

impl ErrorKind {
    /// 将细分类型折叠为粗粒度分类。
    pub const fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::NotConfigured
            | ErrorKind::UnknownNetwork
            | ErrorKind::AddrParse
            | ErrorKind::WildcardRemote => ErrorCategory::Configuration,
            ErrorKind::Resolution => ErrorCategory::Resolution,
            ErrorKind::Timeout => ErrorCategory::Timeout,
            ErrorKind::Closed
            | ErrorKind::InvalidHandle
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::AddrInUse
            | ErrorKind::AddrNotAvailable
            | ErrorKind::Io => ErrorCategory::Connection,
            ErrorKind::Unsupported | ErrorKind::Unimplemented => ErrorCategory::Unimplemented,
        }
    }
}

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

impl OperationKind {
    pub const RESOLVE: OperationKind = OperationKind {
        code: "netdev.driver.resolve_failed",
        message: "resolve",
    };
    pub const SOCKET: OperationKind = OperationKind {
        code: "netdev.driver.socket_failed",
        message: "socket",
    };
    pub const BIND: OperationKind = OperationKind {
        code: "netdev.driver.bind_failed",
        message: "bind",
    };
    pub const CONNECT: OperationKind = OperationKind {
        code: "netdev.driver.connect_failed",
        message: "connect",
    };
    pub const LISTEN: OperationKind = OperationKind {
        code: "netdev.driver.listen_failed",
        message: "listen",
    };
    pub const ACCEPT: OperationKind = OperationKind {
        code: "netdev.driver.accept_failed",
        message: "accept",
    };
    pub const SEND: OperationKind = OperationKind {
        code: "netdev.driver.send_failed",
        message: "send",
    };
    pub const RECV: OperationKind = OperationKind {
        code: "netdev.driver.recv_failed",
        message: "recv",
    };
    pub const CLOSE: OperationKind = OperationKind {
        code: "netdev.driver.close_failed",
        message: "close",
    };
    pub const SET_OPTION: OperationKind = OperationKind {
        code: "netdev.driver.set_option_failed",
        message: "set option",
    };
}

const TIMEOUT_CODE: &str = "netdev.timeout";
const CLOSED_CODE: &str = "netdev.closed";
const NOT_CONFIGURED_CODE: &str = "netdev.driver.not_configured";
const INVALID_HANDLE_CODE: &str = "netdev.driver.invalid_handle";
const UNSUPPORTED_CODE: &str = "netdev.driver.unsupported";
const UNIMPLEMENTED_CODE: &str = "netdev.unimplemented";
const UNKNOWN_NETWORK_CODE: &str = "netdev.addr.unknown_network";
const ADDR_PARSE_CODE: &str = "netdev.addr.parse_failed";
const RESOLUTION_CODE: &str = "netdev.addr.lookup_failed";
const WILDCARD_REMOTE_CODE: &str = "netdev.addr.wildcard_remote";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 传输层统一错误。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 同时携带稳定错误码（供日志与告警聚合）、可读文案（供终端用户）和细分类型（供程序分支）；
/// - 保留原始错误作为 `source`，不丢失后端给出的诊断细节。
///
/// ## 契约（What）
/// - `code` 采用 `netdev.<area>.<reason>` 形式，发布后保持稳定；
/// - [`NetError::is_timeout`] 为真当且仅当 `kind == ErrorKind::Timeout`；
/// - `Display` 只输出 `message`，上下文（操作、地址）由套接字层的 `OpError` 追加。
#[derive(Debug, Error)]
#[error("{message}")]
pub struct NetError {
    kind: ErrorKind,
    code: &'static str,
    message: Cow<'static, str>,
    #[source]
    source: Option<BoxError>,
}

impl NetError {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            source: None,
        }
    }

    /// 附加底层错误。
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    /// 进程内尚未安装后端。
    pub fn not_configured() -> Self {
        Self::new(
            ErrorKind::NotConfigured,
            NOT_CONFIGURED_CODE,
            "no transport configured",
        )
    }

    pub fn timeout(op: OperationKind) -> Self {
        Self::new(
            ErrorKind::Timeout,
            TIMEOUT_CODE,
            format!("{} timed out", op.message),
        )
    }

    pub fn closed(op: OperationKind) -> Self {
        Self::new(
            ErrorKind::Closed,
            CLOSED_CODE,
            format!("{} on closed socket", op.message),
        )
    }

    pub fn invalid_handle(handle: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidHandle,
            INVALID_HANDLE_CODE,
            format!("invalid handle {handle}"),
        )
    }

    pub fn unsupported(what: impl Into<Cow<'static, str>>) -> Self {
        let what = what.into();
        Self::new(
            ErrorKind::Unsupported,
            UNSUPPORTED_CODE,
            format!("{what} not supported by backend"),
        )
    }

    pub fn unimplemented(what: &'static str) -> Self {
        Self::new(
            ErrorKind::Unimplemented,
            UNIMPLEMENTED_CODE,
            format!("{what} not implemented"),
        )
    }

    pub fn unknown_network(network: &str) -> Self {
        Self::new(
            ErrorKind::UnknownNetwork,
            UNKNOWN_NETWORK_CODE,
            format!("unknown network {network}"),
        )
    }

    pub fn addr_parse(address: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::AddrParse,
            ADDR_PARSE_CODE,
            format!("address {address}: {reason}"),
        )
    }

    pub fn resolution(host: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::Resolution,
            RESOLUTION_CODE,
            format!("lookup of host name '{host}' failed: {reason}"),
        )
    }

    pub fn wildcard_remote() -> Self {
        Self::new(
            ErrorKind::WildcardRemote,
            WILDCARD_REMOTE_CODE,
            "remote address is a wildcard; dialing the local host is not supported",
        )
    }
}

/// 将 IO 错误映射为 [`NetError`]，并附带错误分类。
pub fn map_io_error(op: OperationKind, error: io::Error) -> NetError {
    let kind = categorize_io_error(&error);
    if kind == ErrorKind::Timeout {
        return NetError::timeout(op).with_source(error);
    }
    NetError::new(kind, op.code, format!("{}: {}", op.message, error)).with_source(error)
}

fn categorize_io_error(error: &io::Error) -> ErrorKind {
    use io::ErrorKind as Io;
    match error.kind() {
        Io::TimedOut => ErrorKind::Timeout,
        Io::ConnectionRefused => ErrorKind::ConnectionRefused,
        Io::ConnectionReset | Io::ConnectionAborted | Io::BrokenPipe | Io::UnexpectedEof => {
            ErrorKind::ConnectionReset
        }
        Io::AddrInUse => ErrorKind::AddrInUse,
        Io::AddrNotAvailable => ErrorKind::AddrNotAvailable,
        Io::NotConnected => ErrorKind::Closed,
        Io::Unsupported => ErrorKind::Unsupported,
        Io::InvalidInput => ErrorKind::AddrParse,
        _ => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeout_maps_to_timeout_kind() {
        let err = map_io_error(
            OperationKind::RECV,
            io::Error::new(io::ErrorKind::TimedOut, "slow"),
        );
        assert!(err.is_timeout());
        assert_eq!(err.code(), "netdev.timeout");
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn refused_is_a_connection_error() {
        let err = map_io_error(
            OperationKind::CONNECT,
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
        assert_eq!(err.code(), "netdev.driver.connect_failed");
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn configuration_kinds_are_never_timeouts() {
        for err in [
            NetError::not_configured(),
            NetError::unknown_network("bogus"),
            NetError::addr_parse("x", "missing port in address"),
        ] {
            assert!(!err.is_timeout());
            assert_eq!(err.category(), ErrorCategory::Configuration);
        }
        assert_eq!(NetError::not_configured().to_string(), "no transport configured");
    }
}
