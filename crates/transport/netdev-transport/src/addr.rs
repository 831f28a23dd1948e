use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

use crate::error::NetError;

/// 面向流或数据报的端点地址。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 在 TCP/UDP 风格的后端之间提供同一种端点表达：IP 可以缺省（通配），IPv6 可以带链路本地 zone；
/// - 与 `std::net::SocketAddr` 的区别在于保留“未指定 IP”与 zone 名称这两类文本层信息，
///   以便 `Display` 能还原用户给出的形式。
///
/// ## 契约（What）
/// - `ip == None` 或 IP 为全零地址时，[`EndpointAddr::is_wildcard`] 为真；通配地址只可作为本地绑定目标；
/// - `Display` 输出 `host:port`：IPv6 以方括号包裹、zone 以 `%` 追加、通配地址输出为 `:port`。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct EndpointAddr {
    ip: Option<IpAddr>,
    zone: Option<String>,
    port: u16,
}

impl EndpointAddr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip: Some(ip),
            zone: None,
            port,
        }
    }

    /// 不带 IP 的通配端点。
    pub fn wildcard(port: u16) -> Self {
        Self {
            ip: None,
            zone: None,
            port,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        let zone = zone.into();
        self.zone = (!zone.is_empty()).then_some(zone);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_wildcard(&self) -> bool {
        self.ip.is_none_or(|ip| ip.is_unspecified())
    }

    /// 转换为标准库地址；缺省 IP 按 `fallback` 地址族的未指定地址处理。
    ///
    /// 数值型 zone 会写入 IPv6 的 `scope_id`，名称型 zone 无法在此表达，按 0 处理。
    pub fn to_socket_addr(&self, fallback: IpAddr) -> SocketAddr {
        match self.ip.unwrap_or(unspecified_like(fallback)) {
            IpAddr::V6(v6) => {
                let scope = self
                    .zone
                    .as_deref()
                    .and_then(|zone| zone.parse::<u32>().ok())
                    .unwrap_or(0);
                SocketAddr::V6(SocketAddrV6::new(v6, self.port, 0, scope))
            }
            v4 => SocketAddr::new(v4, self.port),
        }
    }
}

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

impl From<SocketAddr> for EndpointAddr {
    fn from(addr: SocketAddr) -> Self {
        let endpoint = EndpointAddr::new(addr.ip(), addr.port());
        match addr {
            SocketAddr::V6(v6) if v6.scope_id() != 0 => endpoint.with_zone(v6.scope_id().to_string()),
            _ => endpoint,
        }
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = match (&self.ip, &self.zone) {
            (None, _) => String::new(),
            (Some(ip), None) => ip.to_string(),
            (Some(ip), Some(zone)) => format!("{ip}%{zone}"),
        };
        f.write_str(&join_host_port(&host, &self.port.to_string()))
    }
}

/// 套接字层的地址和类型。
///
/// `Unspecified` 表示“没有地址”，例如未显式绑定的拨号端本地地址且后端无法报告时。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum NetAddr {
    Stream(EndpointAddr),
    Datagram(EndpointAddr),
    RawIp {
        ip: Option<IpAddr>,
        zone: Option<String>,
    },
    #[default]
    Unspecified,
}

impl NetAddr {
    /// 地址所属网络族名。
    pub fn network(&self) -> &'static str {
        match self {
            NetAddr::Stream(_) => "tcp",
            NetAddr::Datagram(_) => "udp",
            NetAddr::RawIp { .. } => "ip",
            NetAddr::Unspecified => "",
        }
    }

    pub fn endpoint(&self) -> Option<&EndpointAddr> {
        match self {
            NetAddr::Stream(endpoint) | NetAddr::Datagram(endpoint) => Some(endpoint),
            _ => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        match self {
            NetAddr::Stream(endpoint) | NetAddr::Datagram(endpoint) => endpoint.is_wildcard(),
            NetAddr::RawIp { ip, .. } => ip.is_none_or(|ip| ip.is_unspecified()),
            NetAddr::Unspecified => true,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, NetAddr::Unspecified)
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetAddr::Stream(endpoint) | NetAddr::Datagram(endpoint) => endpoint.fmt(f),
            NetAddr::RawIp { ip: None, .. } => Ok(()),
            NetAddr::RawIp {
                ip: Some(ip),
                zone: None,
            } => write!(f, "{ip}"),
            NetAddr::RawIp {
                ip: Some(ip),
                zone: Some(zone),
            } => write!(f, "{ip}%{zone}"),
            NetAddr::Unspecified => f.write_str("<nil>"),
        }
    }
}

/// 地址文本中主机部分的三种形态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostSpec {
    /// 主机为空，表示通配地址。
    Wildcard,
    /// IP 字面量，IPv6 可带 zone。
    Literal { ip: IpAddr, zone: Option<String> },
    /// 需要经由解析器查询的名称。
    Name(String),
}

impl HostSpec {
    /// 识别主机文本；字面量永远不会交给解析器。
    pub fn parse(host: &str) -> Result<Self, NetError> {
        if host.is_empty() {
            return Ok(HostSpec::Wildcard);
        }
        let (literal, zone) = match host.split_once('%') {
            Some((literal, zone)) => (literal, Some(zone)),
            None => (host, None),
        };
        match (literal.parse::<IpAddr>(), zone) {
            (Ok(ip), None) => Ok(HostSpec::Literal { ip, zone: None }),
            (Ok(ip @ IpAddr::V6(_)), Some(zone)) if !zone.is_empty() => Ok(HostSpec::Literal {
                ip,
                zone: Some(zone.to_owned()),
            }),
            (Ok(_), Some(_)) | (Err(_), Some(_)) => {
                Err(NetError::addr_parse(host, "invalid zone in address"))
            }
            (Err(_), None) => Ok(HostSpec::Name(host.to_owned())),
        }
    }
}

/// 把 `host:port`、`[host]:port` 或 `[host%zone]:port` 拆成主机与端口两部分。
///
/// # 契约（What）
/// - 缺少端口、冒号过多、方括号不匹配时返回 [`ErrorKind::AddrParse`](crate::ErrorKind::AddrParse)，
///   错误文案包含原始地址；
/// - 主机部分可以为空（`":80"`），端口部分原样返回，是否合法由 [`parse_port`] 判定。
pub fn split_host_port(hostport: &str) -> Result<(&str, &str), NetError> {
    const MISSING_PORT: &str = "missing port in address";
    const TOO_MANY_COLONS: &str = "too many colons in address";

    let Some(colon) = hostport.rfind(':') else {
        return Err(NetError::addr_parse(hostport, MISSING_PORT));
    };

    let (host, open_from, close_from) = if hostport.starts_with('[') {
        let Some(end) = hostport.find(']') else {
            return Err(NetError::addr_parse(hostport, "missing ']' in address"));
        };
        if end + 1 == hostport.len() {
            return Err(NetError::addr_parse(hostport, MISSING_PORT));
        }
        if end + 1 != colon {
            let reason = if hostport.as_bytes()[end + 1] == b':' {
                TOO_MANY_COLONS
            } else {
                MISSING_PORT
            };
            return Err(NetError::addr_parse(hostport, reason));
        }
        (&hostport[1..end], 1, end + 1)
    } else {
        let host = &hostport[..colon];
        if host.contains(':') {
            return Err(NetError::addr_parse(hostport, TOO_MANY_COLONS));
        }
        (host, 0, 0)
    };

    if hostport[open_from..].contains('[') {
        return Err(NetError::addr_parse(hostport, "unexpected '[' in address"));
    }
    if hostport[close_from..].contains(']') {
        return Err(NetError::addr_parse(hostport, "unexpected ']' in address"));
    }

    Ok((host, &hostport[colon + 1..]))
}

/// 组合主机与端口；主机含冒号（IPv6）时加方括号。
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// 常见服务名到端口的静态表。
const SERVICES: &[(&str, u16)] = &[
    ("ftp", 21),
    ("ssh", 22),
    ("telnet", 23),
    ("smtp", 25),
    ("domain", 53),
    ("http", 80),
    ("ntp", 123),
    ("https", 443),
];

/// 查询服务名对应的端口。
///
/// `network` 仅用于错误文案；当前服务表对 TCP 与 UDP 相同。
pub fn lookup_port(network: &str, service: &str) -> Result<u16, NetError> {
    let wanted = service.to_ascii_lowercase();
    SERVICES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, port)| *port)
        .ok_or_else(|| NetError::addr_parse(service, &format!("unknown port for {network}")))
}

/// 解析端口文本：十进制 `0..=65535` 或已知服务名。
pub fn parse_port(network: &str, port: &str) -> Result<u16, NetError> {
    if port.is_empty() {
        return Err(NetError::addr_parse(port, "missing port"));
    }
    if port.bytes().all(|byte| byte.is_ascii_digit()) {
        return port
            .parse::<u16>()
            .map_err(|_| NetError::addr_parse(port, "invalid port"));
    }
    lookup_port(network, port).map_err(|_| {
        NetError::addr_parse(port, &format!("error parsing port '{port}' in address"))
    })
}

/// 解析 `host:port` 地址文本为主机形态与端口。
pub fn parse_endpoint(network: &str, address: &str) -> Result<(HostSpec, u16), NetError> {
    if address.is_empty() {
        return Err(NetError::addr_parse(address, "empty address"));
    }
    let (host, port) = split_host_port(address)?;
    let port = parse_port(network, port)?;
    Ok((HostSpec::parse(host)?, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn split_variants() {
        assert_eq!(split_host_port("host:80").unwrap(), ("host", "80"));
        assert_eq!(split_host_port(":80").unwrap(), ("", "80"));
        assert_eq!(split_host_port("[::1]:443").unwrap(), ("::1", "443"));
        assert_eq!(
            split_host_port("[fe80::1%eth0]:22").unwrap(),
            ("fe80::1%eth0", "22")
        );
        assert_eq!(split_host_port("host:").unwrap(), ("host", ""));
    }

    #[test]
    fn split_failures_name_the_problem() {
        let cases = [
            ("host", "missing port"),
            ("", "missing port"),
            ("::1:80", "too many colons"),
            ("[::1]", "missing port"),
            ("[::1]:80:90", "too many colons"),
            ("[::1", "missing ']'"),
            ("a]b:80", "unexpected ']'"),
            ("[a[b]:80", "unexpected '['"),
        ];
        for (input, reason) in cases {
            let err = split_host_port(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AddrParse, "{input}");
            assert!(err.to_string().contains(reason), "{input}: {err}");
        }
    }

    #[test]
    fn ports() {
        assert_eq!(parse_port("tcp", "80").unwrap(), 80);
        assert_eq!(parse_port("tcp", "0").unwrap(), 0);
        assert_eq!(parse_port("tcp", "65535").unwrap(), 65535);
        assert_eq!(parse_port("tcp", "http").unwrap(), 80);
        assert_eq!(parse_port("udp", "NTP").unwrap(), 123);
        for bad in ["65536", "-1", "eighty", "", "8o"] {
            assert_eq!(
                parse_port("tcp", bad).unwrap_err().kind(),
                ErrorKind::AddrParse,
                "{bad}"
            );
        }
    }

    #[test]
    fn endpoints() {
        assert_eq!(
            parse_endpoint("tcp", ":http").unwrap(),
            (HostSpec::Wildcard, 80)
        );
        assert_eq!(
            parse_endpoint("tcp", "example.test:80").unwrap(),
            (HostSpec::Name("example.test".into()), 80)
        );
        assert_eq!(
            parse_endpoint("tcp", "[fe80::1%3]:9").unwrap(),
            (
                HostSpec::Literal {
                    ip: "fe80::1".parse().unwrap(),
                    zone: Some("3".into())
                },
                9
            )
        );
        let empty = parse_endpoint("tcp", "").unwrap_err();
        assert!(empty.to_string().contains("empty address"));
        assert!(HostSpec::parse("10.0.0.1%eth0").is_err());
    }

    #[test]
    fn display_forms() {
        let v4 = EndpointAddr::new("10.0.0.7".parse().unwrap(), 8080);
        assert_eq!(v4.to_string(), "10.0.0.7:8080");
        let v6 = EndpointAddr::new("fe80::1".parse().unwrap(), 22).with_zone("eth0");
        assert_eq!(v6.to_string(), "[fe80::1%eth0]:22");
        assert_eq!(EndpointAddr::wildcard(80).to_string(), ":80");
        assert_eq!(NetAddr::Unspecified.to_string(), "<nil>");
        assert_eq!(NetAddr::Stream(v4).network(), "tcp");
    }

    #[test]
    fn wildcard_detection() {
        assert!(EndpointAddr::wildcard(1).is_wildcard());
        assert!(EndpointAddr::new("0.0.0.0".parse().unwrap(), 1).is_wildcard());
        assert!(EndpointAddr::new("::".parse().unwrap(), 1).is_wildcard());
        assert!(!EndpointAddr::new("127.0.0.1".parse().unwrap(), 1).is_wildcard());
    }

    #[test]
    fn numeric_zone_becomes_scope_id() {
        let addr = EndpointAddr::new("fe80::1".parse().unwrap(), 5).with_zone("7");
        match addr.to_socket_addr(IpAddr::V6(Ipv6Addr::UNSPECIFIED)) {
            SocketAddr::V6(v6) => assert_eq!(v6.scope_id(), 7),
            other => panic!("unexpected {other}"),
        }
        let back = EndpointAddr::from(addr.to_socket_addr(IpAddr::V6(Ipv6Addr::UNSPECIFIED)));
        assert_eq!(back, addr);
    }

    proptest! {
        #[test]
        fn display_splits_back_into_parts(a in any::<[u8; 4]>(), port in any::<u16>()) {
            let addr = EndpointAddr::new(IpAddr::from(a), port);
            let text = addr.to_string();
            let (host, port_text) = split_host_port(&text).unwrap();
            prop_assert_eq!(host.parse::<IpAddr>().unwrap(), IpAddr::from(a));
            prop_assert_eq!(parse_port("tcp", port_text).unwrap(), port);
        }

        #[test]
        fn v6_display_is_bracketed(segments in any::<[u16; 8]>(), port in any::<u16>()) {
            let ip = IpAddr::V6(Ipv6Addr::from(segments));
            let text = EndpointAddr::new(ip, port).to_string();
            prop_assert!(text.starts_with('['));
            let (host, _) = split_host_port(&text).unwrap();
            prop_assert_eq!(host.parse::<IpAddr>().unwrap(), ip);
        }
    }
}
