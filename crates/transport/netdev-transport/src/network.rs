use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::NetError;

/// 网络名中的地址族限定。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IpVersion {
    Any,
    V4,
    V6,
}

impl IpVersion {
    /// 判断 IP 是否属于该限定允许的地址族。
    pub fn admits(self, ip: IpAddr) -> bool {
        match self {
            IpVersion::Any => true,
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            IpVersion::Any => "",
            IpVersion::V4 => "4",
            IpVersion::V6 => "6",
        }
    }
}

/// Unix 域套接字的三种形态，仅用于识别网络名。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnixKind {
    Stream,
    Datagram,
    SeqPacket,
}

/// 解析后的网络种类。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 调度层需要在创建任何句柄之前就判定网络名是否可识别，确保“未知网络”错误不会留下副作用；
/// - 把 `tcp4`/`udp6` 之类的地址族限定保留下来，解析地址时据此拒绝另一地址族的字面量。
///
/// ## 契约（What）
/// - 接受 `tcp|tcp4|tcp6`、`udp|udp4|udp6`、`ip|ip4|ip6`（可带 `:协议`）与 `unix|unixgram|unixpacket`；
/// - 其他任何字符串返回 [`ErrorKind::UnknownNetwork`](crate::ErrorKind::UnknownNetwork)，文案包含原字符串；
/// - 协议可以是数字或 `icmp`/`igmp`/`tcp`/`udp`/`ipv6-icmp`；只有 `ip` 族允许冒号后缀。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp(IpVersion),
    Udp(IpVersion),
    Ip {
        version: IpVersion,
        protocol: Option<u8>,
    },
    Unix(UnixKind),
}

const PROTOCOLS: &[(&str, u8)] = &[
    ("icmp", 1),
    ("igmp", 2),
    ("tcp", 6),
    ("udp", 17),
    ("ipv6-icmp", 58),
];

impl Network {
    pub fn parse(network: &str) -> Result<Self, NetError> {
        let (name, protocol) = match network.rsplit_once(':') {
            Some((name, protocol)) => (name, Some(protocol)),
            None => (network, None),
        };

        let parsed = match name {
            "tcp" => Network::Tcp(IpVersion::Any),
            "tcp4" => Network::Tcp(IpVersion::V4),
            "tcp6" => Network::Tcp(IpVersion::V6),
            "udp" => Network::Udp(IpVersion::Any),
            "udp4" => Network::Udp(IpVersion::V4),
            "udp6" => Network::Udp(IpVersion::V6),
            "ip" | "ip4" | "ip6" => {
                let version = match name {
                    "ip4" => IpVersion::V4,
                    "ip6" => IpVersion::V6,
                    _ => IpVersion::Any,
                };
                let protocol = protocol
                    .map(|text| parse_protocol(network, text))
                    .transpose()?;
                return Ok(Network::Ip { version, protocol });
            }
            "unix" => Network::Unix(UnixKind::Stream),
            "unixgram" => Network::Unix(UnixKind::Datagram),
            "unixpacket" => Network::Unix(UnixKind::SeqPacket),
            _ => return Err(NetError::unknown_network(network)),
        };

        if protocol.is_some() {
            return Err(NetError::unknown_network(network));
        }
        Ok(parsed)
    }

    pub fn version(&self) -> IpVersion {
        match self {
            Network::Tcp(version) | Network::Udp(version) => *version,
            Network::Ip { version, .. } => *version,
            Network::Unix(_) => IpVersion::Any,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Network::Tcp(_))
    }

    pub fn is_datagram(&self) -> bool {
        matches!(self, Network::Udp(_))
    }
}

fn parse_protocol(network: &str, text: &str) -> Result<u8, NetError> {
    if let Ok(number) = text.parse::<u8>() {
        return Ok(number);
    }
    let wanted = text.to_ascii_lowercase();
    PROTOCOLS
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, number)| *number)
        .ok_or_else(|| NetError::unknown_network(network))
}

impl FromStr for Network {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::parse(s)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp(version) => write!(f, "tcp{}", version.suffix()),
            Network::Udp(version) => write!(f, "udp{}", version.suffix()),
            Network::Ip {
                version,
                protocol: None,
            } => write!(f, "ip{}", version.suffix()),
            Network::Ip {
                version,
                protocol: Some(protocol),
            } => write!(f, "ip{}:{protocol}", version.suffix()),
            Network::Unix(UnixKind::Stream) => f.write_str("unix"),
            Network::Unix(UnixKind::Datagram) => f.write_str("unixgram"),
            Network::Unix(UnixKind::SeqPacket) => f.write_str("unixpacket"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn known_networks() {
        for name in ["tcp", "tcp4", "tcp6", "udp", "udp4", "udp6", "ip", "ip6", "unix", "unixgram"] {
            let parsed = Network::parse(name).unwrap();
            assert_eq!(parsed.to_string(), name);
        }
        assert_eq!(
            Network::parse("ip4:icmp").unwrap(),
            Network::Ip {
                version: IpVersion::V4,
                protocol: Some(1)
            }
        );
        assert_eq!(Network::parse("ip:17").unwrap().to_string(), "ip:17");
    }

    #[test]
    fn unknown_networks_name_the_input() {
        for bad in ["", "tcp7", "TCP", "tcp:6", "ip:bogus", "sctp"] {
            let err = Network::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnknownNetwork, "{bad:?}");
            assert!(err.to_string().contains(bad));
        }
    }

    #[test]
    fn version_admits_matching_family() {
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(IpVersion::V4.admits(v4));
        assert!(!IpVersion::V4.admits(v6));
        assert!(IpVersion::Any.admits(v6));
        assert_eq!(Network::parse("udp6").unwrap().version(), IpVersion::V6);
    }
}
