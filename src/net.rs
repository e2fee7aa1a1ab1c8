use std::{
    error, fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

/// IP address with a CIDR prefix length, e.g. `10.0.0.2/32`.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct IpAddrMask {
    // IP v4 or v6
    pub ip: IpAddr,
    // Classless Inter-Domain Routing
    pub cidr: u8,
}

impl IpAddrMask {
    #[must_use]
    pub fn new(ip: IpAddr, cidr: u8) -> Self {
        Self { ip, cidr }
    }

    /// Single-host mask: `/32` for IPv4, `/128` for IPv6.
    #[must_use]
    pub fn host(ip: IpAddr) -> Self {
        let cidr = if ip.is_ipv4() { 32 } else { 128 };
        Self { ip, cidr }
    }

    /// Network mask corresponding to the prefix length.
    #[must_use]
    pub fn mask(&self) -> IpAddr {
        match self.ip {
            IpAddr::V4(_) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.cidr)).unwrap_or(0);
                IpAddr::V4(Ipv4Addr::from(mask))
            }
            IpAddr::V6(_) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.cidr)).unwrap_or(0);
                IpAddr::V6(Ipv6Addr::from(mask))
            }
        }
    }

    /// The network this address belongs to, e.g. `192.168.1.0/24` for `192.168.1.17/24`.
    #[must_use]
    pub fn network(&self) -> Self {
        let ip = match (self.ip, self.mask()) {
            (IpAddr::V4(ip), IpAddr::V4(mask)) => {
                IpAddr::V4(Ipv4Addr::from(u32::from(ip) & u32::from(mask)))
            }
            (IpAddr::V6(ip), IpAddr::V6(mask)) => {
                IpAddr::V6(Ipv6Addr::from(u128::from(ip) & u128::from(mask)))
            }
            _ => self.ip,
        };
        Self { ip, cidr: self.cidr }
    }
}

impl fmt::Display for IpAddrMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.cidr)
    }
}

#[derive(Debug, PartialEq)]
pub struct IpAddrParseError;

impl error::Error for IpAddrParseError {}

impl fmt::Display for IpAddrParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IP address/mask parse error")
    }
}

impl FromStr for IpAddrMask {
    type Err = IpAddrParseError;

    fn from_str(ip_str: &str) -> Result<Self, Self::Err> {
        let ip_str = ip_str.trim();
        if let Some((left, right)) = ip_str.split_once('/') {
            let ip: IpAddr = left.parse().map_err(|_| IpAddrParseError)?;
            let cidr: u8 = right.parse().map_err(|_| IpAddrParseError)?;
            let max = if ip.is_ipv4() { 32 } else { 128 };
            if cidr > max {
                return Err(IpAddrParseError);
            }
            Ok(IpAddrMask { ip, cidr })
        } else {
            let ip: IpAddr = ip_str.parse().map_err(|_| IpAddrParseError)?;
            Ok(IpAddrMask::host(ip))
        }
    }
}

/// Parse a comma separated list such as `10.0.0.0/24, 192.168.1.0/24`.
pub fn parse_list(list: &str) -> Result<Vec<IpAddrMask>, IpAddrParseError> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}

/// Inverse of [`parse_list`].
#[must_use]
pub fn format_list(list: &[IpAddrMask]) -> String {
    list.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
