//! Discovery of the host's network configuration.

use std::{fmt, fs, net::IpAddr, path::Path};

use crate::{command::run, net::IpAddrMask, GatewayError};

const RESOLV_CONF: &str = "/etc/resolv.conf";
const PUBLIC_IP_URL: &str = "https://api.ipify.org";

/// Snapshot of the host network, gathered once per run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Default gateway address.
    pub gateway: IpAddr,
    /// Interface carrying the default route; NAT rules masquerade on it.
    pub interface: String,
    /// Address of `interface`, with prefix length.
    pub address: IpAddrMask,
    /// Network that `address` belongs to.
    pub subnet: IpAddrMask,
    pub dns_servers: Vec<IpAddr>,
    /// Address the host is reachable at from the internet; used as client endpoint.
    pub public_ip: IpAddr,
}

impl NetworkInfo {
    /// Query the OS for the current network configuration.
    ///
    /// Routing data comes from netlink, resolvers from `/etc/resolv.conf` and the public
    /// address from an outbound HTTPS request made with `curl`.
    #[cfg(target_os = "linux")]
    pub fn detect() -> Result<Self, GatewayError> {
        use crate::netlink::{get_addresses, get_default_route, get_interface_name};

        let route = get_default_route()?
            .ok_or_else(|| GatewayError::NetworkInfo("no IPv4 default route".into()))?;
        let interface = get_interface_name(route.index)?.ok_or_else(|| {
            GatewayError::NetworkInfo(format!("no interface with index {}", route.index))
        })?;
        let address = get_addresses(route.index)?.into_iter().next().ok_or_else(|| {
            GatewayError::NetworkInfo(format!("interface {interface} has no IPv4 address"))
        })?;
        let dns_servers = read_nameservers(Path::new(RESOLV_CONF));
        let public_ip = public_ip()?;

        Ok(Self {
            gateway: route.gateway,
            subnet: address.network(),
            interface,
            address,
            dns_servers,
            public_ip,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn detect() -> Result<Self, GatewayError> {
        Err(GatewayError::NetworkInfo(
            "network discovery is only supported on Linux".into(),
        ))
    }
}

impl fmt::Display for NetworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dns = self
            .dns_servers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "====================================")?;
        writeln!(f, "Gateway: {} ({})", self.gateway, self.interface)?;
        writeln!(f, "Subnet Range: {}", self.subnet)?;
        writeln!(f, "DNS Servers: {dns}")?;
        writeln!(f, "Public IP: {}", self.public_ip)?;
        writeln!(f, "Interface Name: {}", self.interface)?;
        write!(f, "====================================")
    }
}

/// Extract `nameserver` entries from resolv.conf contents.
pub(crate) fn parse_nameservers(contents: &str) -> Vec<IpAddr> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("nameserver"), Some(addr)) => addr.parse().ok(),
                _ => None,
            }
        })
        .collect()
}

fn read_nameservers(path: &Path) -> Vec<IpAddr> {
    match fs::read_to_string(path) {
        Ok(contents) => parse_nameservers(&contents),
        Err(err) => {
            warn!("Failed to read {}: {err}", path.display());
            Vec::new()
        }
    }
}

/// Ask an external service for the address this host is seen as.
pub fn public_ip() -> Result<IpAddr, GatewayError> {
    let output = run("curl", &["-fsSL", "--max-time", "10", PUBLIC_IP_URL])?;
    output.trim().parse().map_err(|_| {
        GatewayError::NetworkInfo(format!("{PUBLIC_IP_URL} returned `{output}`"))
    })
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn nameservers_from_resolv_conf() {
        let contents = "# Generated by NetworkManager\n\
            search example.com\n\
            nameserver 1.1.1.1\n\
            ; nameserver 9.9.9.9\n\
            nameserver   2606:4700:4700::1111\n\
            nameserver not-an-ip\n\
            options edns0\n";
        let servers = parse_nameservers(contents);
        assert_eq!(
            servers,
            vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                "2606:4700:4700::1111".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn missing_resolv_conf_is_empty() {
        assert!(read_nameservers(Path::new("/nonexistent/resolv.conf")).is_empty());
    }

    #[test]
    fn summary_banner() {
        let address: IpAddrMask = "192.168.1.17/24".parse().unwrap();
        let info = NetworkInfo {
            gateway: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            interface: "eth0".into(),
            subnet: address.network(),
            address,
            dns_servers: vec![IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))],
            public_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        };
        let banner = info.to_string();
        assert!(banner.contains("Subnet Range: 192.168.1.0/24"));
        assert!(banner.contains("Public IP: 203.0.113.7"));
        assert!(banner.contains("Interface Name: eth0"));
    }
}
