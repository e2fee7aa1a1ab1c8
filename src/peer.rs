//! Peer stanza of the aggregate configuration file

use std::net::IpAddr;

use crate::{
    conf::Section,
    key::Key,
    net::{format_list, parse_list, IpAddrMask},
};

/// One `[Peer]` stanza: a client's public key and the addresses routed to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerEntry {
    pub public_key: Key,
    pub allowed_ips: Vec<IpAddrMask>,
    /// Entries other than `PublicKey` and `AllowedIPs`, kept verbatim.
    pub extra: Vec<(String, String)>,
}

impl PeerEntry {
    /// Create new `PeerEntry` routing the single host `address` to `public_key`.
    #[must_use]
    pub fn new(public_key: Key, address: IpAddr) -> Self {
        Self {
            public_key,
            allowed_ips: vec![IpAddrMask::host(address)],
            extra: Vec::new(),
        }
    }

    /// Host addresses of `AllowedIPs`, without prefix length.
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.allowed_ips.iter().map(|mask| mask.ip)
    }

    #[must_use]
    pub fn routes(&self, address: IpAddr) -> bool {
        self.addresses().any(|ip| ip == address)
    }

    /// Render the stanza: `[Peer]`, `PublicKey`, `AllowedIPs`, with no blank lines.
    #[must_use]
    pub fn as_config(&self) -> String {
        let mut output = format!(
            "[Peer]\nPublicKey = {}\nAllowedIPs = {}\n",
            self.public_key,
            format_list(&self.allowed_ips)
        );
        for (key, value) in &self.extra {
            output.push_str(&format!("{key} = {value}\n"));
        }

        output
    }

    pub(crate) fn from_section(section: &Section) -> Result<Self, String> {
        let mut public_key = None;
        let mut allowed_ips = None;
        let mut extra = Vec::new();

        for (key, value) in &section.entries {
            match key.to_ascii_lowercase().as_str() {
                "publickey" => {
                    public_key = Some(
                        value
                            .parse::<Key>()
                            .map_err(|err| format!("PublicKey `{value}`: {err}"))?,
                    );
                }
                "allowedips" => {
                    allowed_ips = Some(
                        parse_list(value).map_err(|err| format!("AllowedIPs `{value}`: {err}"))?,
                    );
                }
                _ => extra.push((key.clone(), value.clone())),
            }
        }

        Ok(Self {
            public_key: public_key.ok_or("peer without PublicKey")?,
            allowed_ips: allowed_ips.ok_or("peer without AllowedIPs")?,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::conf::parse;

    #[test]
    fn peer_stanza() {
        let peer = PeerEntry::new(Key::new([2; 32]), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(
            "[Peer]\n\
            PublicKey = AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=\n\
            AllowedIPs = 10.0.0.2/32\n",
            peer.as_config()
        );
    }

    #[test]
    fn routes_exact_address_only() {
        let peer = PeerEntry::new(Key::default(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 23)));
        assert!(peer.routes(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 23))));
        assert!(!peer.routes(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
    }

    #[test]
    fn read_back_stanza() {
        let text = "[Peer]\n\
            PublicKey = AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=\n\
            AllowedIPs = 10.0.0.2/32, 10.0.1.0/24\n\
            PersistentKeepalive = 25\n";
        let sections = parse(text).unwrap();
        let peer = PeerEntry::from_section(&sections[0]).unwrap();
        assert_eq!(peer.allowed_ips.len(), 2);
        assert_eq!(peer.extra.len(), 1);
        assert_eq!(peer.as_config(), text);
    }

    #[test]
    fn reject_peer_without_key() {
        let sections = parse("[Peer]\nAllowedIPs = 10.0.0.2/32\n").unwrap();
        assert_eq!(
            PeerEntry::from_section(&sections[0]).unwrap_err(),
            "peer without PublicKey"
        );
    }
}
