//! Server `[Interface]` section of the aggregate configuration file

use std::fmt::{self, Debug, Formatter};

use crate::{
    conf::Section,
    key::{Key, KeyPair},
    keygen::derive_public_key,
    net::IpAddrMask,
};

pub const DEFAULT_LISTEN_PORT: u16 = 51820;

/// Firewall hooks enabling forwarding and masquerading VPN traffic out of `egress`.
///
/// The rules are opaque to this crate; `%i` is expanded by `wg-quick` to the WireGuard
/// interface name.
#[must_use]
pub fn nat_hooks(egress: &str) -> Vec<(String, String)> {
    vec![
        ("PreUp".into(), "sysctl -w net.ipv4.ip_forward=1".into()),
        (
            "PostUp".into(),
            format!(
                "iptables -A FORWARD -i %i -j ACCEPT; iptables -A FORWARD -o %i -j ACCEPT; \
                 iptables -t nat -A POSTROUTING -o {egress} -j MASQUERADE"
            ),
        ),
        (
            "PostDown".into(),
            format!(
                "iptables -D FORWARD -i %i -j ACCEPT; iptables -D FORWARD -o %i -j ACCEPT; \
                 iptables -t nat -D POSTROUTING -o {egress} -j MASQUERADE"
            ),
        ),
    ]
}

/// WireGuard server representation.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: IpAddrMask,
    pub save_config: bool,
    pub private_key: Key,
    /// Not written to the `[Interface]` section; persisted in a separate `public_key` file.
    pub public_key: Key,
    pub listen_port: u16,
    /// Remaining entries (`PreUp`, `PostUp`, `PostDown`, ...) kept verbatim and in order.
    pub hooks: Vec<(String, String)>,
}

// implement manually to avoid exposing private keys
impl Debug for ServerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("save_config", &self.save_config)
            .field("public_key", &self.public_key)
            .field("listen_port", &self.listen_port)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Create new `ServerConfig` with NAT hooks masquerading on `egress`.
    #[must_use]
    pub fn new(keys: KeyPair, listen_port: u16, address: IpAddrMask, egress: &str) -> Self {
        Self {
            address,
            save_config: false,
            private_key: keys.private,
            public_key: keys.public,
            listen_port,
            hooks: nat_hooks(egress),
        }
    }

    /// Render the `[Interface]` section, one entry per line, without surrounding blank lines.
    #[must_use]
    pub fn as_config(&self) -> String {
        let mut output = String::from("[Interface]\n");
        output.push_str(&format!("Address = {}\n", self.address));
        output.push_str(&format!("SaveConfig = {}\n", self.save_config));
        output.push_str(&format!("PrivateKey = {}\n", self.private_key));
        output.push_str(&format!("ListenPort = {}\n", self.listen_port));
        for (key, value) in &self.hooks {
            output.push_str(&format!("{key} = {value}\n"));
        }

        output
    }

    /// Read back a section produced by [`ServerConfig::as_config`].
    ///
    /// The public key is derived from `PrivateKey`.
    pub(crate) fn from_section(section: &Section) -> Result<Self, String> {
        let mut address = None;
        let mut save_config = false;
        let mut private_key = None;
        let mut listen_port = None;
        let mut hooks = Vec::new();

        for (key, value) in &section.entries {
            match key.to_ascii_lowercase().as_str() {
                "address" => {
                    address = Some(
                        value
                            .parse::<IpAddrMask>()
                            .map_err(|err| format!("Address `{value}`: {err}"))?,
                    );
                }
                "saveconfig" => save_config = value.eq_ignore_ascii_case("true"),
                "privatekey" => {
                    private_key = Some(
                        value
                            .parse::<Key>()
                            .map_err(|err| format!("PrivateKey: {err}"))?,
                    );
                }
                "listenport" => {
                    listen_port = Some(
                        value
                            .parse::<u16>()
                            .map_err(|err| format!("ListenPort `{value}`: {err}"))?,
                    );
                }
                _ => hooks.push((key.clone(), value.clone())),
            }
        }

        let private_key = private_key.ok_or("missing PrivateKey")?;
        Ok(Self {
            address: address.ok_or("missing Address")?,
            save_config,
            public_key: derive_public_key(&private_key),
            private_key,
            listen_port: listen_port.ok_or("missing ListenPort")?,
            hooks,
        })
    }
}
