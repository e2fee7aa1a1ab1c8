//! Declared clients and the configuration files handed out to them.

use std::{
    collections::HashSet,
    fs, io,
    net::{IpAddr, Ipv4Addr},
    path::Path,
};

use serde::Deserialize;

use crate::{
    key::Key,
    net::{format_list, IpAddrMask},
    GatewayError,
};

pub const PERSISTENT_KEEPALIVE: u16 = 25;

fn default_enabled() -> bool {
    true
}

/// A client as declared by the operator.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientRecord {
    /// Unique; used as the client file name stem.
    pub name: String,
    /// Unique host address inside the VPN subnet.
    pub address: Ipv4Addr,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ClientRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, address: Ipv4Addr, enabled: bool) -> Self {
        Self {
            name: name.into(),
            address,
            enabled,
        }
    }

    #[must_use]
    pub fn ip(&self) -> IpAddr {
        IpAddr::V4(self.address)
    }
}

/// Declared client list: the desired peer set, in operator order.
///
/// The `users` key is mandatory: a list that names no clients would prune every peer.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientList {
    pub users: Vec<ClientRecord>,
}

impl ClientList {
    /// Load and validate the list from a YAML file.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(GatewayError::MissingInput(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };
        let list = Self::from_yaml(&contents)?;
        info!(
            "Loaded {} declared clients from {}",
            list.users.len(),
            path.display()
        );
        Ok(list)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, GatewayError> {
        let list: Self = serde_yaml::from_str(contents)?;
        list.validate()?;
        Ok(list)
    }

    /// Names must be usable as file stems; names and addresses must be unique.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let mut names = HashSet::new();
        let mut addresses = HashSet::new();
        for client in &self.users {
            let name = client.name.as_str();
            if name.is_empty() || name == "." || name == ".." {
                return Err(GatewayError::InvalidClient(format!(
                    "invalid client name `{name}`"
                )));
            }
            if name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
                return Err(GatewayError::InvalidClient(format!(
                    "client name `{name}` cannot contain spaces or path separators"
                )));
            }
            if !names.insert(name) {
                return Err(GatewayError::InvalidClient(format!(
                    "duplicate client name `{name}`"
                )));
            }
            if !addresses.insert(client.address) {
                return Err(GatewayError::InvalidClient(format!(
                    "duplicate client address {} (client `{name}`)",
                    client.address
                )));
            }
        }
        Ok(())
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ClientRecord> {
        self.users.iter().filter(|client| client.enabled)
    }
}

/// Configuration file for one client: its own interface plus the server as its only peer.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfigFile {
    pub address: IpAddrMask,
    pub private_key: Key,
    pub server_public_key: Key,
    /// `host:port` of the server.
    pub endpoint: String,
    pub allowed_ips: Vec<IpAddrMask>,
    pub persistent_keepalive: u16,
}

impl ClientConfigFile {
    #[must_use]
    pub fn as_config(&self) -> String {
        format!(
            "[Interface]\n\
            Address = {}\n\
            PrivateKey = {}\n\
            \n\
            [Peer]\n\
            PublicKey = {}\n\
            Endpoint = {}\n\
            AllowedIPs = {}\n\
            PersistentKeepalive = {}\n",
            self.address,
            self.private_key,
            self.server_public_key,
            self.endpoint,
            format_list(&self.allowed_ips),
            self.persistent_keepalive,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_test::{assert_de_tokens, Configure, Token};

    use super::*;

    #[test]
    fn client_record_tokens() {
        assert_de_tokens(
            &ClientRecord::new("alice", Ipv4Addr::new(10, 0, 0, 2), true).readable(),
            &[
                Token::Struct {
                    name: "ClientRecord",
                    len: 2,
                },
                Token::Str("name"),
                Token::Str("alice"),
                Token::Str("address"),
                Token::Str("10.0.0.2"),
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn client_list_from_yaml() {
        let yaml = "users:\n\
            \x20 - name: alice\n\
            \x20   address: 10.0.0.2\n\
            \x20   enabled: true\n\
            \x20 - name: bob\n\
            \x20   address: 10.0.0.3\n\
            \x20   enabled: false\n\
            \x20 - name: carol\n\
            \x20   address: 10.0.0.4\n";
        let list = ClientList::from_yaml(yaml).unwrap();
        assert_eq!(list.users.len(), 3);
        assert!(!list.users[1].enabled);
        assert!(list.users[2].enabled);
        let enabled: Vec<_> = list.enabled().map(|c| c.name.as_str()).collect();
        assert_eq!(enabled, ["alice", "carol"]);
    }

    #[test]
    fn users_key_is_required() {
        for yaml in ["user:\n  - {name: alice, address: 10.0.0.2}\n", "{}\n"] {
            assert!(matches!(
                ClientList::from_yaml(yaml),
                Err(GatewayError::ClientList(_))
            ));
        }
        // an explicit empty list is still allowed
        assert!(ClientList::from_yaml("users: []\n").unwrap().users.is_empty());
    }

    #[test]
    fn reject_unknown_fields() {
        let yaml = "users:\n  - {name: alice, address: 10.0.0.2, enable: false}\n";
        assert!(matches!(
            ClientList::from_yaml(yaml),
            Err(GatewayError::ClientList(_))
        ));
    }

    #[test]
    fn reject_duplicates() {
        let yaml = "users:\n\
            \x20 - {name: alice, address: 10.0.0.2}\n\
            \x20 - {name: bob, address: 10.0.0.2}\n";
        assert!(matches!(
            ClientList::from_yaml(yaml),
            Err(GatewayError::InvalidClient(_))
        ));

        let yaml = "users:\n\
            \x20 - {name: alice, address: 10.0.0.2}\n\
            \x20 - {name: alice, address: 10.0.0.3}\n";
        assert!(matches!(
            ClientList::from_yaml(yaml),
            Err(GatewayError::InvalidClient(_))
        ));
    }

    #[test]
    fn reject_path_like_names() {
        let yaml = "users:\n  - {name: ../etc/passwd, address: 10.0.0.2}\n";
        assert!(matches!(
            ClientList::from_yaml(yaml),
            Err(GatewayError::InvalidClient(_))
        ));
    }

    #[test]
    fn reject_malformed_address() {
        let yaml = "users:\n  - {name: alice, address: 10.0.0.300}\n";
        assert!(matches!(
            ClientList::from_yaml(yaml),
            Err(GatewayError::ClientList(_))
        ));
    }

    #[test]
    fn missing_file() {
        let err = ClientList::load(Path::new("/nonexistent/clients.yaml")).unwrap_err();
        assert!(matches!(err, GatewayError::MissingInput(_)));
    }

    #[test]
    fn client_config_file() {
        let file = ClientConfigFile {
            address: "10.0.0.2/32".parse().unwrap(),
            private_key: Key::new([1; 32]),
            server_public_key: Key::new([2; 32]),
            endpoint: "203.0.113.7:51820".into(),
            allowed_ips: vec!["0.0.0.0/0".parse().unwrap()],
            persistent_keepalive: PERSISTENT_KEEPALIVE,
        };
        assert_eq!(
            "[Interface]\n\
            Address = 10.0.0.2/32\n\
            PrivateKey = AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=\n\
            \n\
            [Peer]\n\
            PublicKey = AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=\n\
            Endpoint = 203.0.113.7:51820\n\
            AllowedIPs = 0.0.0.0/0\n\
            PersistentKeepalive = 25\n",
            file.as_config()
        );
    }
}
