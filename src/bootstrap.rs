//! Top-level provisioning flow: first-time setup, reconfiguration, and reconciliation.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use crate::{
    client::ClientList,
    keygen::KeyPairProvider,
    net::IpAddrMask,
    network::NetworkInfo,
    prompt::{Answer, Prompt},
    reconcile::{ReconcileReport, Reconciler},
    server::{ServerConfig, DEFAULT_LISTEN_PORT},
    service::ServiceControl,
    store::{PeerContext, PeerStore, StoreState},
    GatewayError,
};

/// Settings for one provisioning run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Directory holding `<ifname>.conf`, `public_key` and `clients/`.
    pub wg_dir: PathBuf,
    /// YAML file with the declared client list.
    pub clients_file: PathBuf,
    pub ifname: String,
    /// Server address inside the VPN.
    pub server_address: IpAddrMask,
    /// Route only the VPN network and the LAN through the tunnel instead of everything.
    pub split_tunnel: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            wg_dir: PathBuf::from("/etc/wireguard"),
            clients_file: PathBuf::from("clients.yaml"),
            ifname: "wg0".into(),
            server_address: IpAddrMask::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 32),
            split_tunnel: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Reconciled(ReconcileReport),
    /// The operator quit at a prompt; nothing was changed.
    Aborted,
}

/// Parse the listen port answer; an empty answer selects [`DEFAULT_LISTEN_PORT`].
pub fn parse_port(input: &str) -> Result<u16, GatewayError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(DEFAULT_LISTEN_PORT);
    }
    match input.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(GatewayError::InvalidPort(input.to_string())),
    }
}

pub struct Gateway<'a> {
    config: &'a GatewayConfig,
    keys: &'a dyn KeyPairProvider,
    service: &'a mut dyn ServiceControl,
    prompt: &'a mut dyn Prompt,
}

impl<'a> Gateway<'a> {
    pub fn new(
        config: &'a GatewayConfig,
        keys: &'a dyn KeyPairProvider,
        service: &'a mut dyn ServiceControl,
        prompt: &'a mut dyn Prompt,
    ) -> Self {
        Self {
            config,
            keys,
            service,
            prompt,
        }
    }

    fn ask_port(&mut self) -> Result<u16, GatewayError> {
        let answer = self.prompt.ask(&format!(
            "What port would you like to run WireGuard on? (default={DEFAULT_LISTEN_PORT})"
        ))?;
        parse_port(&answer)
    }

    fn new_server(&self, port: u16, network: &NetworkInfo) -> Result<ServerConfig, GatewayError> {
        let keys = self.keys.generate_key_pair()?;
        Ok(ServerConfig::new(
            keys,
            port,
            self.config.server_address.clone(),
            &network.interface,
        ))
    }

    /// What every new client file points at.
    #[must_use]
    pub fn peer_context(&self, listen_port: u16, network: &NetworkInfo) -> PeerContext {
        let allowed_ips = if self.config.split_tunnel {
            vec![self.config.server_address.network(), network.subnet.clone()]
        } else {
            vec![IpAddrMask::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)]
        };
        PeerContext {
            endpoint: SocketAddr::new(network.public_ip, listen_port).to_string(),
            allowed_ips,
        }
    }

    /// Run the whole flow against the given network snapshot.
    ///
    /// The declared list is loaded and the port is parsed before anything on disk changes.
    pub fn run(&mut self, network: &NetworkInfo) -> Result<Outcome, GatewayError> {
        let declared = ClientList::load(&self.config.clients_file)?;
        let mut store = PeerStore::open(&self.config.wg_dir, &self.config.ifname)?;

        if store.state() == StoreState::Absent {
            let port = self.ask_port()?;
            let server = self.new_server(port, network)?;
            store.init(server)?;
        } else {
            self.prompt.say("WireGuard is already installed and configured!");
            match self.prompt.confirm("Do you want to reconfigure WireGuard?")? {
                Answer::Yes => {
                    let port = self.ask_port()?;
                    let server = self.new_server(port, network)?;
                    self.service.stop();
                    store.rewrite(server)?;
                    let removed = store.clear_client_files();
                    info!("Removed {removed} client files invalidated by the new server key");
                }
                Answer::No => debug!("Keeping existing server configuration"),
                Answer::Quit => return Ok(Outcome::Aborted),
            }
        }

        let listen_port = store
            .server()
            .map(|server| server.listen_port)
            .ok_or(GatewayError::NotConfigured)?;
        let context = self.peer_context(listen_port, network);
        let mut reconciler = Reconciler::new(&mut store, self.keys, &mut *self.service);
        let report = reconciler.reconcile(&declared, &context)?;
        Ok(Outcome::Reconciled(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_answers() {
        assert_eq!(parse_port("").unwrap(), DEFAULT_LISTEN_PORT);
        assert_eq!(parse_port(" 4500 ").unwrap(), 4500);
        assert!(matches!(parse_port("abc"), Err(GatewayError::InvalidPort(_))));
        assert!(matches!(parse_port("0"), Err(GatewayError::InvalidPort(_))));
        assert!(matches!(parse_port("70000"), Err(GatewayError::InvalidPort(_))));
    }
}
