//! On-disk peer store.
//!
//! The aggregate file `<wg-dir>/<ifname>.conf` is the single source of truth for which peers
//! are active. It is parsed once into a [`ServerConfig`] and an ordered list of
//! [`PeerEntry`] stanzas, mutated in memory, and written back atomically after every change.
//! Per-client files under `<wg-dir>/clients/` are derived artifacts kept in lockstep.

use std::{
    fs, io,
    io::Write,
    net::IpAddr,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::{
    client::{ClientConfigFile, ClientRecord, PERSISTENT_KEEPALIVE},
    conf,
    key::Key,
    keygen::{derive_public_key, KeyPairProvider},
    net::IpAddrMask,
    peer::PeerEntry,
    server::ServerConfig,
    GatewayError,
};

const CLIENTS_DIR: &str = "clients";
const PUBLIC_KEY_FILE: &str = "public_key";

/// Lifecycle of the aggregate file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    Absent,
    /// Interface section, zero peers.
    ServerOnly,
    /// Interface section and at least one peer.
    Populated,
}

/// Everything a new client file needs to know about the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerContext {
    /// `host:port` clients connect to.
    pub endpoint: String,
    /// Routes the client sends through the tunnel.
    pub allowed_ips: Vec<IpAddrMask>,
}

pub struct PeerStore {
    wg_dir: PathBuf,
    ifname: String,
    server: Option<ServerConfig>,
    peers: Vec<PeerEntry>,
}

impl PeerStore {
    /// Open the store for interface `ifname` under `wg_dir`, loading the aggregate file if
    /// it exists.
    pub fn open(
        wg_dir: impl Into<PathBuf>,
        ifname: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let mut store = Self {
            wg_dir: wg_dir.into(),
            ifname: ifname.into(),
            server: None,
            peers: Vec::new(),
        };
        store.load()?;
        Ok(store)
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.wg_dir.join(format!("{}.conf", self.ifname))
    }

    #[must_use]
    pub fn public_key_path(&self) -> PathBuf {
        self.wg_dir.join(PUBLIC_KEY_FILE)
    }

    #[must_use]
    pub fn clients_dir(&self) -> PathBuf {
        self.wg_dir.join(CLIENTS_DIR)
    }

    #[must_use]
    pub fn client_path(&self, name: &str) -> PathBuf {
        self.clients_dir().join(format!("{name}.conf"))
    }

    #[must_use]
    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    #[must_use]
    pub fn state(&self) -> StoreState {
        match (&self.server, self.peers.is_empty()) {
            (None, _) => StoreState::Absent,
            (Some(_), true) => StoreState::ServerOnly,
            (Some(_), false) => StoreState::Populated,
        }
    }

    #[must_use]
    pub fn server(&self) -> Option<&ServerConfig> {
        self.server.as_ref()
    }

    #[must_use]
    pub fn peers(&self) -> &[PeerEntry] {
        &self.peers
    }

    fn malformed(&self, path: &Path, reason: impl Into<String>) -> GatewayError {
        GatewayError::MalformedConfig {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn load(&mut self) -> Result<(), GatewayError> {
        let path = self.config_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} does not exist", path.display());
                self.server = None;
                self.peers.clear();
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let sections = conf::parse(&text)
            .map_err(|err| self.malformed(&path, format!("line {}: {}", err.line, err.reason)))?;
        let mut sections = sections.into_iter();
        let interface = match sections.next() {
            Some(section) if section.name.eq_ignore_ascii_case("Interface") => section,
            Some(section) => {
                return Err(self.malformed(
                    &path,
                    format!("expected [Interface] first, found [{}]", section.name),
                ))
            }
            None => return Err(self.malformed(&path, "no [Interface] section")),
        };

        let server =
            ServerConfig::from_section(&interface).map_err(|reason| self.malformed(&path, reason))?;

        let mut peers = Vec::new();
        for section in sections {
            if !section.name.eq_ignore_ascii_case("Peer") {
                return Err(self.malformed(&path, format!("unexpected [{}] section", section.name)));
            }
            let peer =
                PeerEntry::from_section(&section).map_err(|reason| self.malformed(&path, reason))?;
            peers.push(peer);
        }

        self.sync_public_key(&server.public_key)?;
        debug!("Loaded {} with {} peers", path.display(), peers.len());
        self.server = Some(server);
        self.peers = peers;
        Ok(())
    }

    /// Aggregate file contents: interface section, then peer stanzas separated by one blank
    /// line.
    #[must_use]
    pub fn as_config(&self) -> String {
        let mut output = self
            .server
            .as_ref()
            .map(ServerConfig::as_config)
            .unwrap_or_default();
        for peer in &self.peers {
            output.push('\n');
            output.push_str(&peer.as_config());
        }
        output
    }

    /// Write `contents` to `path` through a temporary file in the same directory, so readers
    /// never observe a partial write.
    fn write_atomic(path: &Path, contents: &str) -> Result<(), GatewayError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    fn save(&self) -> Result<(), GatewayError> {
        let path = self.config_path();
        debug!("Writing {}", path.display());
        Self::write_atomic(&path, &self.as_config())
    }

    fn write_public_key(&self, public_key: &Key) -> Result<(), GatewayError> {
        Self::write_atomic(&self.public_key_path(), &format!("{public_key}\n"))
    }

    /// Restore `public_key` when it is missing or does not belong to the interface private key.
    fn sync_public_key(&self, public_key: &Key) -> Result<(), GatewayError> {
        let path = self.public_key_path();
        let stored = match fs::read_to_string(&path) {
            Ok(text) => text.parse::<Key>().ok(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        if stored.as_ref() != Some(public_key) {
            warn!(
                "{} is missing or does not match the interface private key, rewriting it",
                path.display()
            );
            self.write_public_key(public_key)?;
        }
        Ok(())
    }

    fn write_server(&mut self, server: ServerConfig) -> Result<(), GatewayError> {
        fs::create_dir_all(&self.wg_dir)?;
        fs::create_dir_all(self.clients_dir())?;
        self.write_public_key(&server.public_key)?;
        info!(
            "Writing interface {} listening on port {}",
            self.ifname, server.listen_port
        );
        self.server = Some(server);
        self.peers.clear();
        self.save()
    }

    /// Create the aggregate file with `server` and no peers: `Absent` to `ServerOnly`.
    pub fn init(&mut self, server: ServerConfig) -> Result<(), GatewayError> {
        if self.state() != StoreState::Absent {
            return Err(GatewayError::AlreadyConfigured(self.config_path()));
        }
        self.write_server(server)
    }

    /// Replace the interface section and drop every peer.
    ///
    /// Clients reference the previous server public key, so existing client files become
    /// useless; see [`PeerStore::clear_client_files`].
    pub fn rewrite(&mut self, server: ServerConfig) -> Result<(), GatewayError> {
        if !self.peers.is_empty() {
            warn!(
                "Reconfiguring {} drops {} existing peers",
                self.ifname,
                self.peers.len()
            );
        }
        self.write_server(server)
    }

    /// Host addresses of every `AllowedIPs` entry, in file order.
    #[must_use]
    pub fn list_existing_addresses(&self) -> Vec<IpAddr> {
        self.peers.iter().flat_map(PeerEntry::addresses).collect()
    }

    /// Generate keys for `client`, write its client file and append its stanza.
    ///
    /// Adding an address that is already present appends a second stanza; callers are
    /// expected to diff first.
    pub fn add_peer(
        &mut self,
        keys: &dyn KeyPairProvider,
        client: &ClientRecord,
        context: &PeerContext,
    ) -> Result<PeerEntry, GatewayError> {
        let server_public_key = self
            .server
            .as_ref()
            .map(|server| server.public_key.clone())
            .ok_or(GatewayError::NotConfigured)?;
        let client_keys = keys.generate_key_pair()?;

        let client_file = ClientConfigFile {
            address: IpAddrMask::host(client.ip()),
            private_key: client_keys.private,
            server_public_key,
            endpoint: context.endpoint.clone(),
            allowed_ips: context.allowed_ips.clone(),
            persistent_keepalive: PERSISTENT_KEEPALIVE,
        };
        let client_path = self.client_path(&client.name);
        fs::create_dir_all(self.clients_dir())?;
        Self::write_atomic(&client_path, &client_file.as_config())?;
        debug!("Wrote client file {}", client_path.display());

        let peer = PeerEntry::new(client_keys.public, client.ip());
        self.peers.push(peer.clone());
        self.save()?;
        info!("Added peer {} ({})", client.name, client.address);
        Ok(peer)
    }

    /// Delete the client file of `name` and the first stanza routing `address`.
    ///
    /// Returns whether a stanza was removed. A missing client file is not an error.
    pub fn remove_peer(&mut self, name: &str, address: IpAddr) -> Result<bool, GatewayError> {
        self.remove_client_file(name);
        let removed = self.remove_address(address)?;
        if removed {
            info!("Removed peer {name} ({address})");
        }
        Ok(removed)
    }

    /// Delete the first stanza routing `address`, leaving client files alone.
    pub fn remove_address(&mut self, address: IpAddr) -> Result<bool, GatewayError> {
        let Some(position) = self.peers.iter().position(|peer| peer.routes(address)) else {
            debug!("No peer routes {address}, nothing to remove");
            return Ok(false);
        };
        self.peers.remove(position);
        self.save()?;
        Ok(true)
    }

    /// Best-effort removal of a client file.
    pub fn remove_client_file(&self, name: &str) -> bool {
        let path = self.client_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed client file {}", path.display());
                true
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!("Failed to remove client file {}: {err}", path.display());
                false
            }
        }
    }

    /// Names (file stems) of all client files present on disk.
    #[must_use]
    pub fn client_names(&self) -> Vec<String> {
        let entries = match fs::read_dir(self.clients_dir()) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Cannot list {}: {err}", self.clients_dir().display());
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                (path.extension()? == "conf").then_some(())?;
                Some(path.file_stem()?.to_string_lossy().into_owned())
            })
            .collect();
        names.sort();
        names
    }

    /// Best-effort removal of every client file; returns how many were removed.
    pub fn clear_client_files(&self) -> usize {
        self.client_names()
            .iter()
            .filter(|name| self.remove_client_file(name))
            .count()
    }

    /// Remove the aggregate file, public key and all client files (best effort).
    pub fn teardown(&mut self) {
        self.clear_client_files();
        for path in [self.config_path(), self.public_key_path()] {
            match fs::remove_file(&path) {
                Ok(()) => info!("Removed {}", path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => (),
                Err(err) => warn!("Failed to remove {}: {err}", path.display()),
            }
        }
        self.server = None;
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, net::Ipv4Addr};

    use tempfile::TempDir;

    use super::*;
    use crate::key::KeyPair;

    /// Deterministic keys: `[n; 32]` / `[n + 1; 32]` for n = 10, 12, 14, ...
    struct CountingKeys(Cell<u8>);

    impl CountingKeys {
        fn new() -> Self {
            Self(Cell::new(10))
        }
    }

    impl KeyPairProvider for CountingKeys {
        fn generate_key_pair(&self) -> Result<KeyPair, GatewayError> {
            let n = self.0.get();
            self.0.set(n + 2);
            Ok(KeyPair::new(Key::new([n; 32]), Key::new([n + 1; 32])))
        }
    }

    fn server() -> ServerConfig {
        let private = Key::new([1; 32]);
        let public = derive_public_key(&private);
        ServerConfig::new(
            KeyPair::new(private, public),
            51820,
            "10.0.0.1/32".parse().unwrap(),
            "eth0",
        )
    }

    fn context() -> PeerContext {
        PeerContext {
            endpoint: "203.0.113.7:51820".into(),
            allowed_ips: vec!["0.0.0.0/0".parse().unwrap()],
        }
    }

    fn client(name: &str, last: u8) -> ClientRecord {
        ClientRecord::new(name, Ipv4Addr::new(10, 0, 0, last), true)
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn populated(dir: &TempDir) -> (PeerStore, CountingKeys) {
        let keys = CountingKeys::new();
        let mut store = PeerStore::open(dir.path(), "wg0").unwrap();
        store.init(server()).unwrap();
        for (name, last) in [("p1", 2), ("p2", 3), ("p3", 4)] {
            store.add_peer(&keys, &client(name, last), &context()).unwrap();
        }
        (store, keys)
    }

    #[test]
    fn state_transitions() {
        let dir = TempDir::new().unwrap();
        let keys = CountingKeys::new();
        let mut store = PeerStore::open(dir.path(), "wg0").unwrap();
        assert_eq!(store.state(), StoreState::Absent);
        assert!(store.list_existing_addresses().is_empty());

        store.init(server()).unwrap();
        assert_eq!(store.state(), StoreState::ServerOnly);
        assert!(matches!(
            store.init(server()),
            Err(GatewayError::AlreadyConfigured(_))
        ));

        store.add_peer(&keys, &client("a", 2), &context()).unwrap();
        assert_eq!(store.state(), StoreState::Populated);

        store.remove_peer("a", ip(2)).unwrap();
        assert_eq!(store.state(), StoreState::ServerOnly);

        store.teardown();
        assert_eq!(store.state(), StoreState::Absent);
        assert!(!store.config_path().exists());
    }

    #[test]
    fn add_peer_requires_server() {
        let dir = TempDir::new().unwrap();
        let mut store = PeerStore::open(dir.path(), "wg0").unwrap();
        assert!(matches!(
            store.add_peer(&CountingKeys::new(), &client("a", 2), &context()),
            Err(GatewayError::NotConfigured)
        ));
    }

    #[test]
    fn listing_is_stable_and_ordered() {
        let dir = TempDir::new().unwrap();
        let (store, _) = populated(&dir);
        let expected = vec![ip(2), ip(3), ip(4)];
        assert_eq!(store.list_existing_addresses(), expected);
        assert_eq!(store.list_existing_addresses(), expected);

        let reopened = PeerStore::open(dir.path(), "wg0").unwrap();
        assert_eq!(reopened.list_existing_addresses(), expected);
        assert_eq!(reopened.server(), store.server());
    }

    #[test]
    fn aggregate_file_format() {
        let dir = TempDir::new().unwrap();
        let keys = CountingKeys::new();
        let mut store = PeerStore::open(dir.path(), "wg0").unwrap();
        store.init(server()).unwrap();
        store.add_peer(&keys, &client("a", 2), &context()).unwrap();

        let text = fs::read_to_string(store.config_path()).unwrap();
        let expected = format!(
            "{}\n[Peer]\nPublicKey = {}\nAllowedIPs = 10.0.0.2/32\n",
            server().as_config(),
            Key::new([11; 32])
        );
        assert_eq!(text, expected);
        let server_public_key = server().public_key;
        assert_eq!(
            fs::read_to_string(store.public_key_path()).unwrap(),
            format!("{server_public_key}\n")
        );

        let client_file = fs::read_to_string(store.client_path("a")).unwrap();
        assert!(client_file.contains(&format!("PrivateKey = {}\n", Key::new([10; 32]))));
        assert!(client_file.contains(&format!("PublicKey = {server_public_key}\n")));
        assert!(client_file.contains("Endpoint = 203.0.113.7:51820\n"));
    }

    #[test]
    fn remove_middle_stanza_keeps_neighbours() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = populated(&dir);
        let before = store.peers().to_vec();

        assert!(store.remove_peer("p2", ip(3)).unwrap());

        let text = fs::read_to_string(store.config_path()).unwrap();
        assert_eq!(text.matches("[Peer]").count(), 2);
        assert!(text.contains(&before[0].as_config()));
        assert!(text.contains(&before[2].as_config()));
        assert!(!text.contains(&before[1].public_key.to_string()));
        assert!(!store.client_path("p2").exists());
        assert!(store.client_path("p1").exists());
        assert!(store.client_path("p3").exists());
        assert_eq!(store.list_existing_addresses(), vec![ip(2), ip(4)]);
    }

    #[test]
    fn remove_matches_exact_address() {
        let dir = TempDir::new().unwrap();
        let keys = CountingKeys::new();
        let mut store = PeerStore::open(dir.path(), "wg0").unwrap();
        store.init(server()).unwrap();
        store.add_peer(&keys, &client("long", 23), &context()).unwrap();
        store.add_peer(&keys, &client("short", 2), &context()).unwrap();

        store.remove_peer("short", ip(2)).unwrap();
        assert_eq!(store.list_existing_addresses(), vec![ip(23)]);
    }

    #[test]
    fn remove_absent_peer_is_noop() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = populated(&dir);
        let before = fs::read_to_string(store.config_path()).unwrap();

        assert!(!store.remove_peer("ghost", ip(99)).unwrap());
        assert_eq!(fs::read_to_string(store.config_path()).unwrap(), before);
    }

    #[test]
    fn duplicate_add_appends_second_stanza() {
        let dir = TempDir::new().unwrap();
        let keys = CountingKeys::new();
        let mut store = PeerStore::open(dir.path(), "wg0").unwrap();
        store.init(server()).unwrap();
        store.add_peer(&keys, &client("a", 2), &context()).unwrap();
        store.add_peer(&keys, &client("a", 2), &context()).unwrap();
        assert_eq!(store.list_existing_addresses(), vec![ip(2), ip(2)]);
    }

    #[test]
    fn rewrite_drops_peers() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = populated(&dir);
        let mut new_server = server();
        new_server.listen_port = 4500;

        store.rewrite(new_server).unwrap();
        assert!(store.list_existing_addresses().is_empty());
        assert_eq!(store.state(), StoreState::ServerOnly);

        let reopened = PeerStore::open(dir.path(), "wg0").unwrap();
        assert!(reopened.list_existing_addresses().is_empty());
        assert_eq!(reopened.server().unwrap().listen_port, 4500);
        assert_eq!(store.clear_client_files(), 3);
        assert!(store.client_names().is_empty());
    }

    #[test]
    fn tolerate_blank_lines_inside_stanzas() {
        let dir = TempDir::new().unwrap();
        let (store, _) = populated(&dir);
        let loose = fs::read_to_string(store.config_path())
            .unwrap()
            .replace("[Peer]\n", "\n[Peer]\n\n")
            .replace("AllowedIPs", "\nAllowedIPs");
        fs::write(store.config_path(), loose).unwrap();

        let mut reopened = PeerStore::open(dir.path(), "wg0").unwrap();
        assert_eq!(reopened.list_existing_addresses(), vec![ip(2), ip(3), ip(4)]);
        reopened.remove_peer("p2", ip(3)).unwrap();
        assert_eq!(reopened.list_existing_addresses(), vec![ip(2), ip(4)]);
    }

    #[test]
    fn reject_malformed_aggregate_file() {
        let dir = TempDir::new().unwrap();
        let (store, _) = populated(&dir);
        let broken = fs::read_to_string(store.config_path())
            .unwrap()
            .replacen("PublicKey = ", "PublicKey = !!", 1);
        fs::write(store.config_path(), broken).unwrap();

        assert!(matches!(
            PeerStore::open(dir.path(), "wg0"),
            Err(GatewayError::MalformedConfig { .. })
        ));
    }

    #[test]
    fn missing_public_key_file_is_restored() {
        let dir = TempDir::new().unwrap();
        let (store, _) = populated(&dir);
        fs::remove_file(store.public_key_path()).unwrap();

        let reopened = PeerStore::open(dir.path(), "wg0").unwrap();
        assert_eq!(reopened.server().unwrap().public_key, server().public_key);
        assert_eq!(
            fs::read_to_string(store.public_key_path()).unwrap(),
            format!("{}\n", server().public_key)
        );
    }

    #[test]
    fn stale_public_key_file_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let (store, _) = populated(&dir);
        for stale in ["garbage\n".to_string(), format!("{}\n", Key::new([9; 32]))] {
            fs::write(store.public_key_path(), stale).unwrap();
            let reopened = PeerStore::open(dir.path(), "wg0").unwrap();
            assert_eq!(reopened.server(), store.server());
            assert_eq!(
                fs::read_to_string(store.public_key_path()).unwrap(),
                format!("{}\n", server().public_key)
            );
        }
    }
}
