//! Reconciliation of the declared client list against the peer store.

use std::{collections::HashSet, net::IpAddr};

use crate::{
    client::{ClientList, ClientRecord},
    keygen::KeyPairProvider,
    service::ServiceControl,
    store::{PeerContext, PeerStore},
    GatewayError,
};

/// Changes needed to bring the store in line with the declared list.
#[derive(Debug, PartialEq, Eq)]
pub struct ReconcilePlan<'a> {
    /// Enabled records whose address is not configured yet, in declared order.
    pub to_add: Vec<&'a ClientRecord>,
    /// Enabled records whose address is configured but whose client file is gone, e.g. after
    /// a rename. Their stanza is replaced and a new client file issued.
    pub to_reissue: Vec<&'a ClientRecord>,
    /// Every disabled record, present or not.
    pub to_remove: Vec<&'a ClientRecord>,
    /// Configured addresses that belong to no declared record.
    pub undeclared: Vec<IpAddr>,
}

impl<'a> ReconcilePlan<'a> {
    /// Diff `declared` against the configured addresses and the names of the client files
    /// on disk.
    #[must_use]
    pub fn new(declared: &'a ClientList, existing: &[IpAddr], client_files: &[String]) -> Self {
        let existing_set: HashSet<IpAddr> = existing.iter().copied().collect();
        let declared_set: HashSet<IpAddr> = declared.users.iter().map(ClientRecord::ip).collect();
        let issued: HashSet<&str> = client_files.iter().map(String::as_str).collect();

        let to_add = declared
            .enabled()
            .filter(|client| !existing_set.contains(&client.ip()))
            .collect();
        let to_reissue = declared
            .enabled()
            .filter(|client| {
                existing_set.contains(&client.ip()) && !issued.contains(client.name.as_str())
            })
            .collect();
        let to_remove = declared
            .users
            .iter()
            .filter(|client| !client.enabled)
            .collect();
        let mut seen = HashSet::new();
        let undeclared = existing
            .iter()
            .copied()
            .filter(|ip| !declared_set.contains(ip) && seen.insert(*ip))
            .collect();

        Self {
            to_add,
            to_reissue,
            to_remove,
            undeclared,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    /// Configured clients that got new keys and a new client file.
    pub reissued: Vec<String>,
    /// Disabled clients whose stanza was actually present.
    pub removed: Vec<String>,
    /// Stanzas removed because no declared record uses their address.
    pub pruned_peers: Vec<IpAddr>,
    /// Client files removed because their name is not an enabled declared client.
    pub pruned_files: Vec<String>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.reissued.is_empty()
            && self.removed.is_empty()
            && self.pruned_peers.is_empty()
            && self.pruned_files.is_empty()
    }
}

/// Applies a [`ReconcilePlan`] through the store, then restarts the service.
///
/// Fail-fast: the first error aborts the pass and leaves already applied changes on disk.
pub struct Reconciler<'a> {
    store: &'a mut PeerStore,
    keys: &'a dyn KeyPairProvider,
    service: &'a mut dyn ServiceControl,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a mut PeerStore,
        keys: &'a dyn KeyPairProvider,
        service: &'a mut dyn ServiceControl,
    ) -> Self {
        Self {
            store,
            keys,
            service,
        }
    }

    pub fn reconcile(
        &mut self,
        declared: &ClientList,
        context: &PeerContext,
    ) -> Result<ReconcileReport, GatewayError> {
        let existing = self.store.list_existing_addresses();
        let client_files = self.store.client_names();
        let plan = ReconcilePlan::new(declared, &existing, &client_files);
        debug!(
            "Reconciliation plan: {} to add, {} to reissue, {} to remove, {} undeclared",
            plan.to_add.len(),
            plan.to_reissue.len(),
            plan.to_remove.len(),
            plan.undeclared.len()
        );
        let mut report = ReconcileReport::default();

        for client in plan.to_add {
            self.store.add_peer(self.keys, client, context)?;
            report.added.push(client.name.clone());
        }

        for client in plan.to_reissue {
            let replaced = self.remove_all(client.ip())?;
            self.store.add_peer(self.keys, client, context)?;
            info!(
                "Reissued client {} ({}), replacing {replaced} stanzas without a client file",
                client.name, client.address
            );
            report.reissued.push(client.name.clone());
        }

        for client in plan.to_remove {
            if self.store.remove_peer(&client.name, client.ip())? {
                report.removed.push(client.name.clone());
            }
        }

        for address in plan.undeclared {
            let removed = self.remove_all(address)?;
            info!("Removed {removed} undeclared peer stanzas for {address}");
            report.pruned_peers.push(address);
        }

        let keep: HashSet<&str> = declared.enabled().map(|client| client.name.as_str()).collect();
        for name in self.store.client_names() {
            if !keep.contains(name.as_str()) && self.store.remove_client_file(&name) {
                info!("Removed stale client file for {name}");
                report.pruned_files.push(name);
            }
        }

        self.service.restart()?;
        Ok(report)
    }

    /// Drop every stanza routing `address`; there may be duplicates.
    fn remove_all(&mut self, address: IpAddr) -> Result<usize, GatewayError> {
        let mut removed = 0;
        while self.store.remove_address(address)? {
            removed += 1;
        }
        Ok(removed)
    }
}
