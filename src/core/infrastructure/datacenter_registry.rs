//! The managed datacenters, keyed by URI.

use crate::core::{
    domain::{
        model::{datacenter_endpoint::DatacenterEndpoint, virtual_machine::VirtualMachineIdentity},
        port::Connector,
        value_object::DatacenterUri,
    },
    infrastructure::{
        connection_manager::ConnectionManager,
        inventory_cache::{InventoryCache, RefreshTicket},
    },
};
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// One managed datacenter: its endpoint, connection and inventory.
pub struct Datacenter {
    endpoint: Arc<DatacenterEndpoint>,
    connections: Arc<ConnectionManager>,
    inventory: InventoryCache,
}

impl Datacenter {
    fn new(endpoint: DatacenterEndpoint, connector: Arc<dyn Connector>) -> Self {
        let endpoint = Arc::new(endpoint);
        let connections = Arc::new(ConnectionManager::new(Arc::clone(&endpoint), connector));
        let inventory = InventoryCache::new(Arc::clone(&connections));
        Self {
            endpoint,
            connections,
            inventory,
        }
    }

    pub fn endpoint(&self) -> &DatacenterEndpoint {
        &self.endpoint
    }

    pub fn uri(&self) -> &DatacenterUri {
        self.endpoint.uri()
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn inventory(&self) -> &InventoryCache {
        &self.inventory
    }
}

/// Registry of managed datacenters.
///
/// The registry is built explicitly and handed to the components that need
/// it. The datacenter map is published as a whole, so readers never lock.
pub struct DatacenterRegistry {
    connector: Arc<dyn Connector>,
    datacenters: ArcSwap<BTreeMap<DatacenterUri, Arc<Datacenter>>>,
}

impl DatacenterRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            datacenters: ArcSwap::from_pointee(BTreeMap::new()),
        }
    }

    /// Adds a datacenter, or replaces the one with the same URI.
    ///
    /// The new datacenter starts its first inventory refresh immediately; a
    /// replaced datacenter's connection is closed in the background. Must be
    /// called within a Tokio runtime.
    pub fn register(&self, endpoint: DatacenterEndpoint) -> (Arc<Datacenter>, RefreshTicket) {
        let datacenter = Arc::new(Datacenter::new(endpoint, Arc::clone(&self.connector)));
        let ticket = datacenter.inventory.refresh();

        let previous = self.datacenters.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.insert(datacenter.uri().clone(), Arc::clone(&datacenter));
            next
        });
        if let Some(replaced) = previous.get(datacenter.uri()) {
            info!(datacenter = %datacenter.uri(), "replacing datacenter configuration");
            let replaced = Arc::clone(replaced);
            tokio::spawn(async move { replaced.connections.close().await });
        } else {
            info!(datacenter = %datacenter.uri(), username = %datacenter.endpoint.username(), "registered datacenter");
        }
        (datacenter, ticket)
    }

    /// Removes a datacenter and closes its connection.
    pub async fn remove(&self, uri: &DatacenterUri) -> Option<Arc<Datacenter>> {
        let previous = self.datacenters.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.remove(uri);
            next
        });
        let removed = previous.get(uri).map(Arc::clone)?;
        removed.connections.close().await;
        Some(removed)
    }

    pub fn datacenter(&self, uri: &DatacenterUri) -> Option<Arc<Datacenter>> {
        self.datacenters.load().get(uri).map(Arc::clone)
    }

    /// Finds the datacenter configured for this URI and user.
    pub fn lookup_datacenter(&self, username: &str, uri: &str) -> Option<Arc<Datacenter>> {
        self.datacenters
            .load()
            .values()
            .find(|dc| dc.endpoint.username().as_str() == username && dc.uri().as_str() == uri)
            .map(Arc::clone)
    }

    /// All datacenters in URI order.
    pub fn datacenters(&self) -> Vec<Arc<Datacenter>> {
        self.datacenters.load().values().map(Arc::clone).collect()
    }

    /// Resolves a machine by datacenter and name through that datacenter's inventory.
    pub fn lookup(&self, uri: &DatacenterUri, machine_name: &str) -> Option<Arc<VirtualMachineIdentity>> {
        self.datacenter(uri)?.inventory.lookup(machine_name).ok()
    }

    /// Every machine known across all datacenters, ordered by name.
    pub fn all_machines(&self) -> Vec<Arc<VirtualMachineIdentity>> {
        let mut machines: Vec<Arc<VirtualMachineIdentity>> = self
            .datacenters
            .load()
            .values()
            .flat_map(|dc| dc.inventory.list().identities().cloned().collect::<Vec<_>>())
            .collect();
        machines.sort();
        machines
    }
}
