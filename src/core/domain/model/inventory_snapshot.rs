//! Immutable, atomically published view of a datacenter's machines.

use crate::core::domain::{
    model::{
        power_state::PowerState,
        virtual_machine::{MachineListing, VirtualMachineIdentity},
    },
    value_object::DatacenterUri,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;

/// A known machine and its last observed power state.
#[derive(Debug, Clone)]
pub struct InventoryEntry {
    pub identity: Arc<VirtualMachineIdentity>,
    pub power_state: PowerState,
}

/// A complete machine inventory for one datacenter.
///
/// Snapshots are never mutated after construction; a refresh builds a new one
/// and swaps it in.
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    machines: BTreeMap<String, InventoryEntry>,
    valid_until: Instant,
}

impl InventorySnapshot {
    /// An empty snapshot that is already stale.
    pub fn empty() -> Self {
        Self {
            machines: BTreeMap::new(),
            valid_until: Instant::now(),
        }
    }

    /// Builds the successor of `previous` from a fresh backend listing.
    ///
    /// Machines only in the listing get a new identity, machines only in
    /// `previous` are dropped, and machines in both keep the identity `Arc`
    /// they already had.
    pub fn reconcile(
        previous: Option<&InventorySnapshot>,
        datacenter_uri: &DatacenterUri,
        listing: Vec<MachineListing>,
        valid_until: Instant,
    ) -> Self {
        let mut machines = BTreeMap::new();
        for machine in listing {
            let identity = previous
                .and_then(|snapshot| snapshot.machines.get(&machine.name))
                .map(|entry| Arc::clone(&entry.identity))
                .unwrap_or_else(|| {
                    Arc::new(VirtualMachineIdentity::new(
                        datacenter_uri.clone(),
                        machine.name.clone(),
                    ))
                });
            machines.insert(
                machine.name,
                InventoryEntry {
                    identity,
                    power_state: machine.power_state,
                },
            );
        }
        Self {
            machines,
            valid_until,
        }
    }

    pub fn get(&self, name: &str) -> Option<&InventoryEntry> {
        self.machines.get(name)
    }

    /// Identities in name order.
    pub fn identities(&self) -> impl Iterator<Item = &Arc<VirtualMachineIdentity>> {
        self.machines.values().map(|entry| &entry.identity)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &InventoryEntry)> {
        self.machines.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn valid_until(&self) -> Instant {
        self.valid_until
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now > self.valid_until
    }
}
