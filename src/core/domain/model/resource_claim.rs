//! A build's declared set of machines and the exclusivity keys it exposes.

use crate::core::domain::{
    error::ValidationError,
    model::virtual_machine::VirtualMachineIdentity,
    value_object::{DatacenterUri, MachineName},
};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// One machine a build asks for, by datacenter and name.
///
/// Resolution to an identity is memoized on the request instance: once a
/// request resolved, later resolutions return the same identity without
/// consulting the inventory again.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    datacenter_uri: DatacenterUri,
    machine_name: MachineName,
    resolved: OnceLock<Arc<VirtualMachineIdentity>>,
}

impl ResourceRequest {
    pub fn new(datacenter_uri: DatacenterUri, machine_name: MachineName) -> Self {
        Self {
            datacenter_uri,
            machine_name,
            resolved: OnceLock::new(),
        }
    }

    pub fn parse(datacenter_uri: &str, machine_name: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(
            DatacenterUri::new(datacenter_uri)?,
            MachineName::new(machine_name)?,
        ))
    }

    pub fn datacenter_uri(&self) -> &DatacenterUri {
        &self.datacenter_uri
    }

    pub fn machine_name(&self) -> &MachineName {
        &self.machine_name
    }

    /// Resolves the request with `lookup`, remembering a successful answer.
    ///
    /// A miss is not remembered, so a machine that appears in a later
    /// inventory refresh can still be resolved.
    pub fn resolve_with<F>(&self, lookup: F) -> Option<Arc<VirtualMachineIdentity>>
    where
        F: FnOnce(&DatacenterUri, &MachineName) -> Option<Arc<VirtualMachineIdentity>>,
    {
        if let Some(identity) = self.resolved.get() {
            return Some(Arc::clone(identity));
        }
        let identity = lookup(&self.datacenter_uri, &self.machine_name)?;
        Some(Arc::clone(self.resolved.get_or_init(|| identity)))
    }

    /// The exclusivity key for this request: the machine nested under its datacenter.
    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey {
            datacenter_uri: self.datacenter_uri.clone(),
            machine_name: self.machine_name.clone(),
        }
    }
}

impl PartialEq for ResourceRequest {
    fn eq(&self, other: &Self) -> bool {
        self.datacenter_uri == other.datacenter_uri && self.machine_name == other.machine_name
    }
}

impl Eq for ResourceRequest {}

impl fmt::Display for ResourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.machine_name, self.datacenter_uri)
    }
}

/// A mutual-exclusion key handed to the host scheduler.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub datacenter_uri: DatacenterUri,
    pub machine_name: MachineName,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.datacenter_uri, self.machine_name)
    }
}

/// The write-locked resources a claim needs exclusive use of.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceList {
    keys: Vec<ResourceKey>,
}

impl ResourceList {
    pub fn keys(&self) -> &[ResourceKey] {
        &self.keys
    }

    /// True when both lists would lock at least one common machine.
    pub fn conflicts_with(&self, other: &ResourceList) -> bool {
        self.keys.iter().any(|key| other.keys.contains(key))
    }
}

/// The ordered set of machines one build execution claims.
#[derive(Debug, Clone, Default)]
pub struct ResourceClaim {
    requests: Vec<ResourceRequest>,
}

impl ResourceClaim {
    pub fn new(requests: Vec<ResourceRequest>) -> Self {
        Self { requests }
    }

    /// Requests in declared order.
    pub fn requests(&self) -> &[ResourceRequest] {
        &self.requests
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn resource_list(&self) -> ResourceList {
        let mut keys: Vec<ResourceKey> = Vec::with_capacity(self.requests.len());
        for request in &self.requests {
            let key = request.resource_key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        ResourceList { keys }
    }
}
