//! Domain models for virtual machines known to a datacenter.

use crate::core::domain::{model::power_state::PowerState, value_object::DatacenterUri};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Backend-assigned identifier of a machine, opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct MachineId(pub String);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One machine as reported by a live listing of the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MachineListing {
    /// Backend identifier, used to address commands.
    pub id: MachineId,
    /// Name, unique within the datacenter.
    pub name: String,
    /// Power state at the time of the listing.
    pub power_state: PowerState,
}

impl MachineListing {
    pub fn new(id: impl Into<String>, name: impl Into<String>, power_state: PowerState) -> Self {
        Self {
            id: MachineId(id.into()),
            name: name.into(),
            power_state,
        }
    }
}

/// The identity of a virtual machine: a name within a datacenter.
///
/// Identities are immutable. They order by name first so sets of identities
/// iterate and display deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualMachineIdentity {
    datacenter_uri: DatacenterUri,
    name: String,
}

impl VirtualMachineIdentity {
    pub fn new(datacenter_uri: DatacenterUri, name: impl Into<String>) -> Self {
        Self {
            datacenter_uri,
            name: name.into(),
        }
    }

    pub fn datacenter_uri(&self) -> &DatacenterUri {
        &self.datacenter_uri
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Ord for VirtualMachineIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.datacenter_uri.cmp(&other.datacenter_uri))
    }
}

impl PartialOrd for VirtualMachineIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VirtualMachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.datacenter_uri)
    }
}
