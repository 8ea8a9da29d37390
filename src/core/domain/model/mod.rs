pub mod datacenter_endpoint;
pub mod inventory_snapshot;
pub mod power_state;
pub mod resource_claim;
pub mod virtual_machine;
