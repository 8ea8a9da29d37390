pub mod connection_manager;
pub mod datacenter_registry;
pub mod interrupt;
pub mod inventory_cache;
