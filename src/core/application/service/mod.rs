pub mod command_dispatcher;
pub mod resource_acquisition;
pub mod virtual_machine_launcher;
