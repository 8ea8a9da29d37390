//! Collaborator seams: the virtualization backend, the CI host's build log and
//! delegate launchers.

mod build_logger;
mod datacenter;
mod launcher;

pub use build_logger::{BUILD_LOG_PREFIX, BuildLogger, TracingBuildLogger};
pub use datacenter::{CompletionToken, Connector, DatacenterHandle};
pub use launcher::Launcher;

#[cfg(test)]
pub(crate) use datacenter::{MockConnector, MockDatacenterHandle};

pub(crate) use build_logger::{build_error, build_line};
