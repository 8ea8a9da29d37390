use crate::core::domain::{
    error::{BackendError, CompletionError},
    model::{
        power_state::MachineCommand,
        virtual_machine::{MachineId, MachineListing},
    },
    value_object::{DatacenterUri, DatacenterUsername},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Opens connections to a virtualization backend.
///
/// Implementations speak the backend's wire protocol; this crate only drives
/// them. The password arrives in plaintext and must not be logged.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        uri: &DatacenterUri,
        username: &DatacenterUsername,
        password: &str,
    ) -> Result<Arc<dyn DatacenterHandle>, BackendError>;
}

/// A live connection to one datacenter.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatacenterHandle: Send + Sync {
    /// Every machine the backend currently reports.
    async fn list_machines(&self) -> Result<Vec<MachineListing>, BackendError>;

    /// Issues `command` against a machine and returns a token tracking its completion.
    async fn execute(
        &self,
        command: MachineCommand,
        machine: &MachineId,
    ) -> Result<Box<dyn CompletionToken>, BackendError>;

    fn is_open(&self) -> bool;

    async fn close(&self);
}

/// Tracks the completion of one issued command.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompletionToken: Send {
    /// Waits at most `timeout` for the command to finish.
    ///
    /// # Errors
    /// `CompletionError::Timeout` if the wait elapsed first,
    /// `CompletionError::Execution` if the command failed.
    async fn wait(&mut self, timeout: Duration) -> Result<(), CompletionError>;
}
