//! Execution-node launcher that powers its machine on and off around a delegate.

use crate::core::{
    application::service::resource_acquisition::ResourceAcquisitionWrapper,
    domain::{
        error::{VirtualizationError, VirtualizationResult},
        model::resource_claim::{ResourceClaim, ResourceRequest},
        port::{BuildLogger, Launcher, build_error},
    },
    infrastructure::interrupt::Interrupt,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Starts the node's virtual machine, then hands over to the delegate launcher.
///
/// After the node disconnects the machine is suspended again. Failing to
/// suspend is logged, never propagated.
pub struct VirtualMachineLauncher {
    machine: ResourceClaim,
    acquisition: Arc<ResourceAcquisitionWrapper>,
    delegate: Arc<dyn Launcher>,
    interrupt: Interrupt,
}

impl VirtualMachineLauncher {
    pub fn new(
        machine: ResourceRequest,
        acquisition: Arc<ResourceAcquisitionWrapper>,
        delegate: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            machine: ResourceClaim::new(vec![machine]),
            acquisition,
            delegate,
            interrupt: Interrupt::never(),
        }
    }

    /// Aborts waits on the backend once `interrupt` fires.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn machine(&self) -> &ResourceRequest {
        &self.machine.requests()[0]
    }
}

#[async_trait]
impl Launcher for VirtualMachineLauncher {
    fn is_launch_supported(&self) -> bool {
        self.delegate.is_launch_supported()
    }

    async fn launch(&self, node: &str, logger: &dyn BuildLogger) -> VirtualizationResult<()> {
        if let Err(failure) = self
            .acquisition
            .acquire(&self.machine, logger, &self.interrupt)
            .await
        {
            build_error(
                logger,
                format!("Could not start virtual computer {} for node {}", self.machine(), node),
            );
            return Err(VirtualizationError::Launch(failure.to_string()));
        }
        self.delegate.launch(node, logger).await
    }

    async fn before_disconnect(&self, node: &str, logger: &dyn BuildLogger) {
        self.delegate.before_disconnect(node, logger).await;
    }

    async fn after_disconnect(&self, node: &str, logger: &dyn BuildLogger) {
        self.delegate.after_disconnect(node, logger).await;
        let suspended = self
            .acquisition
            .release_claim(&self.machine, logger, &self.interrupt)
            .await;
        if !suspended {
            warn!(node, machine = %self.machine(), "could not suspend virtual computer after disconnect");
        }
    }
}
