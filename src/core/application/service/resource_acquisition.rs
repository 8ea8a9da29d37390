//! Powers a build's claimed machines on before it runs and suspends them afterwards.

use crate::core::{
    application::service::command_dispatcher::{CommandDispatcher, DriveTarget},
    domain::{
        error::{VirtualizationError, VirtualizationResult},
        model::{
            power_state::MachineCommand,
            resource_claim::{ResourceClaim, ResourceRequest},
            virtual_machine::VirtualMachineIdentity,
        },
        port::{BuildLogger, build_error, build_line},
    },
    infrastructure::{datacenter_registry::DatacenterRegistry, interrupt::Interrupt},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Acquisition did not complete; the build must not run.
#[derive(Error, Debug)]
#[error("could not acquire virtual computers: {cause}")]
pub struct AcquisitionFailure {
    /// The failure that stopped acquisition.
    #[source]
    pub cause: VirtualizationError,
    /// Whether every machine started before the failure was suspended again.
    pub rolled_back: bool,
}

/// Wraps a build's execution window: fail-fast acquire, drain-all release.
pub struct ResourceAcquisitionWrapper {
    registry: Arc<DatacenterRegistry>,
    dispatcher: Arc<CommandDispatcher>,
}

impl ResourceAcquisitionWrapper {
    pub fn new(registry: Arc<DatacenterRegistry>, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    /// Resolves and starts every machine of `claim`, in declared order.
    ///
    /// Stops at the first machine that cannot be resolved or started and
    /// suspends the machines already brought up before reporting failure.
    ///
    /// # Errors
    /// Returns `AcquisitionFailure` carrying the error that stopped acquisition.
    pub async fn acquire(
        &self,
        claim: &ResourceClaim,
        logger: &dyn BuildLogger,
        interrupt: &Interrupt,
    ) -> Result<AcquiredMachines, AcquisitionFailure> {
        info!(machines = claim.requests().len(), "acquiring virtual computers");
        let mut reached = Vec::with_capacity(claim.requests().len());
        let mut failure = None;
        for request in claim.requests() {
            let target = match self.resolve(request, logger) {
                Ok(target) => target,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            match self
                .dispatcher
                .drive_target(&target, MachineCommand::Start, logger, interrupt)
                .await
            {
                Ok(_) => reached.push(target),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let Some(cause) = failure else {
            return Ok(AcquiredMachines {
                targets: reached,
                dispatcher: Arc::clone(&self.dispatcher),
            });
        };

        warn!(error = %cause, started = reached.len(), "acquisition failed, suspending started machines");
        let rollback = self
            .dispatcher
            .drive_drain_all(&reached, MachineCommand::Suspend, logger, interrupt)
            .await;
        Err(AcquisitionFailure {
            cause,
            rolled_back: rollback.succeeded(),
        })
    }

    /// Suspends every machine of `claim` without having acquired it first.
    ///
    /// Used when a build's machines must be returned to the pool after the
    /// handle from [`acquire`](Self::acquire) is gone. A request that cannot
    /// be resolved counts as a failure; the others are still suspended.
    pub async fn release_claim(
        &self,
        claim: &ResourceClaim,
        logger: &dyn BuildLogger,
        interrupt: &Interrupt,
    ) -> bool {
        let mut targets = Vec::with_capacity(claim.requests().len());
        let mut resolved_all = true;
        for request in claim.requests() {
            match self.resolve(request, logger) {
                Ok(target) => targets.push(target),
                Err(_) => resolved_all = false,
            }
        }
        let report = self
            .dispatcher
            .drive_drain_all(&targets, MachineCommand::Suspend, logger, interrupt)
            .await;
        resolved_all && report.succeeded()
    }

    fn resolve(
        &self,
        request: &ResourceRequest,
        logger: &dyn BuildLogger,
    ) -> VirtualizationResult<DriveTarget> {
        let not_found = || {
            build_error(
                logger,
                format!(
                    "Could not find virtual computer {} in datacenter {}",
                    request.machine_name(),
                    request.datacenter_uri()
                ),
            );
            VirtualizationError::Resolution {
                uri: request.datacenter_uri().to_string(),
                name: request.machine_name().to_string(),
            }
        };

        let datacenter = self
            .registry
            .datacenter(request.datacenter_uri())
            .ok_or_else(not_found)?;
        let identity = request
            .resolve_with(|_, name| datacenter.inventory().lookup(name.as_str()).ok())
            .ok_or_else(not_found)?;
        Ok(DriveTarget {
            identity,
            connections: Arc::clone(datacenter.connections()),
        })
    }
}

/// The machines a build holds while it runs.
pub struct AcquiredMachines {
    targets: Vec<DriveTarget>,
    dispatcher: Arc<CommandDispatcher>,
}

impl AcquiredMachines {
    /// The held machines, in claim order.
    pub fn machines(&self) -> Vec<Arc<VirtualMachineIdentity>> {
        self.targets
            .iter()
            .map(|target| Arc::clone(&target.identity))
            .collect()
    }

    /// Suspends every held machine, continuing past failures.
    ///
    /// Returns `false` if any machine could not be suspended.
    pub async fn release(&self, logger: &dyn BuildLogger, interrupt: &Interrupt) -> bool {
        let report = self
            .dispatcher
            .drive_drain_all(&self.targets, MachineCommand::Suspend, logger, interrupt)
            .await;
        if !report.succeeded() {
            build_line(
                logger,
                format!(
                    "Could not suspend {} of {} virtual computers",
                    report.failures.len(),
                    self.targets.len()
                ),
            );
        }
        report.succeeded()
    }
}
