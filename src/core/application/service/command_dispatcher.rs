//! Drives machines to a target power state through the backend's asynchronous commands.

use crate::core::{
    domain::{
        error::{BackendError, CompletionError, VirtualizationError, VirtualizationResult},
        model::{
            power_state::{MachineCommand, PowerState},
            virtual_machine::{MachineListing, VirtualMachineIdentity},
        },
        port::{BuildLogger, CompletionToken, DatacenterHandle, build_error, build_line},
    },
    infrastructure::{connection_manager::ConnectionManager, interrupt::Interrupt},
};
use crate::config::RateLimitConfig;
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a single wait on a command's completion lasts before a progress line.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// How a machine ended up at its target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// It was already there; no command was issued.
    AlreadyAtTarget,
    /// A command was issued and the machine reached the target.
    ReachedTarget,
}

/// A machine to drive, together with the connection manager of its datacenter.
#[derive(Clone)]
pub struct DriveTarget {
    pub identity: Arc<VirtualMachineIdentity>,
    pub connections: Arc<ConnectionManager>,
}

/// Result of a fail-fast pass: what was reached before the first failure.
pub struct FailFastReport {
    pub reached: Vec<DriveTarget>,
    pub failure: Option<VirtualizationError>,
}

/// Result of a drain-all pass: every machine was processed.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub failures: Vec<(Arc<VirtualMachineIdentity>, VirtualizationError)>,
}

impl DrainReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

struct PendingOperation {
    machine_name: String,
    command: MachineCommand,
    token: Box<dyn CompletionToken>,
    issued_at: Instant,
}

/// Issues start/suspend commands and polls them to completion.
///
/// Every wait on the backend is bounded by the poll timeout and races the
/// caller's interrupt, so an interrupt is observed within one interval.
pub struct CommandDispatcher {
    poll_timeout: Duration,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_TIMEOUT)
    }
}

impl CommandDispatcher {
    pub fn new(poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            rate_limiter: None,
        }
    }

    /// Throttles command issuance to the backend.
    ///
    /// # Errors
    /// Returns `VirtualizationError::Validation` if either limit is zero.
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> VirtualizationResult<Self> {
        config.validate()?;
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(burst);
        self.rate_limiter = Some(DefaultDirectRateLimiter::direct(quota));
        Ok(self)
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Drives one machine to `command`'s target state.
    ///
    /// # Errors
    /// * `Resolution` if the live listing has no machine of that name
    /// * `CommandExecution` if the backend rejects, fails or does not answer the command
    /// * `Interrupted` if `interrupt` fires while waiting
    pub async fn drive_to_state(
        &self,
        handle: &dyn DatacenterHandle,
        machine: &VirtualMachineIdentity,
        command: MachineCommand,
        logger: &dyn BuildLogger,
        interrupt: &Interrupt,
    ) -> VirtualizationResult<DriveOutcome> {
        let name = machine.name();
        let target = command.target_state();

        let found = self
            .bounded(self.find(handle, machine), machine, command, interrupt)
            .await?
            .map_err(|e| {
                command_error(machine, command, format!("could not list machines: {}", e))
            })?;
        let Some(listing) = found else {
            build_error(logger, format!("Could not find virtual computer {}", name));
            return Err(resolution_error(machine));
        };

        if listing.power_state == target {
            build_line(
                logger,
                format!("Virtual computer {} is already {}", name, command.participle()),
            );
            return Ok(DriveOutcome::AlreadyAtTarget);
        }

        build_line(logger, format!("{} virtual computer {}", command.progressive(), name));
        if let Some(limiter) = &self.rate_limiter {
            tokio::select! {
                biased;
                _ = interrupt.interrupted() => return Err(interrupted_error(machine, command)),
                _ = limiter.until_ready() => {}
            }
        }
        let token = self
            .bounded(handle.execute(command, &listing.id), machine, command, interrupt)
            .await?
            .map_err(|e| {
                build_error(
                    logger,
                    format!("Could not {} virtual computer {}: {}", command.infinitive(), name, e),
                );
                command_error(machine, command, e.to_string())
            })?;

        let pending = PendingOperation {
            machine_name: name.to_string(),
            command,
            token,
            issued_at: Instant::now(),
        };
        self.poll(handle, machine, target, pending, logger, interrupt)
            .await
    }

    async fn poll(
        &self,
        handle: &dyn DatacenterHandle,
        machine: &VirtualMachineIdentity,
        target: PowerState,
        pending: PendingOperation,
        logger: &dyn BuildLogger,
        interrupt: &Interrupt,
    ) -> VirtualizationResult<DriveOutcome> {
        let PendingOperation {
            machine_name,
            command,
            mut token,
            issued_at,
        } = pending;
        loop {
            let waited = tokio::select! {
                biased;
                _ = interrupt.interrupted() => {
                    warn!(machine = %machine, %command, "interrupted while waiting for command completion");
                    return Err(interrupted_error(machine, command));
                }
                waited = token.wait(self.poll_timeout) => waited,
            };

            match waited {
                Ok(()) => {
                    build_line(
                        logger,
                        format!("Virtual computer {} {}", machine_name, command.participle()),
                    );
                    return Ok(DriveOutcome::ReachedTarget);
                }
                Err(CompletionError::Execution(message)) => {
                    build_error(
                        logger,
                        format!(
                            "Could not {} virtual computer {}: {}",
                            command.infinitive(),
                            machine_name,
                            message
                        ),
                    );
                    return Err(command_error(machine, command, message));
                }
                Err(CompletionError::Timeout) => {
                    build_line(
                        logger,
                        format!(
                            "Still waiting for virtual computer {} to be {} ({}s elapsed)",
                            machine_name,
                            command.participle(),
                            issued_at.elapsed().as_secs()
                        ),
                    );
                    let recheck = self
                        .bounded(self.find(handle, machine), machine, command, interrupt)
                        .await?;
                    match recheck {
                        Ok(Some(listing)) if listing.power_state == target => {
                            build_line(
                                logger,
                                format!("Virtual computer {} {}", machine_name, command.participle()),
                            );
                            return Ok(DriveOutcome::ReachedTarget);
                        }
                        Ok(Some(listing)) => {
                            debug!(machine = %machine, state = %listing.power_state, "machine not yet at target state");
                        }
                        Ok(None) => {
                            build_error(
                                logger,
                                format!("Could not find virtual computer {}", machine_name),
                            );
                            return Err(resolution_error(machine));
                        }
                        Err(e) => {
                            warn!(machine = %machine, error = %e, "could not re-check power state, waiting again");
                        }
                    }
                }
            }
        }
    }

    async fn find(
        &self,
        handle: &dyn DatacenterHandle,
        machine: &VirtualMachineIdentity,
    ) -> Result<Option<MachineListing>, BackendError> {
        let listing = handle.list_machines().await?;
        Ok(listing.into_iter().find(|m| m.name == machine.name()))
    }

    /// Awaits one backend call for at most the poll timeout.
    ///
    /// The outer error is the interrupt. A call that does not answer in time
    /// yields `BackendError::Timeout`.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
        machine: &VirtualMachineIdentity,
        command: MachineCommand,
        interrupt: &Interrupt,
    ) -> VirtualizationResult<Result<T, BackendError>> {
        tokio::select! {
            biased;
            _ = interrupt.interrupted() => {
                warn!(machine = %machine, %command, "interrupted while waiting for the backend");
                Err(interrupted_error(machine, command))
            }
            answer = tokio::time::timeout(self.poll_timeout, call) => {
                Ok(answer.unwrap_or_else(|_| Err(BackendError::Timeout(self.poll_timeout))))
            }
        }
    }

    /// Connects to the target's datacenter and drives its machine.
    pub(crate) async fn drive_target(
        &self,
        target: &DriveTarget,
        command: MachineCommand,
        logger: &dyn BuildLogger,
        interrupt: &Interrupt,
    ) -> VirtualizationResult<DriveOutcome> {
        let handle = target.connections.get_connection(interrupt).await?;
        self.drive_to_state(handle.as_ref(), &target.identity, command, logger, interrupt)
            .await
    }

    /// Drives machines one after another and stops at the first failure.
    ///
    /// Nothing after the failing machine is commanded.
    pub async fn drive_fail_fast(
        &self,
        targets: &[DriveTarget],
        command: MachineCommand,
        logger: &dyn BuildLogger,
        interrupt: &Interrupt,
    ) -> FailFastReport {
        let mut reached = Vec::new();
        for target in targets {
            if let Err(e) = self.drive_target(target, command, logger, interrupt).await {
                return FailFastReport {
                    reached,
                    failure: Some(e),
                };
            }
            reached.push(target.clone());
        }
        FailFastReport {
            reached,
            failure: None,
        }
    }

    /// Drives every machine regardless of earlier failures and collects them.
    pub async fn drive_drain_all(
        &self,
        targets: &[DriveTarget],
        command: MachineCommand,
        logger: &dyn BuildLogger,
        interrupt: &Interrupt,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        for target in targets {
            if let Err(e) = self.drive_target(target, command, logger, interrupt).await {
                warn!(machine = %target.identity, %command, error = %e, "could not drive machine");
                report.failures.push((Arc::clone(&target.identity), e));
            }
        }
        report
    }
}

fn resolution_error(machine: &VirtualMachineIdentity) -> VirtualizationError {
    VirtualizationError::Resolution {
        uri: machine.datacenter_uri().to_string(),
        name: machine.name().to_string(),
    }
}

fn interrupted_error(machine: &VirtualMachineIdentity, command: MachineCommand) -> VirtualizationError {
    VirtualizationError::Interrupted(format!(
        "waiting for virtual computer {} to be {}",
        machine.name(),
        command.participle()
    ))
}

fn command_error(
    machine: &VirtualMachineIdentity,
    command: MachineCommand,
    message: String,
) -> VirtualizationError {
    VirtualizationError::CommandExecution {
        name: machine.name().to_string(),
        command,
        message,
    }
}
