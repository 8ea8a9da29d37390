pub mod config;
mod core;

#[cfg(test)]
mod tests;

pub use crate::config::{
    DatacenterConfig, RateLimitConfig, ResourceRequestConfig, VirtualizationConfig,
};
pub use crate::core::{
    application::service::{
        command_dispatcher::{
            CommandDispatcher, DEFAULT_POLL_TIMEOUT, DrainReport, DriveOutcome, DriveTarget,
            FailFastReport,
        },
        resource_acquisition::{AcquiredMachines, AcquisitionFailure, ResourceAcquisitionWrapper},
        virtual_machine_launcher::VirtualMachineLauncher,
    },
    domain::{
        error::{
            BackendError, CompletionError, ValidationError, VirtualizationError,
            VirtualizationResult,
        },
        model::{
            datacenter_endpoint::{DEFAULT_REFRESH_SECONDS, DatacenterEndpoint, MAX_REFRESH_SECONDS},
            inventory_snapshot::{InventoryEntry, InventorySnapshot},
            power_state::{MachineCommand, PowerState},
            resource_claim::{ResourceClaim, ResourceKey, ResourceList, ResourceRequest},
            virtual_machine::{MachineId, MachineListing, VirtualMachineIdentity},
        },
        port::{
            BUILD_LOG_PREFIX, BuildLogger, CompletionToken, Connector, DatacenterHandle, Launcher,
            TracingBuildLogger,
        },
        value_object::{
            DATACENTER_URI_PREFIX, DatacenterPassword, DatacenterUri, DatacenterUsername,
            MachineName,
        },
    },
    infrastructure::{
        connection_manager::ConnectionManager,
        datacenter_registry::{Datacenter, DatacenterRegistry},
        interrupt::{Interrupt, InterruptTrigger},
        inventory_cache::{DEFAULT_LISTING_TIMEOUT, InventoryCache, RefreshTicket},
    },
};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Orchestrates virtual machines used as disposable build executors.
///
/// The client owns the datacenter registry and the services built on it:
/// - Inventory caches with background refresh, one per datacenter
/// - Cached, interruptible connections to each datacenter
/// - Fail-fast acquisition and drain-all release of a build's machines
/// - Execution-node launchers that power a machine on and off around a node
///
/// # Examples
///
/// ```no_run
/// use leeca_virtualization::{
///     Connector, Interrupt, ResourceClaim, ResourceRequest, TracingBuildLogger,
///     VirtualizationClient, VirtualizationResult,
/// };
/// use std::sync::Arc;
///
/// async fn run(connector: Arc<dyn Connector>) -> VirtualizationResult<()> {
///     let client = VirtualizationClient::builder()
///         .connector(connector)
///         .datacenter("vcc+vmware://vcenter.example.com", "builder", "secret", 60)?
///         .build()
///         .await?;
///     client.wait_for_inventory().await;
///
///     let claim = ResourceClaim::new(vec![ResourceRequest::parse(
///         "vcc+vmware://vcenter.example.com",
///         "build-agent-01",
///     )?]);
///     let logger = TracingBuildLogger;
///     let interrupt = Interrupt::never();
///     if let Ok(machines) = client.acquire(&claim, &logger, &interrupt).await {
///         // ... run the build ...
///         machines.release(&logger, &interrupt).await;
///     }
///     Ok(())
/// }
/// ```
pub struct VirtualizationClient {
    connector: Arc<dyn Connector>,
    registry: Arc<DatacenterRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    acquisition: Arc<ResourceAcquisitionWrapper>,
}

/// Builder for VirtualizationClient configuration
#[derive(Default)]
pub struct VirtualizationClientBuilder {
    connector: Option<Arc<dyn Connector>>,
    config: VirtualizationConfig,
    poll_timeout: Option<Duration>,
}

impl VirtualizationClientBuilder {
    /// Sets the backend the client connects through.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Adds a managed datacenter.
    ///
    /// # Errors
    /// Returns `VirtualizationError::Validation` if the URI, username or
    /// password is invalid.
    pub fn datacenter(
        mut self,
        datacenter_uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        refresh_seconds: i64,
    ) -> VirtualizationResult<Self> {
        let datacenter = DatacenterConfig {
            datacenter_uri: datacenter_uri.into(),
            username: username.into(),
            password: password.into(),
            refresh_seconds,
        };
        datacenter.to_endpoint()?;
        self.config.datacenters.push(datacenter);
        Ok(self)
    }

    /// Replaces the whole configuration, including datacenters added so far.
    pub fn config(mut self, config: VirtualizationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = Some(poll_timeout);
        self
    }

    pub fn rate_limit(mut self, requests_per_second: u32, burst_size: u32) -> Self {
        self.config.rate_limit = Some(RateLimitConfig {
            requests_per_second,
            burst_size,
        });
        self
    }

    /// Validates the configuration and registers every datacenter.
    ///
    /// Each datacenter starts its first inventory refresh in the background;
    /// use [`VirtualizationClient::wait_for_inventory`] to wait for them.
    pub async fn build(self) -> VirtualizationResult<VirtualizationClient> {
        let connector = self.connector.ok_or_else(|| {
            VirtualizationError::Validation(ValidationError::Field {
                field: "connector".to_string(),
                message: "Connector is required".to_string(),
            })
        })?;
        self.config.validate()?;

        let mut dispatcher =
            CommandDispatcher::new(self.poll_timeout.unwrap_or_else(|| self.config.poll_timeout()));
        if let Some(rate_limit) = self.config.rate_limit {
            dispatcher = dispatcher.with_rate_limit(rate_limit)?;
        }
        let dispatcher = Arc::new(dispatcher);

        let registry = Arc::new(DatacenterRegistry::new(Arc::clone(&connector)));
        for endpoint in self.config.endpoints()? {
            registry.register(endpoint);
        }
        let acquisition = Arc::new(ResourceAcquisitionWrapper::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
        ));

        info!(
            datacenters = registry.datacenters().len(),
            poll_timeout = ?dispatcher.poll_timeout(),
            "virtualization client ready"
        );
        Ok(VirtualizationClient {
            connector,
            registry,
            dispatcher,
            acquisition,
        })
    }
}

impl VirtualizationClient {
    /// Creates a new builder for VirtualizationClient configuration
    pub fn builder() -> VirtualizationClientBuilder {
        VirtualizationClientBuilder::default()
    }

    pub fn registry(&self) -> &Arc<DatacenterRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn acquisition(&self) -> &Arc<ResourceAcquisitionWrapper> {
        &self.acquisition
    }

    /// Starts every machine of `claim`, rolling back on failure.
    ///
    /// See [`ResourceAcquisitionWrapper::acquire`].
    pub async fn acquire(
        &self,
        claim: &ResourceClaim,
        logger: &dyn BuildLogger,
        interrupt: &Interrupt,
    ) -> Result<AcquiredMachines, AcquisitionFailure> {
        self.acquisition.acquire(claim, logger, interrupt).await
    }

    /// Wraps `delegate` so the node's machine is powered around its lifetime.
    pub fn launcher(
        &self,
        machine: ResourceRequest,
        delegate: Arc<dyn Launcher>,
    ) -> VirtualMachineLauncher {
        VirtualMachineLauncher::new(machine, Arc::clone(&self.acquisition), delegate)
    }

    /// Checks operator-entered credentials against a datacenter without caching anything.
    pub async fn test_connection(
        &self,
        datacenter_uri: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<String, String> {
        crate::core::infrastructure::connection_manager::test_connection(
            &self.connector,
            datacenter_uri,
            username,
            password,
        )
        .await
    }

    /// Refreshes every datacenter's inventory and waits for the refreshes to finish.
    pub async fn wait_for_inventory(&self) {
        let tickets: Vec<RefreshTicket> = self
            .registry
            .datacenters()
            .iter()
            .map(|datacenter| datacenter.inventory().refresh())
            .collect();
        for ticket in tickets {
            ticket.finished().await;
        }
    }

    /// Applies a new set of datacenters.
    ///
    /// Every configured datacenter is replaced wholesale; datacenters missing
    /// from `config` are removed and their connections closed. Polling and
    /// rate-limit settings only take effect for newly built clients.
    ///
    /// # Errors
    /// Returns `VirtualizationError::Validation` and changes nothing if any
    /// entry is invalid.
    pub async fn reconfigure(&self, config: &VirtualizationConfig) -> VirtualizationResult<()> {
        config.validate()?;
        let endpoints = config.endpoints()?;
        let keep: BTreeSet<DatacenterUri> = endpoints.iter().map(|e| e.uri().clone()).collect();

        for datacenter in self.registry.datacenters() {
            if !keep.contains(datacenter.uri()) {
                self.registry.remove(datacenter.uri()).await;
            }
        }
        for endpoint in endpoints {
            self.registry.register(endpoint);
        }
        Ok(())
    }

    /// Every machine known across all datacenters, ordered by name.
    pub fn all_machines(&self) -> Vec<Arc<VirtualMachineIdentity>> {
        self.registry.all_machines()
    }

    /// Closes every cached datacenter connection.
    pub async fn close(&self) {
        for datacenter in self.registry.datacenters() {
            datacenter.connections().close().await;
        }
    }
}
