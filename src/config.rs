//! Operator configuration: managed datacenters, polling and command throttling.

use crate::core::{
    application::service::command_dispatcher::DEFAULT_POLL_TIMEOUT,
    domain::{
        error::{ValidationError, VirtualizationError, VirtualizationResult},
        model::{datacenter_endpoint::DatacenterEndpoint, resource_claim::ResourceRequest},
    },
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// One managed datacenter as entered by the operator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterConfig {
    pub datacenter_uri: String,
    pub username: String,
    pub password: String,
    /// Inventory refresh interval; zero or negative means the default of 60,
    /// anything above one year is capped to one year.
    #[serde(default)]
    pub refresh_seconds: i64,
}

impl fmt::Debug for DatacenterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatacenterConfig")
            .field("datacenter_uri", &self.datacenter_uri)
            .field("username", &self.username)
            .field("password", &"******")
            .field("refresh_seconds", &self.refresh_seconds)
            .finish()
    }
}

impl DatacenterConfig {
    /// Validates the entry and turns it into an endpoint.
    pub fn to_endpoint(&self) -> Result<DatacenterEndpoint, ValidationError> {
        DatacenterEndpoint::parse(
            &self.datacenter_uri,
            &self.username,
            &self.password,
            self.refresh_seconds,
        )
    }
}

/// One machine a build claims, as entered in the build's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequestConfig {
    pub datacenter_uri: String,
    pub machine_name: String,
}

impl ResourceRequestConfig {
    pub fn to_request(&self) -> Result<ResourceRequest, ValidationError> {
        ResourceRequest::parse(&self.datacenter_uri, &self.machine_name)
    }
}

/// Throttles start/suspend commands sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl RateLimitConfig {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.requests_per_second == 0 {
            return Err(ValidationError::Field {
                field: "requests_per_second".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.burst_size == 0 {
            return Err(ValidationError::Field {
                field: "burst_size".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Top-level configuration of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualizationConfig {
    pub datacenters: Vec<DatacenterConfig>,
    /// Seconds a single wait on a command's completion lasts.
    pub poll_timeout_secs: u64,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for VirtualizationConfig {
    fn default() -> Self {
        Self {
            datacenters: Vec::new(),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT.as_secs(),
            rate_limit: None,
        }
    }
}

impl VirtualizationConfig {
    /// Parses a JSON document and validates every datacenter entry.
    ///
    /// # Errors
    /// `Configuration` if the document is malformed, `Validation` if an entry
    /// is invalid.
    pub fn from_json_str(json: &str) -> VirtualizationResult<Self> {
        let config: VirtualizationConfig = serde_json::from_str(json)
            .map_err(|e| VirtualizationError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub async fn load(path: impl AsRef<Path>) -> VirtualizationResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            VirtualizationError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_timeout_secs == 0 {
            return Err(ValidationError::Field {
                field: "poll_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        for datacenter in &self.datacenters {
            datacenter.to_endpoint()?;
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Endpoints of every configured datacenter.
    pub fn endpoints(&self) -> Result<Vec<DatacenterEndpoint>, ValidationError> {
        self.datacenters
            .iter()
            .map(DatacenterConfig::to_endpoint)
            .collect()
    }
}
