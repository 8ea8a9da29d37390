use crate::core::domain::{
    error::ValidationError,
    value_object::{DatacenterPassword, DatacenterUri, DatacenterUsername},
};
use std::time::Duration;

/// Refresh interval applied when the configured value is zero or negative.
pub const DEFAULT_REFRESH_SECONDS: u64 = 60;

/// Longest refresh interval honoured; larger values are capped to one year.
pub const MAX_REFRESH_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Connection details and refresh policy of one managed datacenter.
///
/// An endpoint is replaced wholesale on reconfiguration, never edited in place.
#[derive(Debug, Clone)]
pub struct DatacenterEndpoint {
    uri: DatacenterUri,
    username: DatacenterUsername,
    password: DatacenterPassword,
    refresh_interval: Duration,
}

impl DatacenterEndpoint {
    pub fn new(
        uri: DatacenterUri,
        username: DatacenterUsername,
        password: DatacenterPassword,
        refresh_seconds: i64,
    ) -> Self {
        let refresh_seconds = if refresh_seconds <= 0 {
            DEFAULT_REFRESH_SECONDS
        } else {
            (refresh_seconds as u64).min(MAX_REFRESH_SECONDS)
        };
        Self {
            uri,
            username,
            password,
            refresh_interval: Duration::from_secs(refresh_seconds),
        }
    }

    /// Validates raw operator input and builds an endpoint from it.
    pub fn parse(
        uri: &str,
        username: &str,
        password: &str,
        refresh_seconds: i64,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(
            DatacenterUri::new(uri)?,
            DatacenterUsername::new(username)?,
            DatacenterPassword::new(password)?,
            refresh_seconds,
        ))
    }

    pub fn uri(&self) -> &DatacenterUri {
        &self.uri
    }

    pub fn username(&self) -> &DatacenterUsername {
        &self.username
    }

    pub fn password(&self) -> &DatacenterPassword {
        &self.password
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}
