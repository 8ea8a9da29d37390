use crate::core::domain::error::ValidationError;
use std::fmt;

/// Connection-scheme prefix every datacenter URI must carry (e.g. `vcc+vmware://host`).
pub const DATACENTER_URI_PREFIX: &str = "vcc+";

const MAX_URI_LENGTH: usize = 2083; // RFC 7230 practical limit

/// A validated datacenter URI.
///
/// This value object is the natural key of a datacenter: two endpoints with
/// the same URI describe the same backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatacenterUri(String);

impl DatacenterUri {
    /// Creates a validated URI.
    ///
    /// # Errors
    /// Returns `ValidationError` if the URI is empty, too long, lacks the
    /// `vcc+` scheme prefix, or is not a well-formed URL.
    pub fn new(uri: impl Into<String>) -> Result<Self, ValidationError> {
        let uri = uri.into();
        let uri = uri.trim().to_string();
        validate_uri(&uri)?;
        Ok(Self(uri))
    }

    /// Returns the URI as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatacenterUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates a datacenter URI.
pub(crate) fn validate_uri(uri: &str) -> Result<(), ValidationError> {
    if uri.is_empty() {
        return Err(ValidationError::Field {
            field: "datacenter_uri".to_string(),
            message: "Datacenter URI is not specified".to_string(),
        });
    }

    if uri.len() > MAX_URI_LENGTH {
        return Err(ValidationError::Format(format!(
            "Datacenter URI exceeds maximum length of {} characters",
            MAX_URI_LENGTH
        )));
    }

    if !uri.starts_with(DATACENTER_URI_PREFIX) {
        return Err(ValidationError::ConstraintViolation(format!(
            "Datacenter URI is not a valid vcc-api URI (must start with '{}')",
            DATACENTER_URI_PREFIX
        )));
    }

    url::Url::parse(uri)
        .map_err(|e| ValidationError::Format(format!("Invalid datacenter URI format: {}", e)))?;

    Ok(())
}
