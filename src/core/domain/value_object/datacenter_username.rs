use crate::core::domain::error::ValidationError;
use std::fmt;

/// A validated datacenter username.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatacenterUsername(String);

impl DatacenterUsername {
    /// Creates a validated username.
    pub fn new(username: impl Into<String>) -> Result<Self, ValidationError> {
        let username = username.into();
        validate_username(&username)?;
        Ok(Self(username))
    }

    /// Returns the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatacenterUsername {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates a username.
///
/// Backends disagree on username syntax (`DOMAIN\user`, `user@realm`), so
/// only emptiness, length and whitespace/control characters are rejected.
pub(crate) fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::Field {
            field: "username".to_string(),
            message: "Username is not specified".to_string(),
        });
    }
    if username.len() > 256 {
        return Err(ValidationError::Format(format!(
            "Username cannot exceed 256 characters (got {})",
            username.len()
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::Format(
            "Username cannot contain whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}
