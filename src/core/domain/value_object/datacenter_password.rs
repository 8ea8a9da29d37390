use crate::core::domain::error::ValidationError;
use std::fmt;

const REDACTED: &str = "******";

/// A datacenter credential.
///
/// Formatting with `{}` or `{:?}` always yields `******`; the plaintext is
/// only reachable inside the crate, at the point a connection is made.
#[derive(Clone, PartialEq, Eq)]
pub struct DatacenterPassword(String);

impl DatacenterPassword {
    /// Creates a credential. Surrounding whitespace is trimmed.
    pub fn new(password: impl Into<String>) -> Result<Self, ValidationError> {
        let password = password.into().trim().to_string();
        validate_password(&password)?;
        Ok(Self(password))
    }

    /// Returns the plaintext credential.
    #[must_use]
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DatacenterPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatacenterPassword").field(&REDACTED).finish()
    }
}

impl fmt::Display for DatacenterPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Validates a password.
pub(crate) fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Field {
            field: "password".to_string(),
            message: "Password is not specified".to_string(),
        });
    }
    if password.len() > 1024 {
        return Err(ValidationError::Format(
            "Password cannot exceed 1024 characters".to_string(),
        ));
    }
    Ok(())
}
