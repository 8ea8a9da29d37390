use crate::core::domain::error::ValidationError;
use std::fmt;

/// A validated virtual machine name as written in a build's configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MachineName(String);

impl MachineName {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_machine_name(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates a machine name.
pub(crate) fn validate_machine_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Field {
            field: "machine_name".to_string(),
            message: "Machine name is not specified".to_string(),
        });
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::Format(
            "Machine name cannot contain control characters".to_string(),
        ));
    }
    Ok(())
}
