use crate::core::domain::model::power_state::MachineCommand;
use std::time::Duration;
use thiserror::Error;

/// The main error type for virtualization orchestration.
///
/// This enum represents every failure that can leave the core: reaching a
/// datacenter, resolving a machine by name, a backend command failing, an
/// interrupted wait, and configuration validation.
#[derive(Error, Debug)]
pub enum VirtualizationError {
    /// Transport or authentication failure reaching a datacenter.
    ///
    /// # Fields
    /// * `uri` - The datacenter URI
    /// * `username` - The user the connection was attempted as
    /// * `message` - The underlying failure
    ///
    /// The credential is never part of this error.
    #[error("Connection error: cannot connect to datacenter {uri} as {username}/******: {message}")]
    Connection {
        uri: String,
        username: String,
        message: String,
    },

    /// A named machine is not known in the requested datacenter.
    #[error("Resolution error: could not find virtual computer {name} in datacenter {uri}")]
    Resolution { uri: String, name: String },

    /// The backend reported that a start/suspend command itself failed.
    #[error("Command execution error: {command} of virtual computer {name} failed: {message}")]
    CommandExecution {
        name: String,
        command: MachineCommand,
        message: String,
    },

    /// An interrupt reached a wait before it completed.
    ///
    /// # Fields
    /// * `0` - What was being waited on
    #[error("Interrupted while {0}")]
    Interrupted(String),

    /// Represents validation failures of typed configuration values
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A delegate execution-node launcher failed
    #[error("Launch error: {0}")]
    Launch(String),

    /// Configuration could not be read or decoded
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VirtualizationError {
    pub(crate) fn connection(uri: &str, username: &str, message: impl Into<String>) -> Self {
        VirtualizationError::Connection {
            uri: uri.to_string(),
            username: username.to_string(),
            message: message.into(),
        }
    }
}

/// Specialized error type for validation failures.
///
/// This enum provides detailed context about why a validation
/// failed, including field-specific errors and format violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Represents a validation failure for a specific field
    ///
    /// # Fields
    /// * `field` - The name of the field that failed validation
    /// * `message` - A detailed message about why validation failed
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// Represents format/syntax validation failures
    ///
    /// # Fields
    /// * `0` - Description of the format violation
    #[error("Format error: {0}")]
    Format(String),

    /// Represents violations of domain constraints
    ///
    /// # Fields
    /// * `0` - Description of the constraint violation
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Errors reported by a virtualization backend through the collaborator traits.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),

    /// The backend gave no answer within the allotted time.
    #[error("no answer from the backend within {0:?}")]
    Timeout(Duration),
}

/// Outcome of waiting on a command's completion token when it did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The wait elapsed before the command finished. Non-fatal.
    #[error("timed out waiting for command completion")]
    Timeout,

    /// The backend reports the command itself failed.
    #[error("command failed: {0}")]
    Execution(String),
}

/// Type alias for Results that may fail with a VirtualizationError
pub type VirtualizationResult<T> = Result<T, VirtualizationError>;
