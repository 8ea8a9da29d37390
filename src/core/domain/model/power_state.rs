//! Power states reported by a virtualization backend and the commands that change them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The run state of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// The machine is powered on.
    Running,
    /// The machine's memory is saved and it is not executing.
    Suspended,
    /// The machine is powered off.
    Stopped,
    /// The backend did not report a state we recognise.
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            PowerState::Running => "Running",
            PowerState::Suspended => "Suspended",
            PowerState::Stopped => "Stopped",
            PowerState::Unknown => "Unknown",
        };
        f.write_str(state)
    }
}

/// A power-state transition command issued against a named machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineCommand {
    Start,
    Suspend,
}

impl MachineCommand {
    /// The power state the command drives a machine towards.
    #[must_use]
    pub fn target_state(self) -> PowerState {
        match self {
            MachineCommand::Start => PowerState::Running,
            MachineCommand::Suspend => PowerState::Suspended,
        }
    }

    /// Verb used in build log lines ("Starting", "Suspending").
    pub(crate) fn progressive(self) -> &'static str {
        match self {
            MachineCommand::Start => "Starting",
            MachineCommand::Suspend => "Suspending",
        }
    }

    /// Participle used in build log lines ("started", "suspended").
    pub(crate) fn participle(self) -> &'static str {
        match self {
            MachineCommand::Start => "started",
            MachineCommand::Suspend => "suspended",
        }
    }

    /// Infinitive used in build log lines ("start", "suspend").
    pub(crate) fn infinitive(self) -> &'static str {
        match self {
            MachineCommand::Start => "start",
            MachineCommand::Suspend => "suspend",
        }
    }
}

impl fmt::Display for MachineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineCommand::Start => f.write_str("Start"),
            MachineCommand::Suspend => f.write_str("Suspend"),
        }
    }
}
