use std::fmt::Display;
use tracing::{error, info};

/// Prefix carried by every line this crate writes to a build log.
pub const BUILD_LOG_PREFIX: &str = "[virtualization]";

/// The CI host's human-readable log for one build or node.
pub trait BuildLogger: Send + Sync {
    fn println(&self, line: &str);

    /// Reports a failure. Hosts that highlight errors override this.
    fn error(&self, line: &str) {
        self.println(line);
    }
}

/// Forwards build log lines to `tracing` when the host provides no sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBuildLogger;

impl BuildLogger for TracingBuildLogger {
    fn println(&self, line: &str) {
        info!(target: "build", "{}", line);
    }

    fn error(&self, line: &str) {
        error!(target: "build", "{}", line);
    }
}

pub(crate) fn build_line(logger: &dyn BuildLogger, message: impl Display) {
    logger.println(&format!("{} {}", BUILD_LOG_PREFIX, message));
}

pub(crate) fn build_error(logger: &dyn BuildLogger, message: impl Display) {
    logger.error(&format!("{} {}", BUILD_LOG_PREFIX, message));
}
