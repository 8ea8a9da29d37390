use crate::core::domain::{error::VirtualizationResult, port::BuildLogger};
use async_trait::async_trait;

/// Brings an execution node online once its machine is reachable.
///
/// The host supplies concrete launchers (SSH, agent over JNLP, ...); the
/// virtual machine launcher wraps one and handles power state around it.
#[async_trait]
pub trait Launcher: Send + Sync {
    fn is_launch_supported(&self) -> bool;

    async fn launch(&self, node: &str, logger: &dyn BuildLogger) -> VirtualizationResult<()>;

    async fn before_disconnect(&self, node: &str, logger: &dyn BuildLogger);

    async fn after_disconnect(&self, node: &str, logger: &dyn BuildLogger);
}
