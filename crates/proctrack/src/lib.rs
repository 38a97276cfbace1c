//! Spawn, observe and terminate external commands.
//!
//! [`SessionRegistry`] runs one-shot shell commands and hands out their output
//! incrementally. [`MonitorRegistry`] keeps longer-lived processes with
//! line-bounded output and event subscriptions. [`ProcessController`] works on
//! any OS process by pid or name, and [`SessionAggregator`] applies bulk stops
//! across both registries. [`ProcessHub`] wires all four to one platform
//! process manager.

mod aggregator;
mod capture;
mod controller;
mod monitor;
mod platform;
mod session;
mod sync;
mod types;

pub use aggregator::SessionAggregator;
pub use controller::ProcessController;
pub use monitor::{MonitorHandlers, MonitorRegistry, SubscriptionId};
pub use platform::{PlatformProcessManager, PlatformProcessManagerFactory};
pub use session::SessionRegistry;
pub use types::*;

// Re-export core functionality
pub use proctrack_core::*;

use std::sync::Arc;

/// The registries, controller and aggregator sharing one process manager
pub struct ProcessHub<M: ProcessManager + 'static = PlatformProcessManager> {
    pub sessions: Arc<SessionRegistry<M>>,
    pub monitors: Arc<MonitorRegistry<M>>,
    pub controller: Arc<ProcessController<M>>,
    pub aggregator: SessionAggregator<M>,
}

impl ProcessHub<PlatformProcessManager> {
    /// Create a hub backed by the process manager of the current platform
    pub fn new(config: RegistryConfig) -> Result<Self, ProcessError> {
        Self::with_manager(
            Arc::new(PlatformProcessManagerFactory::create_process_manager()),
            config,
        )
    }
}

impl<M: ProcessManager + 'static> ProcessHub<M> {
    pub fn with_manager(manager: Arc<M>, config: RegistryConfig) -> Result<Self, ProcessError> {
        config.validate()?;
        tracing::debug!(?config, "Creating process hub");

        let sessions = Arc::new(SessionRegistry::new(manager.clone(), config.clone()));
        let monitors = Arc::new(MonitorRegistry::new(manager.clone(), config.clone()));
        let controller = Arc::new(ProcessController::new(manager, config));
        let aggregator =
            SessionAggregator::new(sessions.clone(), monitors.clone(), controller.clone());

        Ok(Self {
            sessions,
            monitors,
            controller,
            aggregator,
        })
    }
}
