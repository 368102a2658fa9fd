use super::types::{Collaborators, ControllerTimings};
use crate::backup::BackupService;
use crate::config::KeeperConfig;
use crate::engine::StatusDecisionEngine;
use crate::preflight::PreflightService;
use crate::process::ProcessManager;
use crate::provider::ModeOverrideProvider;
use crate::status::ShutdownMode;
use crate::update::PatchApplier;
use std::sync::Arc;
use std::time::Duration;

/// Supervision loop for a single server process
pub struct LifecycleController {
    pub(super) config: KeeperConfig,
    pub(super) provider: ModeOverrideProvider,
    pub(super) process: Arc<dyn ProcessManager>,
    pub(super) patcher: Arc<dyn PatchApplier>,
    pub(super) backup: Arc<dyn BackupService>,
    pub(super) preflight: Arc<dyn PreflightService>,
    pub(super) timings: ControllerTimings,
}

impl LifecycleController {
    pub fn new(config: KeeperConfig, collaborators: Collaborators) -> Self {
        let engine = StatusDecisionEngine::new(&config, collaborators.oracle.clone());
        let provider = ModeOverrideProvider::new(
            engine,
            Arc::clone(&collaborators.process),
            Arc::clone(&collaborators.clock),
        );

        Self {
            config,
            provider,
            process: collaborators.process,
            patcher: collaborators.patcher,
            backup: collaborators.backup,
            preflight: collaborators.preflight,
            timings: ControllerTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: ControllerTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Active override mode of the status provider
    pub fn mode(&self) -> ShutdownMode {
        self.provider.current_mode()
    }

    pub(super) fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.config.lifecycle.monitoring_interval_seconds)
    }
}
