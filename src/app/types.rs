use crate::backup::BackupService;
use crate::clock::Clock;
use crate::preflight::PreflightService;
use crate::process::ProcessManager;
use crate::update::{PatchApplier, UpdateOracle};
use std::sync::Arc;
use std::time::Duration;

/// External services the controller drives
#[derive(Clone)]
pub struct Collaborators {
    pub process: Arc<dyn ProcessManager>,
    /// `None` disables update checks regardless of configuration
    pub oracle: Option<Arc<dyn UpdateOracle>>,
    pub patcher: Arc<dyn PatchApplier>,
    pub backup: Arc<dyn BackupService>,
    pub preflight: Arc<dyn PreflightService>,
    pub clock: Arc<dyn Clock>,
}

/// Fixed delays used by the controller
#[derive(Debug, Clone, Copy)]
pub struct ControllerTimings {
    /// Pause after stopping the server so its port is released
    pub settle_delay: Duration,
    /// Upper bound on waiting for the server to stop in `stop()`
    pub stop_timeout: Duration,
    pub stop_poll_interval: Duration,
}

impl Default for ControllerTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(60),
            stop_poll_interval: Duration::from_millis(500),
        }
    }
}

/// What the loop does after dispatching a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Pace {
    /// Poll again right away
    Immediate,
    /// Sleep one monitoring interval first
    Wait,
}
