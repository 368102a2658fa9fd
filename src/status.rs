use std::fmt;

/// Verdict for one iteration of the supervision loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleStatus {
    /// Server should be running; start it if it is not
    Started,
    /// Server should be stopped
    Stopped,
    /// Server is running and up to date
    Monitored,
    /// Nothing to do
    Idle,
    /// Server is stopped and the given version should be installed
    Patched { version: String },
    /// Verdict could not be produced
    Error,
}

impl LifecycleStatus {
    /// Whether the controller should poll again without sleeping
    pub fn repolls_immediately(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::Started | LifecycleStatus::Stopped | LifecycleStatus::Patched { .. }
        )
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleStatus::Started => write!(f, "started"),
            LifecycleStatus::Stopped => write!(f, "stopped"),
            LifecycleStatus::Monitored => write!(f, "monitored"),
            LifecycleStatus::Idle => write!(f, "idle"),
            LifecycleStatus::Patched { version } => write!(f, "patched({})", version),
            LifecycleStatus::Error => write!(f, "error"),
        }
    }
}

/// Override mode of the status provider; exactly one is active, last writer wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Verdicts come from the decision engine
    #[default]
    Normal,
    /// Host service is shutting down: one `Stopped`, then `Idle` forever
    ServiceShutdown,
    /// Server was auto-shut down and must not be restarted: always `Idle`
    DenyRestart,
}

/// Why the decision engine last asked for the server to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    AutoShutdown,
    Update,
}
