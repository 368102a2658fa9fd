mod child;

pub use child::ChildProcessManager;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Point-in-time view of the supervised server, refreshed on every poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub is_running: bool,
    /// `None` when the server has never been started by this supervisor
    pub start_time: Option<DateTime<Utc>>,
    pub current_version: String,
}

/// Start/stop mechanics for the supervised server.
///
/// Failures are reported as `false`, never as errors; the caller decides
/// whether to escalate a failed graceful stop to a forced one.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn is_running(&self) -> bool;

    async fn start_time(&self) -> Option<DateTime<Utc>>;

    async fn current_version(&self) -> String;

    async fn start(&self) -> bool;

    /// Ask the server to exit on its own and wait for it
    async fn graceful_stop(&self) -> bool;

    async fn force_stop(&self) -> bool;

    async fn snapshot(&self) -> RuntimeSnapshot {
        let is_running = self.is_running().await;
        RuntimeSnapshot {
            is_running,
            start_time: self.start_time().await,
            current_version: self.current_version().await,
        }
    }
}
