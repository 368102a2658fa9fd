use super::LifecycleController;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl LifecycleController {
    /// One-time work before the first poll; returns false if cancelled meanwhile
    pub(super) async fn prepare(&self, cancel: &CancellationToken) -> bool {
        info!("Running startup preflight checks");
        if self.preflight.check_and_cleanup().await {
            info!("Preflight checks passed");
        } else {
            warn!("Preflight checks reported problems, continuing anyway");
        }

        let delay = Duration::from_secs(self.config.lifecycle.auto_start_delay_seconds);
        if delay.is_zero() {
            return true;
        }

        info!("Waiting {:?} before the first lifecycle poll", delay);
        self.sleep_or_cancel(delay, cancel).await
    }
}
