use super::types::Pace;
use super::LifecycleController;
use crate::error::{KeeperError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

impl LifecycleController {
    /// Run the supervision loop until `cancel` fires.
    ///
    /// Action failures are logged and the loop carries on with the next
    /// iteration; cancellation is the only way out. On the way out a still
    /// running server is stopped.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("Lifecycle controller is running");

        if self.prepare(&cancel).await {
            self.poll_loop(&cancel).await;
        }

        info!("Lifecycle controller cancelled");
        self.stop_on_exit().await;
        Ok(())
    }

    async fn poll_loop(&self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let status = self.provider.get_status().await;
            debug!("Lifecycle verdict: {}", status);

            let pace = match self.dispatch(&status, cancel).await {
                Ok(pace) => pace,
                Err(KeeperError::Cancelled) => break,
                Err(e) => {
                    error!("Lifecycle action for verdict '{}' failed: {}", status, e);
                    Pace::Wait
                }
            };

            if pace == Pace::Wait {
                self.wait_for_next_poll(cancel).await;
            }
        }
    }

    /// Sleep one monitoring interval, cut short by cancellation or a mode change
    async fn wait_for_next_poll(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.provider.mode_changed() => {
                debug!("Shutdown mode changed, polling early");
            }
            _ = sleep(self.monitoring_interval()) => {}
        }
    }

    /// Sleep for `duration`; returns false if cancelled first
    pub(super) async fn sleep_or_cancel(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }
}
