use super::types::Pace;
use super::LifecycleController;
use crate::error::{KeeperError, Result};
use crate::status::LifecycleStatus;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl LifecycleController {
    /// Carry out the action for one verdict
    pub(super) async fn dispatch(
        &self,
        status: &LifecycleStatus,
        cancel: &CancellationToken,
    ) -> Result<Pace> {
        match status {
            LifecycleStatus::Started => Ok(self.start_server().await),
            LifecycleStatus::Stopped => {
                if self.process.is_running().await {
                    self.stop_server().await;
                    self.sleep_or_cancel(self.timings.settle_delay, cancel)
                        .await;
                }
                Ok(Pace::Immediate)
            }
            LifecycleStatus::Patched { version } => {
                self.patch_server(version, cancel).await?;
                Ok(Pace::Immediate)
            }
            LifecycleStatus::Monitored | LifecycleStatus::Idle | LifecycleStatus::Error => {
                Ok(Pace::Wait)
            }
        }
    }

    async fn start_server(&self) -> Pace {
        if self.process.is_running().await {
            return Pace::Immediate;
        }

        info!("Starting server");
        if self.process.start().await {
            Pace::Immediate
        } else {
            error!("Server failed to start");
            // Next attempt waits for the next monitoring tick
            Pace::Wait
        }
    }

    /// Graceful stop, escalating to a forced stop
    pub(super) async fn stop_server(&self) -> bool {
        info!("Stopping server");
        if self.process.graceful_stop().await {
            return true;
        }

        warn!("Graceful stop failed, forcing the server down");
        if self.process.force_stop().await {
            true
        } else {
            error!("Forced stop failed; server may still be running");
            false
        }
    }

    async fn patch_server(&self, version: &str, cancel: &CancellationToken) -> Result<()> {
        if version.trim().is_empty() {
            return Err(KeeperError::InvalidPatchVersion);
        }

        if self.config.backup.enabled {
            let archive = self.backup.create_backup().await?;
            info!("Created pre-update backup {}", archive.display());
        }

        info!("Applying update {}", version);
        self.patcher.apply_update(version, cancel).await?;
        info!("Update {} applied", version);
        Ok(())
    }
}
