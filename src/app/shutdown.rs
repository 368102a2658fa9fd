use super::LifecycleController;
use crate::status::ShutdownMode;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

impl LifecycleController {
    /// Request a shutdown of the supervised server from outside the loop.
    ///
    /// Switches the provider into the service shutdown sequence so the running
    /// loop issues exactly one stop and never restarts the server, then waits
    /// for the server to go down. Forces it down once the timeout elapses.
    /// Returns true when the server stopped on its own within the timeout.
    pub async fn stop(&self) -> bool {
        info!("Shutdown requested");
        self.provider.set_mode(ShutdownMode::ServiceShutdown);

        let deadline = Instant::now() + self.timings.stop_timeout;
        loop {
            if !self.process.is_running().await {
                info!("Server is stopped");
                return true;
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.timings.stop_poll_interval).await;
        }

        warn!(
            "Server still running {:?} after the shutdown request, forcing it down",
            self.timings.stop_timeout
        );
        if !self.process.force_stop().await {
            error!("Forced stop failed during shutdown");
        }
        false
    }

    /// Final cleanup once the loop has been cancelled
    pub(super) async fn stop_on_exit(&self) {
        if self.process.is_running().await {
            info!("Stopping server before exit");
            self.stop_server().await;
        }
    }
}
