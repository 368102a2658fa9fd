use crate::clock::Clock;
use crate::engine::StatusDecisionEngine;
use crate::process::ProcessManager;
use crate::status::{LifecycleStatus, ShutdownMode, StopCause};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{debug, info};

/// One-shot latch: `Stopped` the first time, `Idle` forever after
#[derive(Debug, Default)]
pub struct ShutdownSequence {
    fired: AtomicBool,
}

impl ShutdownSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_status(&self) -> LifecycleStatus {
        if self.fired.swap(true, Ordering::SeqCst) {
            LifecycleStatus::Idle
        } else {
            LifecycleStatus::Stopped
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Status source for the controller.
///
/// In `Normal` mode verdicts come from the decision engine. The override modes
/// take precedence over the engine unconditionally:
/// `ServiceShutdown` replays the provider's single shutdown sequence and
/// `DenyRestart` pins every verdict to `Idle`.
///
/// The shutdown sequence belongs to the provider and never re-arms, so
/// switching back to `Normal` and into `ServiceShutdown` again yields `Idle`.
pub struct ModeOverrideProvider {
    engine: AsyncMutex<StatusDecisionEngine>,
    process: Arc<dyn ProcessManager>,
    clock: Arc<dyn Clock>,
    mode: Mutex<ShutdownMode>,
    mode_signal: Notify,
    shutdown_sequence: ShutdownSequence,
}

impl ModeOverrideProvider {
    pub fn new(
        engine: StatusDecisionEngine,
        process: Arc<dyn ProcessManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: AsyncMutex::new(engine),
            process,
            clock,
            mode: Mutex::new(ShutdownMode::Normal),
            mode_signal: Notify::new(),
            shutdown_sequence: ShutdownSequence::new(),
        }
    }

    pub fn current_mode(&self) -> ShutdownMode {
        *self.mode.lock()
    }

    pub fn set_mode(&self, mode: ShutdownMode) {
        let previous = std::mem::replace(&mut *self.mode.lock(), mode);
        if previous != mode {
            info!("Shutdown mode changed: {:?} -> {:?}", previous, mode);
            self.mode_signal.notify_one();
        }
    }

    /// Resolves after the next `set_mode` call that changed the mode.
    ///
    /// A change made while nobody is waiting is kept for the next waiter.
    pub async fn mode_changed(&self) {
        self.mode_signal.notified().await;
    }

    pub async fn get_status(&self) -> LifecycleStatus {
        match self.current_mode() {
            ShutdownMode::ServiceShutdown => {
                let status = self.shutdown_sequence.next_status();
                debug!("Service shutdown in progress, verdict {}", status);
                status
            }
            ShutdownMode::DenyRestart => LifecycleStatus::Idle,
            ShutdownMode::Normal => self.engine_status().await,
        }
    }

    async fn engine_status(&self) -> LifecycleStatus {
        let snapshot = self.process.snapshot().await;
        let now = self.clock.now();

        let mut engine = self.engine.lock().await;
        let status = engine.determine_status(&snapshot, now).await;

        if status == LifecycleStatus::Stopped
            && engine.take_stop_cause() == Some(StopCause::AutoShutdown)
        {
            self.deny_restart_after_auto_shutdown();
        }

        status
    }

    /// Pin later verdicts to `Idle` unless another mode was requested meanwhile
    fn deny_restart_after_auto_shutdown(&self) {
        let mut mode = self.mode.lock();
        if *mode == ShutdownMode::Normal {
            *mode = ShutdownMode::DenyRestart;
            info!("Auto-shutdown fired, restarts are denied from now on");
        }
    }
}
