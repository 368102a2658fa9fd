use crate::clock::elapsed_seconds;
use crate::config::KeeperConfig;
use crate::process::RuntimeSnapshot;
use crate::status::{LifecycleStatus, StopCause};
use crate::update::{UpdateCheck, UpdateOracle};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Computes the next lifecycle verdict from the server's runtime state.
///
/// Branches are evaluated in priority order and the first match wins:
///
/// 1. auto-shutdown when the server has been up for too long
/// 2. stop a running server so a newer version can be installed
/// 3. patch a stopped server when a newer version exists
/// 4. start (or idle) a stopped server
/// 5. keep monitoring a running, current server
///
/// The engine owns the update-check throttle. Oracle failures are logged and
/// treated as "no update"; nothing here ever returns an error.
pub struct StatusDecisionEngine {
    enable_auto_start: bool,
    auto_shutdown_after_seconds: i64,
    check_for_updates: bool,
    update_check_interval_seconds: i64,
    minimum_uptime_for_update_seconds: i64,
    oracle: Option<Arc<dyn UpdateOracle>>,
    last_update_check: Option<DateTime<Utc>>,
    last_stop_cause: Option<StopCause>,
}

impl StatusDecisionEngine {
    pub fn new(config: &KeeperConfig, oracle: Option<Arc<dyn UpdateOracle>>) -> Self {
        if config.update.check_for_updates && oracle.is_none() {
            warn!("Update checks are enabled but no update source is available; disabling them");
        }

        Self {
            enable_auto_start: config.lifecycle.enable_auto_start,
            auto_shutdown_after_seconds: config.lifecycle.auto_shutdown_after_seconds,
            check_for_updates: config.update.check_for_updates,
            update_check_interval_seconds: seconds(config.update.update_check_interval_seconds),
            minimum_uptime_for_update_seconds: seconds(
                config.update.minimum_server_uptime_for_update_seconds,
            ),
            oracle,
            last_update_check: None,
            last_stop_cause: None,
        }
    }

    /// When the oracle last reported "no update" (running) or was last asked (stopped)
    pub fn last_update_check(&self) -> Option<DateTime<Utc>> {
        self.last_update_check
    }

    /// Why the most recent `Stopped` verdict was produced; cleared on read
    pub fn take_stop_cause(&mut self) -> Option<StopCause> {
        self.last_stop_cause.take()
    }

    pub async fn determine_status(
        &mut self,
        snapshot: &RuntimeSnapshot,
        now: DateTime<Utc>,
    ) -> LifecycleStatus {
        self.last_stop_cause = None;

        if self.auto_shutdown_due(snapshot, now) {
            info!(
                "Server exceeded its maximum uptime of {}s, stopping",
                self.auto_shutdown_after_seconds
            );
            self.last_stop_cause = Some(StopCause::AutoShutdown);
            return LifecycleStatus::Stopped;
        }

        if let Some(oracle) = self.update_oracle() {
            if self.update_check_due(now) {
                if snapshot.is_running {
                    if self.stop_for_update(oracle.as_ref(), snapshot, now).await {
                        self.last_stop_cause = Some(StopCause::Update);
                        return LifecycleStatus::Stopped;
                    }
                } else {
                    self.last_update_check = Some(now);
                    if let Some(check) = query(oracle.as_ref(), &snapshot.current_version).await {
                        if check.available {
                            info!("Patching stopped server to version {}", check.new_version);
                            return LifecycleStatus::Patched {
                                version: check.new_version,
                            };
                        }
                    }
                }
            }
        }

        if !snapshot.is_running {
            return if self.enable_auto_start {
                LifecycleStatus::Started
            } else {
                LifecycleStatus::Idle
            };
        }

        LifecycleStatus::Monitored
    }

    /// Returns true when a running server should be stopped for an update.
    ///
    /// The throttle timestamp only advances when the oracle answered "no
    /// update", so a pending update is re-checked on the very next poll.
    async fn stop_for_update(
        &mut self,
        oracle: &dyn UpdateOracle,
        snapshot: &RuntimeSnapshot,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(check) = query(oracle, &snapshot.current_version).await else {
            return false;
        };

        if !check.available {
            self.last_update_check = Some(now);
            return false;
        }

        let uptime = elapsed_seconds(now, snapshot.start_time);
        let uptime_sufficient = uptime
            .map(|uptime| uptime >= self.minimum_uptime_for_update_seconds)
            .unwrap_or(false);

        if uptime_sufficient {
            info!(
                "Version {} is available, stopping server for update",
                check.new_version
            );
            true
        } else {
            info!(
                "Version {} is available but server uptime {:?}s is below the {}s minimum, deferring",
                check.new_version, uptime, self.minimum_uptime_for_update_seconds
            );
            false
        }
    }

    fn auto_shutdown_due(&self, snapshot: &RuntimeSnapshot, now: DateTime<Utc>) -> bool {
        if self.auto_shutdown_after_seconds <= 0 || !snapshot.is_running {
            return false;
        }

        // A running server with no recorded start time counts as up forever
        elapsed_seconds(now, snapshot.start_time)
            .map(|uptime| uptime >= self.auto_shutdown_after_seconds)
            .unwrap_or(true)
    }

    fn update_check_due(&self, now: DateTime<Utc>) -> bool {
        elapsed_seconds(now, self.last_update_check)
            .map(|since| since >= self.update_check_interval_seconds)
            .unwrap_or(true)
    }

    fn update_oracle(&self) -> Option<Arc<dyn UpdateOracle>> {
        if self.check_for_updates {
            self.oracle.clone()
        } else {
            None
        }
    }
}

async fn query(oracle: &dyn UpdateOracle, current_version: &str) -> Option<UpdateCheck> {
    match oracle.check_for_newer_version(current_version).await {
        Ok(check) => {
            debug!(
                "Update check for {}: available={} ({})",
                current_version, check.available, check.message
            );
            Some(check)
        }
        Err(e) => {
            warn!("Update check failed, assuming no update: {}", e);
            None
        }
    }
}

fn seconds(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
