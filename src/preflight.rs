use crate::config::KeeperConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const PORT_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Startup cleanup run once before the supervision loop
#[async_trait]
pub trait PreflightService: Send + Sync {
    /// Returns `false` when the environment is still not ready after cleanup
    async fn check_and_cleanup(&self) -> bool;
}

/// Kills a server left over from a previous supervisor run and waits for its port
pub struct PortPreflight {
    executable: String,
    pid_file: PathBuf,
    port: Option<u16>,
    attempts: u32,
    probe_interval: Duration,
}

impl PortPreflight {
    pub fn new(config: &KeeperConfig) -> Self {
        Self {
            executable: config.server.executable.clone(),
            pid_file: config.server_path(&config.server.pid_file),
            port: config.preflight.port,
            attempts: config.preflight.port_release_attempts.max(1),
            probe_interval: PORT_PROBE_INTERVAL,
        }
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    async fn reap_stale_process(&self) {
        let contents = match tokio::fs::read_to_string(&self.pid_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("Failed to read PID file {}: {}", self.pid_file.display(), e);
                return;
            }
        };

        match contents.trim().parse::<u32>() {
            Ok(pid) => kill_stale_process(pid, &self.executable),
            Err(_) => warn!(
                "PID file {} does not contain a PID, discarding it",
                self.pid_file.display()
            ),
        }

        if let Err(e) = tokio::fs::remove_file(&self.pid_file).await {
            warn!("Failed to remove PID file {}: {}", self.pid_file.display(), e);
        }
    }

    async fn wait_for_port(&self, port: u16) -> bool {
        for attempt in 1..=self.attempts {
            match TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => {
                    drop(listener);
                    debug!("Port {} is free", port);
                    return true;
                }
                Err(e) => {
                    info!(
                        "Port {} is busy ({}), attempt {}/{}",
                        port, e, attempt, self.attempts
                    );
                }
            }

            if attempt < self.attempts {
                sleep(self.probe_interval).await;
            }
        }

        false
    }
}

#[async_trait]
impl PreflightService for PortPreflight {
    async fn check_and_cleanup(&self) -> bool {
        self.reap_stale_process().await;

        match self.port {
            Some(port) => {
                let free = self.wait_for_port(port).await;
                if !free {
                    warn!("Port {} is still in use after preflight cleanup", port);
                }
                free
            }
            None => true,
        }
    }
}

#[cfg(unix)]
fn kill_stale_process(pid: u32, executable: &str) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        warn!("PID {} is out of range, ignoring", pid);
        return;
    };
    if pid <= 0 {
        return;
    }

    // Signal 0 only checks that the process exists
    let alive = unsafe { libc::kill(pid, 0) } == 0;
    if !alive {
        debug!("Stale PID {} is no longer running", pid);
        return;
    }

    match runs_executable(pid, executable) {
        Some(true) => {}
        Some(false) => {
            warn!(
                "PID {} from the PID file belongs to another program, leaving it alone",
                pid
            );
            return;
        }
        None => {
            warn!(
                "Cannot confirm that PID {} is a leftover {}, leaving it alone",
                pid, executable
            );
            return;
        }
    }

    warn!("Killing server process {} left over from a previous run", pid);
    if unsafe { libc::kill(pid, libc::SIGKILL) } != 0 {
        warn!(
            "Failed to kill stale process {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

/// Whether `pid` is running the configured server executable.
///
/// Matches on file name against the process image and its first two
/// arguments, so interpreters running a start script are recognised too.
/// `None` when the process cannot be inspected.
#[cfg(target_os = "linux")]
fn runs_executable(pid: libc::pid_t, executable: &str) -> Option<bool> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    let wanted = Path::new(executable.trim()).file_name()?;
    let mut inspected = false;

    if let Ok(image) = std::fs::read_link(format!("/proc/{}/exe", pid)) {
        inspected = true;
        if image.file_name() == Some(wanted) {
            return Some(true);
        }
    }

    if let Ok(cmdline) = std::fs::read(format!("/proc/{}/cmdline", pid)) {
        inspected = true;
        let matched = cmdline
            .split(|byte| *byte == 0)
            .take(2)
            .any(|arg| Path::new(OsStr::from_bytes(arg)).file_name() == Some(wanted));
        if matched {
            return Some(true);
        }
    }

    inspected.then_some(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn runs_executable(_pid: libc::pid_t, _executable: &str) -> Option<bool> {
    None
}

#[cfg(not(unix))]
fn kill_stale_process(pid: u32, _executable: &str) {
    warn!(
        "Stale server process {} cannot be reaped on this platform",
        pid
    );
}
