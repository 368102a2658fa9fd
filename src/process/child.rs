use super::ProcessManager;
use crate::clock::Clock;
use crate::config::KeeperConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const UNKNOWN_VERSION: &str = "0.0.0";

struct RunningServer {
    child: Child,
    stdin: Option<ChildStdin>,
    started_at: DateTime<Utc>,
}

/// Runs the server as a child process of the supervisor
pub struct ChildProcessManager {
    executable: String,
    arguments: Vec<String>,
    working_directory: PathBuf,
    graceful_stop_command: String,
    graceful_stop_timeout: Duration,
    version_file: PathBuf,
    pid_file: PathBuf,
    clock: Arc<dyn Clock>,
    server: Mutex<Option<RunningServer>>,
}

impl ChildProcessManager {
    pub fn new(config: &KeeperConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            executable: config.server.executable.clone(),
            arguments: config.server.arguments.clone(),
            working_directory: config.server.working_directory.clone(),
            graceful_stop_command: config.server.graceful_stop_command.clone(),
            graceful_stop_timeout: Duration::from_secs(config.server.graceful_stop_timeout_seconds),
            version_file: config.server_path(&config.server.version_file),
            pid_file: config.server_path(&config.server.pid_file),
            clock,
            server: Mutex::new(None),
        }
    }

    async fn remove_pid_file(&self) {
        match tokio::fs::remove_file(&self.pid_file).await {
            Ok(()) => debug!("Removed PID file {}", self.pid_file.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove PID file {}: {}", self.pid_file.display(), e),
        }
    }

    /// Poll until the child has exited or the timeout elapses
    async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running().await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ProcessManager for ChildProcessManager {
    async fn is_running(&self) -> bool {
        let mut guard = self.server.lock().await;
        let Some(server) = guard.as_mut() else {
            return false;
        };

        match server.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!("Server process exited: {}", status);
                *guard = None;
                drop(guard);
                self.remove_pid_file().await;
                false
            }
            Err(e) => {
                error!("Failed to query server process state: {}", e);
                false
            }
        }
    }

    async fn start_time(&self) -> Option<DateTime<Utc>> {
        self.server.lock().await.as_ref().map(|server| server.started_at)
    }

    async fn current_version(&self) -> String {
        match tokio::fs::read_to_string(&self.version_file).await {
            Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
            Ok(_) => UNKNOWN_VERSION.to_string(),
            Err(e) => {
                debug!(
                    "Version file {} unreadable ({}), assuming {}",
                    self.version_file.display(),
                    e,
                    UNKNOWN_VERSION
                );
                UNKNOWN_VERSION.to_string()
            }
        }
    }

    async fn start(&self) -> bool {
        if self.is_running().await {
            warn!("Start requested while the server is already running");
            return true;
        }

        info!(
            "Starting server: {} {:?} in {}",
            self.executable,
            self.arguments,
            self.working_directory.display()
        );

        let spawned = Command::new(&self.executable)
            .args(&self.arguments)
            .current_dir(&self.working_directory)
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start server {}: {}", self.executable, e);
                return false;
            }
        };

        let stdin = child.stdin.take();
        let pid = child.id();

        if let Some(pid) = pid {
            if let Err(e) = tokio::fs::write(&self.pid_file, pid.to_string()).await {
                warn!("Failed to write PID file {}: {}", self.pid_file.display(), e);
            }
        }

        *self.server.lock().await = Some(RunningServer {
            child,
            stdin,
            started_at: self.clock.now(),
        });

        info!("Server started (pid {:?})", pid);
        true
    }

    async fn graceful_stop(&self) -> bool {
        let stdin = match self.server.lock().await.as_mut() {
            Some(server) => server.stdin.take(),
            None => return true,
        };

        let Some(mut stdin) = stdin else {
            warn!("Server stdin is unavailable, cannot request a graceful stop");
            return false;
        };

        info!(
            "Sending '{}' to the server for a graceful stop",
            self.graceful_stop_command
        );

        let line = format!("{}\n", self.graceful_stop_command);
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            error!("Failed to write stop command: {}", e);
            return false;
        }
        if let Err(e) = stdin.flush().await {
            error!("Failed to flush stop command: {}", e);
            return false;
        }
        drop(stdin);

        if self.wait_for_exit(self.graceful_stop_timeout).await {
            info!("Server stopped gracefully");
            true
        } else {
            warn!(
                "Server did not exit within {:?} after the stop command",
                self.graceful_stop_timeout
            );
            false
        }
    }

    async fn force_stop(&self) -> bool {
        let mut guard = self.server.lock().await;
        let Some(server) = guard.as_mut() else {
            return true;
        };

        warn!("Force-stopping server (pid {:?})", server.child.id());
        match server.child.kill().await {
            Ok(()) => {
                *guard = None;
                drop(guard);
                self.remove_pid_file().await;
                info!("Server force-stopped");
                true
            }
            Err(e) => {
                error!("Failed to force-stop server: {}", e);
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn shell_config(dir: &std::path::Path, script: &str) -> KeeperConfig {
        let mut config = KeeperConfig::default();
        config.server.executable = "sh".to_string();
        config.server.arguments = vec!["-c".to_string(), script.to_string()];
        config.server.working_directory = dir.to_path_buf();
        config.server.graceful_stop_timeout_seconds = 5;
        config
    }

    #[tokio::test]
    async fn test_graceful_stop_via_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_config(dir.path(), r#"read cmd; [ "$cmd" = "stop" ] && exit 0; sleep 30"#);
        let manager = ChildProcessManager::new(&config, Arc::new(SystemClock));

        assert!(manager.start_time().await.is_none());
        assert!(manager.start().await);
        assert!(manager.is_running().await);
        assert!(manager.start_time().await.is_some());
        assert!(dir.path().join("serverkeeper.pid").exists());

        assert!(manager.graceful_stop().await);
        assert!(!manager.is_running().await);
        assert!(!dir.path().join("serverkeeper.pid").exists());
    }

    #[tokio::test]
    async fn test_force_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = shell_config(dir.path(), "sleep 30");
        config.server.graceful_stop_timeout_seconds = 1;
        let manager = ChildProcessManager::new(&config, Arc::new(SystemClock));

        assert!(manager.start().await);
        // sleep ignores stdin, so the graceful path times out
        assert!(!manager.graceful_stop().await);
        assert!(manager.is_running().await);

        assert!(manager.force_stop().await);
        assert!(!manager.is_running().await);
        assert!(manager.start_time().await.is_none());
    }

    #[tokio::test]
    async fn test_start_failure_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = shell_config(dir.path(), "");
        config.server.executable = "/nonexistent/server-binary".to_string();
        let manager = ChildProcessManager::new(&config, Arc::new(SystemClock));

        assert!(!manager.start().await);
        assert!(!manager.is_running().await);
    }

    #[tokio::test]
    async fn test_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_config(dir.path(), "");
        let manager = ChildProcessManager::new(&config, Arc::new(SystemClock));

        assert_eq!(manager.current_version().await, "0.0.0");

        std::fs::write(dir.path().join("version.txt"), "1.4.2\n").unwrap();
        assert_eq!(manager.current_version().await, "1.4.2");

        let snapshot = manager.snapshot().await;
        assert!(!snapshot.is_running);
        assert_eq!(snapshot.start_time, None);
        assert_eq!(snapshot.current_version, "1.4.2");
    }
}
