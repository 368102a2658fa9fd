use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeeperConfig {
    pub server: ServerConfig,
    pub lifecycle: LifecycleConfig,
    pub update: UpdateConfig,
    pub backup: BackupConfig,
    pub preflight: PreflightConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Server executable to supervise
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Arguments passed to the executable
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Directory the server runs in; also the root that gets backed up and patched
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,

    /// Line written to the server's stdin to request a graceful stop
    #[serde(default = "default_graceful_stop_command")]
    pub graceful_stop_command: String,

    /// How long to wait for the server to exit after the stop command
    #[serde(default = "default_graceful_stop_timeout")]
    pub graceful_stop_timeout_seconds: u64,

    /// File (relative to the working directory) holding the installed version
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,

    /// File (relative to the working directory) holding the running server's PID
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifecycleConfig {
    /// Start the server whenever it is found not running
    #[serde(default = "default_enable_auto_start")]
    pub enable_auto_start: bool,

    /// Delay before the first poll after the supervisor starts
    #[serde(default = "default_auto_start_delay")]
    pub auto_start_delay_seconds: u64,

    /// Maximum continuous uptime before the server is stopped (<= 0 disables)
    #[serde(default = "default_auto_shutdown_after")]
    pub auto_shutdown_after_seconds: i64,

    /// Sleep between polls while monitoring or idle
    #[serde(default = "default_monitoring_interval")]
    pub monitoring_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpdateConfig {
    /// Poll the update manifest for newer versions
    #[serde(default = "default_check_for_updates")]
    pub check_for_updates: bool,

    /// Minimum time between two manifest checks
    #[serde(default = "default_update_check_interval")]
    pub update_check_interval_seconds: u64,

    /// Server must have been up this long before an update may stop it
    #[serde(default = "default_minimum_uptime")]
    pub minimum_server_uptime_for_update_seconds: u64,

    /// JSON manifest describing the latest available version
    #[serde(default)]
    pub manifest_url: Option<String>,

    /// Download URL with a `{version}` placeholder; overrides the manifest's URL
    #[serde(default)]
    pub download_url_template: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackupConfig {
    /// Archive the working directory before applying an update
    #[serde(default = "default_backup_enabled")]
    pub enabled: bool,

    /// Directory (relative to the working directory) receiving backup archives
    #[serde(default = "default_backup_directory")]
    pub directory: PathBuf,

    /// Number of archives kept; older ones are pruned
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreflightConfig {
    /// TCP port the server listens on; probed at startup when set
    #[serde(default)]
    pub port: Option<u16>,

    /// Number of one-second probes before giving up on a busy port
    #[serde(default = "default_port_release_attempts")]
    pub port_release_attempts: u32,
}

impl KeeperConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("serverkeeper.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.executable", default_executable())?
            .set_default("server.arguments", Vec::<String>::new())?
            .set_default(
                "server.working_directory",
                default_working_directory().to_string_lossy().to_string(),
            )?
            .set_default("server.graceful_stop_command", default_graceful_stop_command())?
            .set_default(
                "server.graceful_stop_timeout_seconds",
                default_graceful_stop_timeout() as i64,
            )?
            .set_default(
                "server.version_file",
                default_version_file().to_string_lossy().to_string(),
            )?
            .set_default(
                "server.pid_file",
                default_pid_file().to_string_lossy().to_string(),
            )?
            .set_default("lifecycle.enable_auto_start", default_enable_auto_start())?
            .set_default(
                "lifecycle.auto_start_delay_seconds",
                default_auto_start_delay() as i64,
            )?
            .set_default(
                "lifecycle.auto_shutdown_after_seconds",
                default_auto_shutdown_after(),
            )?
            .set_default(
                "lifecycle.monitoring_interval_seconds",
                default_monitoring_interval() as i64,
            )?
            .set_default("update.check_for_updates", default_check_for_updates())?
            .set_default(
                "update.update_check_interval_seconds",
                default_update_check_interval() as i64,
            )?
            .set_default(
                "update.minimum_server_uptime_for_update_seconds",
                default_minimum_uptime() as i64,
            )?
            .set_default("backup.enabled", default_backup_enabled())?
            .set_default(
                "backup.directory",
                default_backup_directory().to_string_lossy().to_string(),
            )?
            .set_default("backup.max_backups", default_max_backups() as i64)?
            .set_default(
                "preflight.port_release_attempts",
                default_port_release_attempts() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. SERVERKEEPER__LIFECYCLE__ENABLE_AUTO_START=false
            .add_source(
                Environment::with_prefix("SERVERKEEPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: KeeperConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.executable.trim().is_empty() {
            return Err(ConfigError::Message(
                "Server executable must be set".to_string(),
            ));
        }

        if self.lifecycle.monitoring_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Monitoring interval must be greater than 0".to_string(),
            ));
        }

        if self.update.check_for_updates {
            if self.update.update_check_interval_seconds == 0 {
                return Err(ConfigError::Message(
                    "Update check interval must be greater than 0".to_string(),
                ));
            }

            if self.update.manifest_url.is_none() {
                return Err(ConfigError::Message(
                    "Update checks are enabled but no manifest_url is configured".to_string(),
                ));
            }
        }

        if self.backup.max_backups == 0 {
            return Err(ConfigError::Message(
                "Backup max_backups must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve a path from the config against the server's working directory
    pub fn server_path(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.server.working_directory.join(relative)
        }
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                executable: default_executable(),
                arguments: Vec::new(),
                working_directory: default_working_directory(),
                graceful_stop_command: default_graceful_stop_command(),
                graceful_stop_timeout_seconds: default_graceful_stop_timeout(),
                version_file: default_version_file(),
                pid_file: default_pid_file(),
            },
            lifecycle: LifecycleConfig {
                enable_auto_start: default_enable_auto_start(),
                auto_start_delay_seconds: default_auto_start_delay(),
                auto_shutdown_after_seconds: default_auto_shutdown_after(),
                monitoring_interval_seconds: default_monitoring_interval(),
            },
            update: UpdateConfig {
                check_for_updates: default_check_for_updates(),
                update_check_interval_seconds: default_update_check_interval(),
                minimum_server_uptime_for_update_seconds: default_minimum_uptime(),
                manifest_url: None,
                download_url_template: None,
            },
            backup: BackupConfig {
                enabled: default_backup_enabled(),
                directory: default_backup_directory(),
                max_backups: default_max_backups(),
            },
            preflight: PreflightConfig {
                port: None,
                port_release_attempts: default_port_release_attempts(),
            },
        }
    }
}

// Default value functions
fn default_executable() -> String {
    String::new()
}
fn default_working_directory() -> PathBuf {
    PathBuf::from(".")
}
fn default_graceful_stop_command() -> String {
    "stop".to_string()
}
fn default_graceful_stop_timeout() -> u64 {
    30
}
fn default_version_file() -> PathBuf {
    PathBuf::from("version.txt")
}
fn default_pid_file() -> PathBuf {
    PathBuf::from("serverkeeper.pid")
}

fn default_enable_auto_start() -> bool {
    true
}
fn default_auto_start_delay() -> u64 {
    0
}
fn default_auto_shutdown_after() -> i64 {
    0
}
fn default_monitoring_interval() -> u64 {
    10
}

fn default_check_for_updates() -> bool {
    false
}
fn default_update_check_interval() -> u64 {
    3600
}
fn default_minimum_uptime() -> u64 {
    300
}

fn default_backup_enabled() -> bool {
    true
}
fn default_backup_directory() -> PathBuf {
    PathBuf::from("backups")
}
fn default_max_backups() -> usize {
    10
}

fn default_port_release_attempts() -> u32 {
    10
}
