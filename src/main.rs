use anyhow::Result;
use clap::Parser;
use serverkeeper::{
    ChildProcessManager, Clock, Collaborators, KeeperConfig, LifecycleController,
    ManifestUpdateOracle, PortPreflight, SystemClock, UpdateOracle, ZipBackupService,
    ZipPatchApplier,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "serverkeeper")]
#[command(about = "Supervisor that keeps a single server process running, updated and backed up")]
#[command(version)]
#[command(long_about = "Starts a server executable, monitors it, shuts it down after a configurable \
uptime, and applies published updates with a backup taken beforehand. Stops the server \
gracefully when the supervisor itself receives a shutdown signal.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "serverkeeper.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily rotated files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily rotated log files")]
    log_dir: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the server")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting serverkeeper v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match KeeperConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let collaborators = build_collaborators(&config).map_err(|e| {
        error!("Failed to set up supervisor services: {}", e);
        e
    })?;

    let controller = Arc::new(LifecycleController::new(config, collaborators));
    let cancel = CancellationToken::new();

    let signal_task = tokio::spawn({
        let controller = Arc::clone(&controller);
        let cancel = cancel.clone();
        async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received");
            if !controller.stop().await {
                warn!("Server had to be forced down");
            }
            cancel.cancel();
        }
    });

    controller.run(cancel.clone()).await.map_err(|e| {
        error!("Supervisor error during execution: {}", e);
        e
    })?;

    signal_task.abort();
    info!("Serverkeeper exited");
    Ok(())
}

fn build_collaborators(config: &KeeperConfig) -> serverkeeper::Result<Collaborators> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut patcher = ZipPatchApplier::new(config)?;

    let oracle: Option<Arc<dyn UpdateOracle>> = match &config.update.manifest_url {
        Some(url) if config.update.check_for_updates => {
            info!("Update checks enabled against {}", url);
            let manifest = Arc::new(ManifestUpdateOracle::new(url.clone())?);
            patcher = patcher.with_release_source(Arc::clone(&manifest));
            Some(manifest)
        }
        None if config.update.check_for_updates => {
            warn!("Update checks enabled but no manifest URL configured; skipping them");
            None
        }
        _ => None,
    };

    Ok(Collaborators {
        process: Arc::new(ChildProcessManager::new(config, Arc::clone(&clock))),
        oracle,
        patcher: Arc::new(patcher),
        backup: Arc::new(ZipBackupService::new(config, Arc::clone(&clock))),
        preflight: Arc::new(PortPreflight::new(config)),
        clock,
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("serverkeeper={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // File output stays plain text regardless of the console format
    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "serverkeeper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Serverkeeper Configuration File");
    println!("# This is the default configuration with all available options");
    println!();
    print!("{}", toml::to_string_pretty(&KeeperConfig::default())?);
    Ok(())
}
