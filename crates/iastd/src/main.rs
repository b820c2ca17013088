//! iastd — IAST scanner daemon
//!
//! Wires the Target Manager, Supervisor, Ingest Server, and Admin API
//! together behind a `clap` CLI.

use clap::{Parser, Subcommand};
use iast_config::Config;
use iast_model::{RateBounds, TargetConfig, DEFAULT_CONFIG_KEY};
use iast_supervisor::Supervisor;
use iast_target::TargetManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "iastd")]
#[command(about = "Interactive Application Security Testing scanner daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon: the Ingest Server, Admin API, and Target Manager.
    Start {
        /// Stay attached to the terminal and log to stdout instead of the
        /// configured log file.
        #[arg(short = 'f', long)]
        foreground: bool,

        /// Path to the YAML config file.
        #[arg(short = 'c', long, default_value = "/etc/iastd/config.yaml")]
        config: PathBuf,

        /// Directory holding per-target state and the pid file.
        #[arg(short = 's', long, default_value = "/var/lib/iastd")]
        state_dir: PathBuf,
    },

    /// Stop a running daemon, found via its pid file.
    Stop {
        #[arg(short = 's', long, default_value = "/var/lib/iastd")]
        state_dir: PathBuf,
    },

    /// Stop then start the daemon.
    Restart {
        #[arg(short = 'f', long)]
        foreground: bool,
        #[arg(short = 'c', long, default_value = "/etc/iastd/config.yaml")]
        config: PathBuf,
        #[arg(short = 's', long, default_value = "/var/lib/iastd")]
        state_dir: PathBuf,
    },

    /// Inspect or initialize the config file.
    Config {
        /// Write a default config file to this path.
        #[arg(long)]
        init: Option<PathBuf>,

        /// Load and print the config at this path.
        #[arg(long)]
        show: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(DaemonError::Precondition(msg)) => {
            eprintln!("iastd: {msg}");
            ExitCode::from(1)
        }
        Err(DaemonError::Crash(msg)) => {
            eprintln!("iastd: unexpected failure: {msg}");
            ExitCode::from(2)
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error("{0}")]
    Precondition(String),
    #[error("{0}")]
    Crash(String),
}

fn run(cli: Cli) -> Result<(), DaemonError> {
    match cli.command {
        Commands::Start { foreground, config, state_dir } => start(foreground, &config, &state_dir),
        Commands::Stop { state_dir } => stop(&state_dir),
        Commands::Restart { foreground, config, state_dir } => {
            let _ = stop(&state_dir);
            start(foreground, &config, &state_dir)
        }
        Commands::Config { init, show } => config_cmd(init, show),
    }
}

fn init_logging(foreground: bool, log: &iast_config::LogConfig) {
    let filter = EnvFilter::from_default_env().add_directive("iastd=info".parse().expect("static directive"));
    let registry = tracing_subscriber::registry().with(filter);
    if foreground {
        registry.with(fmt::layer()).init();
    } else {
        // True double-fork daemonization would need unsafe FFI, forbidden in
        // this workspace; -f only toggles where logs go, the process stays
        // attached either way.
        let appender = tracing_appender::rolling::never(
            std::path::Path::new(&log.path).parent().unwrap_or_else(|| std::path::Path::new(".")),
            std::path::Path::new(&log.path).file_name().unwrap_or_else(|| std::ffi::OsStr::new("iastd.log")),
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        std::mem::forget(guard);
        registry.with(fmt::layer().with_writer(writer)).init();
    }
}

fn pid_file(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("iastd.pid")
}

fn start(foreground: bool, config_path: &std::path::Path, state_dir: &std::path::Path) -> Result<(), DaemonError> {
    std::fs::create_dir_all(state_dir)
        .map_err(|e| DaemonError::Precondition(format!("cannot create state dir: {e}")))?;

    let config = Config::load(config_path)
        .map_err(|e| DaemonError::Precondition(format!("cannot load config {}: {e}", config_path.display())))?;

    init_logging(foreground, &config.log);
    info!(config = %config_path.display(), state_dir = %state_dir.display(), "starting iastd");

    std::fs::write(pid_file(state_dir), std::process::id().to_string())
        .map_err(|e| DaemonError::Precondition(format!("cannot write pid file: {e}")))?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| DaemonError::Crash(format!("cannot start tokio runtime: {e}")))?;

    runtime.block_on(async move { serve(config, state_dir.to_path_buf()).await })
}

async fn serve(config: Config, state_dir: PathBuf) -> Result<(), DaemonError> {
    let plugins = iast_plugins::builtin_registry();
    let ingest_addr: SocketAddr = ([0, 0, 0, 0], config.preprocessor.http_port).into();
    let admin_addr: SocketAddr = ([127, 0, 0, 1], config.monitor.console_port).into();

    let max_scanners = config.scanner.max_module_instance as usize;
    let default_target_config = TargetConfig {
        host_port: DEFAULT_CONFIG_KEY.to_string(),
        rate_bounds: RateBounds {
            max_concurrent: config.scanner.max_concurrent_request,
            min_interval_ms: config.scanner.min_request_interval,
            max_interval_ms: config.scanner.max_request_interval,
        },
        ..TargetConfig::default()
    };

    let supervisor = Supervisor::new(state_dir.clone(), config, plugins);

    let (ingest_handle, control) = supervisor
        .serve_ingest(ingest_addr)
        .await
        .map_err(|e| DaemonError::Precondition(format!("cannot bind ingest port {ingest_addr}: {e}")))?;

    let manager = std::sync::Arc::new(TargetManager::new(
        &state_dir,
        supervisor.clone(),
        Some(control),
        max_scanners,
        default_target_config,
    ));
    supervisor.attach_target_manager(&manager);

    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .map_err(|e| DaemonError::Precondition(format!("cannot bind admin port {admin_addr}: {e}")))?;
    let admin_router = iast_target::build_admin_router(manager);
    let admin_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(admin_listener, admin_router).await {
            error!(error = %e, "admin server exited");
        }
    });

    info!(ingest = %ingest_addr, admin = %admin_addr, "iastd ready");

    tokio::select! {
        _ = ingest_handle => {}
        _ = admin_handle => {}
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }
    Ok(())
}

fn stop(state_dir: &std::path::Path) -> Result<(), DaemonError> {
    let path = pid_file(state_dir);
    let pid = std::fs::read_to_string(&path)
        .map_err(|e| DaemonError::Precondition(format!("cannot read pid file {}: {e}", path.display())))?;
    let pid = pid.trim();

    let status = std::process::Command::new("kill")
        .args(["-TERM", pid])
        .status()
        .map_err(|e| DaemonError::Crash(format!("cannot signal pid {pid}: {e}")))?;
    if !status.success() {
        return Err(DaemonError::Precondition(format!("kill -TERM {pid} failed")));
    }
    let _ = std::fs::remove_file(&path);
    Ok(())
}

fn config_cmd(init: Option<PathBuf>, show: Option<PathBuf>) -> Result<(), DaemonError> {
    if let Some(path) = init {
        Config::default()
            .save(&path)
            .map_err(|e| DaemonError::Precondition(format!("cannot write config: {e}")))?;
        println!("config written to {}", path.display());
    }
    if let Some(path) = show {
        let cfg = Config::load(&path).map_err(|e| DaemonError::Precondition(format!("cannot load config: {e}")))?;
        let text = serde_yaml::to_string(&cfg).map_err(|e| DaemonError::Crash(format!("cannot render config: {e}")))?;
        print!("{text}");
    }
    Ok(())
}
