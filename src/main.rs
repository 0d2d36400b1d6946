//! CLI entrypoint: parse flags, init tracing, boot, serve until a
//! shutdown signal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kernel::{boot, config, gateway, security::RootKey};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kernel", about = "Supervisory runtime hosting a self-modifying agent")]
struct Cli {
    /// Path to config.toml. Defaults to `~/.kernel/config.toml`.
    #[arg(long, env = "KERNEL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory relative config paths (database, audit log) resolve against.
    #[arg(long, env = "KERNEL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Flip the persisted `setup_complete` flag. The next normal run
    /// performs the full subsystem birth.
    CompleteSetup,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".kernel")
}

fn init_tracing(logging: &config::schema::LoggingConfig, data_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = data_dir.join(&logging.log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "kernel.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&logging.filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    guard
}

fn root_key_from_env() -> Result<RootKey, String> {
    let encoded = std::env::var("KERNEL_ROOT_KEY").map_err(|_| "KERNEL_ROOT_KEY not set".to_string())?;
    RootKey::from_base64(&encoded).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config_path = cli.config.unwrap_or_else(|| data_dir.join("config.toml"));

    let app_config = match config::load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config at {config_path:?}: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let _tracing_guard = init_tracing(&app_config.logging, &data_dir);

    match cli.command {
        Some(Command::CompleteSetup) => complete_setup(&app_config, &data_dir).await,
        None => run(app_config, &data_dir).await,
    }
}

async fn complete_setup(app_config: &config::AppConfig, data_dir: &std::path::Path) -> std::process::ExitCode {
    let root_key = match root_key_from_env() {
        Ok(k) => k,
        Err(e) => {
            eprintln!("{e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    let db_path = if std::path::Path::new(&app_config.database.path).is_absolute() {
        PathBuf::from(&app_config.database.path)
    } else {
        data_dir.join(&app_config.database.path)
    };
    let pool = match kernel::database::init(&db_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("failed to open database: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    let store = config::ConfigStore::new(pool, root_key);
    match store.mark_setup_complete() {
        Ok(()) => {
            tracing::info!("setup marked complete; next run will perform the full subsystem birth");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to mark setup complete: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(app_config: config::AppConfig, data_dir: &std::path::Path) -> std::process::ExitCode {
    let server = app_config.server.clone();

    let handle = match boot::boot(app_config, data_dir).await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "boot failed");
            return std::process::ExitCode::FAILURE;
        }
    };

    let health_checker = handle.health_checker.clone();
    let maintenance = handle.maintenance.clone();
    let vram = handle.vram.clone();

    let gateway_state = handle.gateway_state.clone();
    tokio::select! {
        result = gateway::start_gateway(&server, gateway_state) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "gateway serve failed");
                return std::process::ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    health_checker.stop();
    maintenance.stop();
    vram.stop();

    std::process::ExitCode::SUCCESS
}
