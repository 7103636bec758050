//! whirlnet
//!
//! Multi-user telnet shell server.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use server::accounts::{CredentialStore, JsonCredentialStore};
use server::config::{default_config_path, Config};
use server::login::signup_problem;
use server::WhirlServer;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// whirlnet - multi-user telnet shell with direct messages and broadcast.
#[derive(Parser, Debug)]
#[command(name = "whirlnet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the telnet server
    Serve {
        /// Address to listen on, overriding the config file
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Create an account without connecting (password is read from stdin)
    Register {
        /// Username for the new account
        username: String,
    },

    /// Print the configuration file path in use
    ConfigPath,

    /// Print the default configuration as TOML
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;

            let _guard = init_tracing(&config, cli.verbose)?;
            tracing::info!(config = %config_path.display(), "whirlnet starting");
            run_server(config).await?;
        }
        Commands::Register { username } => {
            config.validate()?;
            let _guard = init_tracing(&config, cli.verbose)?;
            register_offline(&config, &username)?;
        }
        Commands::ConfigPath => {
            println!("{}", config_path.display());
        }
        Commands::DefaultConfig => {
            print!("{}", Config::default().to_toml()?);
        }
    }

    Ok(())
}

/// Initialize tracing from the logging config.
///
/// `RUST_LOG` wins over the configured level; `--verbose` forces debug.
/// When a log file is configured, output goes to both stderr and the file.
fn init_tracing(config: &Config, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug"
    } else {
        config.logging.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(log_file) = &config.logging.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let directory = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let file_name = log_file
        .file_name()
        .with_context(|| format!("log_file has no file name: {}", log_file.display()))?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory: {}", directory.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();

    Ok(Some(guard))
}

/// Run the server until SIGINT or SIGTERM.
async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = JsonCredentialStore::open(&config.accounts.path).with_context(|| {
        format!(
            "Failed to open account store: {}",
            config.accounts.path.display()
        )
    })?;
    tracing::info!(accounts = store.len(), "Account store ready");

    let server = Arc::new(WhirlServer::new(config, Arc::new(store)));
    let listener = server.bind().await?;

    let mut serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    tokio::select! {
        result = wait_for_shutdown_signal() => result?,
        result = &mut serving => {
            // The accept loop only returns on its own after a failure.
            return result.context("Server task panicked")?;
        }
    }

    server.shutdown().await;
    serving.await.context("Server task panicked")??;

    tracing::info!("whirlnet stopped");
    Ok(())
}

/// Create an account from the command line.
fn register_offline(config: &Config, username: &str) -> anyhow::Result<()> {
    eprint!("password for {username}: ");
    std::io::stderr().flush()?;

    let mut password = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut password)
        .context("Failed to read password from stdin")?;
    let password = password.trim_end_matches(['\r', '\n']);

    if let Some(problem) = signup_problem(username, password) {
        anyhow::bail!("{problem}");
    }

    let store = JsonCredentialStore::open(&config.accounts.path)?;
    store.register(username, password)?;
    println!(
        "Registered {username} in {}",
        config.accounts.path.display()
    );
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Received Ctrl+C");
    Ok(())
}
