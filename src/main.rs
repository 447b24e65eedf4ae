//! rota server binary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rota::config::Config;
use rota::http::AppState;
use rota::store::{Database, Store};

#[derive(Parser)]
#[command(name = "rota", version, about = "Employee shift-scheduling service")]
struct Cli {
    /// Path to a TOML config file; environment variables otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server (default)
    Serve,
    /// Create or update the database schema
    Migrate,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

async fn serve(config: Config) -> Result<()> {
    let config = Arc::new(config);

    if let Err(e) = rota::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without");
    }

    let db = Arc::new(
        Database::connect(&config.database)
            .await
            .context("database connection failed")?,
    );
    db.migrate().await.context("schema migration failed")?;

    let store = Store::postgres(db.clone());
    let cache = rota::cache::init(&config.cache).await;
    let broadcaster = rota::broadcast::init(&config.broadcast);
    let solver_pool = rota::solver::pool::init(&config.solver);

    let state = AppState::new(
        config.clone(),
        store,
        Some(db),
        Some(cache),
        broadcaster,
        solver_pool,
    );

    rota::http::serve(state, shutdown_signal())
        .await
        .context("server failed")?;

    rota::solver::pool::shutdown();
    rota::broadcast::shutdown();
    rota::cache::shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("invalid configuration")?;
    init_tracing(&config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let db = Database::connect(&config.database)
                .await
                .context("database connection failed")?;
            db.migrate().await.context("schema migration failed")?;
            println!("Schema up to date");
            Ok(())
        }
        Command::CheckConfig => {
            println!("Configuration OK");
            println!(
                "  bind: {}\n  environment: {:?}\n  db pool: {}\n  solver workers: {}",
                config.server.bind_address,
                config.server.environment,
                config.database.pool_size,
                config.solver.workers,
            );
            Ok(())
        }
    }
}
