//! Repodex server — curated GitHub repository directory.
//!
//! Serves the JSON API for the public catalog and the admin back office,
//! and runs background description enrichment.

mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tokio::net::TcpListener;
use tracing::info;

use repodex_core::auth;
use repodex_core::{CatalogService, EnrichmentCoordinator};
use repodex_shared::{load_config, load_config_from};
use repodex_storage::Storage;

/// Repodex — a curated directory of GitHub repositories.
#[derive(Parser)]
#[command(
    name = "repodex",
    version,
    about = "Serve a curated, categorized directory of GitHub repositories.",
    long_about = None,
)]
struct Cli {
    /// Path to a config file (defaults to ~/.repodex/repodex.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Database file path (overrides the config file).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "repodex=info",
        1 => "repodex=debug",
        _ => "repodex=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.database.path));
    let storage = Arc::new(Storage::open(&db_path).await?);

    let (username, password) = config.bootstrap_credentials();
    auth::bootstrap_admin(&storage, &username, &password).await?;

    let jwt_secret = config.jwt_secret()?;
    let enrichment = Arc::new(EnrichmentCoordinator::new(Arc::clone(&storage))?);
    let catalog = CatalogService::new(
        Arc::clone(&storage),
        Arc::clone(&enrichment),
        config.server.card_base_url.clone(),
    );

    let state = Arc::new(api::AppState {
        catalog,
        storage,
        enrichment,
        jwt_secret,
        token_ttl_minutes: config.auth.token_ttl_minutes,
        public_url: config.server.public_url.trim_end_matches('/').to_string(),
    });

    let port = cli.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{port}", config.server.bind)
        .parse()
        .map_err(|e| eyre!("invalid bind address: {e}"))?;

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, db = %db_path.display(), "repodex listening");
    axum::serve(listener, api::router(state)).await?;
    Ok(())
}
