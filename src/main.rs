//! Bookshelf - JSON CRUD API for books backed by Cloud Firestore

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookshelf::api::{self, AppState};
use bookshelf::config::Config;
use bookshelf::store::{DocumentStore, FirestoreStore, MemoryStore};

#[derive(Parser)]
#[command(name = "bookshelf")]
#[command(about = "JSON CRUD API for books backed by Cloud Firestore")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Environment file to load before reading configuration
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Do not load an environment file
    #[arg(long, global = true)]
    no_env_file: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep books in memory instead of Firestore
        #[arg(long)]
        in_memory: bool,
    },

    /// Write the effective configuration to a TOML file
    Init {
        /// Destination file
        #[arg(default_value = "bookshelf.toml")]
        path: PathBuf,
    },
}

impl Cli {
    /// Only the server reads secrets from the env file
    fn loads_env_file(&self) -> bool {
        matches!(self.command, Commands::Serve { .. }) && !self.no_env_file
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("bookshelf={},tower_http=debug", log_level).into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    if cli.loads_env_file() {
        load_env_file(&cli.env_file)?;
    }

    // Load config
    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve { port, in_memory } => {
            let port = port.unwrap_or(config.http_port);
            let store = initialize_store(&config, in_memory)?;
            let state = AppState::new(store, config.books.clone());

            let router = api::create_router(state);
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

            tracing::info!("Starting HTTP server on port {}", port);
            println!("Bookshelf server running at http://localhost:{}", port);
            println!("  API:      http://localhost:{}/api/books", port);
            println!("  API Docs: http://localhost:{}/api/docs", port);
            println!("  Health:   http://localhost:{}/health", port);

            axum::serve(listener, router).await?;
        }

        Commands::Init { path } => {
            config.save(&path)?;
            println!("✓ Configuration written to {}", path.display());
        }
    }

    Ok(())
}

fn load_env_file(path: &Path) -> anyhow::Result<()> {
    dotenvy::from_path(path)
        .map_err(|e| anyhow::anyhow!("Error loading {} file: {}", path.display(), e))
}

fn initialize_store(config: &Config, in_memory: bool) -> anyhow::Result<Arc<dyn DocumentStore>> {
    if in_memory {
        tracing::warn!("Using in-memory store; books are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = FirestoreStore::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to create Firestore client: {}", e))?;
    tracing::info!(
        "Using Firestore project {} (collection {})",
        config.firestore.project_id,
        config.books.collection
    );
    Ok(Arc::new(store))
}
