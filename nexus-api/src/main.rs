//! CRM Nexus (nexus-api) - REST backend for a renovation business
//!
//! Serves accounts, the enquiry → lead → deal → job pipeline, activities,
//! surveys, documents and reports over HTTP, backed by a single SQLite file
//! under the root folder.

use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::{Parser, Subcommand};
use nexus_common::auth::{create_token, list_tokens, revoke_token};
use nexus_common::config::{load_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig};
use nexus_common::db::init_database;
use nexus_common::EventBus;
use nexus_api::storage::DocumentStore;
use nexus_api::{build_router, listen_addr, AppState};
use sqlx::SqlitePool;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for nexus-api
#[derive(Parser, Debug)]
#[command(name = "nexus-api")]
#[command(about = "CRM Nexus REST service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config.toml)
    #[arg(short, long, env = "NEXUS_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides config.toml)
    #[arg(short, long, env = "NEXUS_BIND")]
    bind: Option<String>,

    /// Root folder holding the database and documents
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Path to config.toml
    #[arg(short, long, env = "NEXUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage API tokens
    #[command(subcommand)]
    Token(TokenCommand),
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Issue a new token; the secret is printed once
    Create {
        /// Label to identify the token later
        #[arg(long)]
        label: String,
    },
    /// List issued tokens
    List,
    /// Revoke a token by id
    Revoke { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_toml_config(args.config.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("nexus_api={0},nexus_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting CRM Nexus (nexus-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(args.root_folder.clone())
        .with_config(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to prepare root folder")?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    if let Some(Command::Token(command)) = args.command {
        return run_token_command(&pool, command).await;
    }

    let documents = DocumentStore::new(initializer.documents_path(), config.max_upload_bytes);
    info!("Documents path: {}", documents.dir().display());

    let state = AppState::new(pool, EventBus::new(256), documents, config.require_auth);
    if !state.require_auth {
        warn!("API authentication disabled (require_auth = false)");
    }

    let app = build_router(state).layer(cors_layer(&config));

    let bind = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let port = args.port.unwrap_or(config.port);
    let addr = listen_addr(&bind, port).with_context(|| format!("Invalid bind address {}", bind))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("nexus-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn run_token_command(pool: &SqlitePool, command: TokenCommand) -> Result<()> {
    match command {
        TokenCommand::Create { label } => {
            let issued = create_token(pool, &label).await?;
            println!("id:    {}", issued.id);
            println!("token: {}", issued.token);
        }
        TokenCommand::List => {
            for token in list_tokens(pool).await? {
                let last_used = token
                    .last_used_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("{}  {:<24} last used {}", token.id, token.label, last_used);
            }
        }
        TokenCommand::Revoke { id } => {
            revoke_token(pool, id).await?;
            println!("revoked {}", id);
        }
    }
    Ok(())
}

fn cors_layer(config: &TomlConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
