//! blockport control server
//!
//! Serves the attachment resolution endpoint, the content save API and the
//! media library's uploaded files.

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blockport::config::BlockportConfig;
use blockport::storage::{ContentStore, JsonContentStore, MediaLibrary};
use blockport::sync::{AssetSyncPipeline, ContentSaveHook};
use blockport_server::{create_routes, AppState};

/// blockport control server
#[derive(Parser)]
#[command(name = "blockport-server")]
struct Args {
    /// Configuration file (default: blockport.toml)
    #[arg(long, env = "BLOCKPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Media library directory (overrides [library].root)
    #[arg(long)]
    library: Option<PathBuf>,

    /// Directory holding stored content documents
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Listen address (overrides [server].bind)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config = BlockportConfig::discover(args.config.as_deref())?;

    let library_root = args
        .library
        .or_else(|| config.library_root())
        .context("No media library configured: pass --library or set [library].root")?;
    let media = MediaLibrary::open(&library_root).map_err(|e| {
        anyhow::anyhow!(
            "Failed to open media library: {}\n\n\
             The server requires an initialized media library.\n\
             Run 'blockport library init <dir> --base-url <public-url>' first.",
            e
        )
    })?;
    info!("Using media library at: {}", library_root.display());

    let pipeline = AssetSyncPipeline::from_config(&config.sync(), Arc::new(media.clone()));
    info!(
        ttl_secs = pipeline.cache().ttl().as_secs(),
        max_concurrent_fetches = config.sync().max_concurrent_fetches(),
        "Import pipeline ready"
    );
    let store: Arc<dyn ContentStore> = Arc::new(JsonContentStore::new(&args.data_dir));
    let server_config = config.server();
    if server_config.edit_token.is_none() {
        tracing::warn!("No [server].edit_token configured; edit endpoints are open");
    }

    let state = Arc::new(AppState {
        assets: Arc::new(media.clone()),
        hook: Arc::new(ContentSaveHook::new(store, Arc::new(pipeline))),
        edit_token: server_config.edit_token.clone(),
    });

    // Build CORS layer for local development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", create_routes(state))
        .nest_service("/uploads", ServeDir::new(media.uploads_dir()))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = args.bind.unwrap_or_else(|| server_config.bind());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
