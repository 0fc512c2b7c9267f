//! Template API Server - HTTP host for the annotation editor
//!
//! Provides REST endpoints for:
//! - Creating templates and attaching source PDFs
//! - Click-to-place annotations and the edit flow
//! - Overlay markers for the current viewport
//! - Exporting the annotated PDF, optionally saving a copy

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use annotate_core::ExportOptions;
use axum::{
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod handlers;
mod models;
mod state;
mod storage;
#[cfg(test)]
mod tests;

use state::AppState;

/// Command-line arguments for the template API server
#[derive(Parser, Debug)]
#[command(name = "template-api")]
#[command(about = "HTTP host for the PDF template annotation editor")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory holding uploaded and exported files
    #[arg(long, env = "STORAGE_DIR", default_value = "./data/files")]
    storage_dir: PathBuf,

    /// SQLite database for file and template metadata
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./data/templates.db?mode=rwc"
    )]
    database_url: String,

    /// Base URL stored files are served from (defaults to this server's /files)
    #[arg(long, env = "PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Remote hosts source documents may be fetched from (comma-separated)
    #[arg(long, env = "FETCH_ALLOWED_HOSTS", value_delimiter = ',')]
    fetch_allowed_hosts: Vec<String>,

    /// Font family used when an annotation names none
    #[arg(long, env = "DEFAULT_FONT_FAMILY")]
    default_font_family: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn public_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = if self.host == "0.0.0.0" {
                    "localhost"
                } else {
                    self.host.as_str()
                };
                format!("http://{}:{}/files", host, self.port)
            }
        }
    }

    fn export_options(&self) -> ExportOptions {
        ExportOptions {
            default_font_family: self.default_font_family.clone(),
            ..ExportOptions::default()
        }
    }
}

/// Build the API router. Stored files are served from `files_dir` when given.
pub fn router(state: Arc<AppState>, files_dir: Option<PathBuf>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let mut app = Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Templates
        .route("/api/templates", post(handlers::create_template))
        .route("/api/templates/open", post(handlers::open_template))
        .route("/api/templates/:id", get(handlers::get_template))
        .route(
            "/api/templates/:id/attachment",
            put(handlers::attach_document),
        )
        .route("/api/templates/:id/save", post(handlers::save_template))
        // Editing
        .route("/api/templates/:id/click", post(handlers::click))
        .route("/api/templates/:id/images", post(handlers::add_image))
        .route(
            "/api/templates/:id/annotations/:annotation_id",
            put(handlers::update_annotation).delete(handlers::delete_annotation),
        )
        .route(
            "/api/templates/:id/annotations/:annotation_id/edit",
            get(handlers::open_edit),
        )
        .route("/api/templates/:id/overlay", post(handlers::overlay))
        // Export
        .route("/api/templates/:id/export", post(handlers::export));

    if let Some(dir) = files_dir {
        app = app.nest_service("/files", ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(log_level.into())
                .add_directive("tower_http=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Initializing Template API...");
    let state = AppState::from_config(
        &args.storage_dir,
        &args.public_base_url(),
        &args.fetch_allowed_hosts,
        &args.database_url,
        args.export_options(),
    )
    .await?;
    let app = router(Arc::new(state), Some(args.storage_dir.clone()));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting Template API on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
