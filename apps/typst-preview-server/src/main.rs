//! Typst Preview Server
//!
//! Serves a small browser editor and compiles what is typed into it to PDF
//! with the `typst` command-line compiler. Endpoints:
//!
//! - `GET /` - the editor (static files)
//! - `POST /compile` - editor content (and optional image) to PDF
//! - `POST /api/upload` - stage an image, return its metadata
//! - `GET /health` - liveness
//!
//! ## Working files
//!
//! Every compile writes `input.typst` and reads `output.pdf` in the work
//! directory. Compiles are serialized, so concurrent requests queue rather
//! than overwrite each other's files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod compiler;
mod error;
mod form;
mod state;
mod uploads;

use api::{handle_compile, handle_health, handle_upload};
use state::{AppState, ServerConfig};

/// Command-line arguments for the preview server
#[derive(Parser, Debug)]
#[command(name = "typst-preview-server")]
#[command(about = "Live Typst preview server backed by the typst CLI")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Typst compiler executable
    #[arg(long, env = "TYPST_BIN", default_value = "typst")]
    typst_bin: PathBuf,

    /// Directory holding input.typst and output.pdf
    #[arg(long, env = "WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Directory uploaded images are staged in
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory with the editor's static files
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Compiler timeout in milliseconds
    #[arg(long, env = "COMPILE_TIMEOUT_MS", default_value = "30000")]
    timeout_ms: u64,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "16777216")]
    max_upload_bytes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            typst_bin: args.typst_bin,
            work_dir: args.work_dir,
            upload_dir: args.upload_dir,
            static_dir: args.static_dir,
            timeout_ms: args.timeout_ms,
            max_upload_bytes: args.max_upload_bytes,
        }
    }
}

/// Build the router for the given state
pub fn app(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Compilation
        .route("/compile", post(handle_compile))
        .route("/api/upload", post(handle_upload))
        // Editor page and assets
        .fallback_service(static_files)
        // Apply middleware
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
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

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    info!("Initializing Typst preview server...");
    let state = Arc::new(AppState::new(ServerConfig::from(args)).await?);
    info!("Serving static files from {}", state.static_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
