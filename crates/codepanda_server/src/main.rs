//! CodePanda Server - HTTP API for Socratic hints

mod handlers;
mod types;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codepanda::{EngineConfig, HintEngine, TemplateStyle};
use handlers::{router, AppState};

/// CodePanda Server - hints for student code from a local model
#[derive(Parser, Debug)]
#[command(name = "codepanda-server")]
#[command(about = "Serve CodePanda hints over HTTP")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Path to the GGUF model file served by the backend
    #[arg(short = 'M', long, default_value = "deepseek-coder-6.7b-instruct.Q4_K_S.gguf")]
    model_path: PathBuf,

    /// Model name sent to the backend (defaults to the model file stem)
    #[arg(short, long)]
    model: Option<String>,

    /// Backend completion URL (llama.cpp server or Ollama)
    #[arg(short = 'u', long, default_value = "http://localhost:8080/v1")]
    backend_url: String,

    /// Backend API key (optional, uses OPENAI_API_KEY env var if not provided)
    #[arg(short = 'k', long)]
    backend_key: Option<String>,

    /// Template style: persona, rules or xml
    #[arg(short, long, default_value = "xml")]
    style: TemplateStyle,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Resolve API key from args or environment
    let backend_key = args.backend_key.or_else(|| std::env::var("OPENAI_API_KEY").ok());

    let mut config = EngineConfig::new(&args.model_path)
        .with_base_url(&args.backend_url)
        .with_style(args.style);
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(key) = backend_key {
        config = config.with_api_key(key);
    }

    // The engine owns a tokio runtime of its own, so build it off the async workers
    let engine = tokio::task::spawn_blocking(move || HintEngine::new(config))
        .await
        .map_err(std::io::Error::other)?;
    if let Err(e) = &engine {
        tracing::warn!("Hint engine unavailable, serving degraded: {}", e);
    }

    let state = Arc::new(AppState::new(engine, args.model_path.clone()));

    // CORS configuration for browser clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("CodePanda Server starting on {}", addr);
    tracing::info!("Model: {}", args.model_path.display());
    tracing::info!("Backend URL: {}", args.backend_url);
    tracing::info!("Template style: {}", args.style);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
