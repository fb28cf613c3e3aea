use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use callbook::config::AppConfig;
use callbook::db;
use callbook::handlers;
use callbook::services::ai::ollama::OllamaProvider;
use callbook::services::ai::openai::OpenAiProvider;
use callbook::services::ai::LlmProvider;
use callbook::services::turn::TurnEngine;
use callbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    // Generative turns need a credential (or an explicitly chosen local
    // provider); without one the rule-based engine handles every turn.
    let llm: Option<Box<dyn LlmProvider>> = match config.llm_provider.as_str() {
        "ollama" => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Some(Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.llm_model.clone(),
            )))
        }
        _ if !config.llm_api_key.is_empty() => {
            tracing::info!(
                "using OpenAI-compatible LLM provider (model: {})",
                config.llm_model
            );
            Some(Box::new(OpenAiProvider::new(
                config.llm_api_key.clone(),
                config.llm_base_url.clone(),
                config.llm_model.clone(),
            )))
        }
        _ => {
            tracing::info!("no LLM credential configured, using rule-based dialogue only");
            None
        }
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        turns: TurnEngine::new(llm),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/voice/incoming", post(handlers::webhook::incoming_call))
        .route("/voice/gather", post(handlers::webhook::handle_gather))
        .route(
            "/api/admin/appointments",
            get(handlers::admin::get_appointments),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
