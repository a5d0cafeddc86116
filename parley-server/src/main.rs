mod chat;
mod config;
mod error;
mod history;
mod providers;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use chat::ChatService;
use config::Config;
use history::HistoryStore;
use providers::{OllamaBackend, OpenAiBackend};
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config = Config::from_env();

    let openai = OpenAiBackend::new(config.openai_api_key.clone(), config.openai_model.clone());
    if openai.is_configured() {
        info!("OpenAI provider ready (default model {})", config.openai_model);
    }

    let ollama = OllamaBackend::new(
        &config.ollama_base_url,
        &config.ollama_model,
        config.ollama_timeout,
    );
    info!(
        "Ollama provider at {} (default model {}, timeout {:?})",
        config.ollama_base_url, config.ollama_model, config.ollama_timeout
    );
    let local_models = ollama.models();

    let history = Arc::new(HistoryStore::new());
    let chat = ChatService::new(
        history,
        Arc::new(openai),
        Arc::new(ollama),
        config.history_warn_turns,
    );

    let state = Arc::new(AppState { chat, local_models });
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
