//! ProjectHub assistant server
//!
//! Serves the FAQ chatbot used by the ProjectHub sidebar widget and landing
//! page over a small JSON API.

use std::net::SocketAddr;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use projecthub_assistant::config::{Config, KnowledgeBase};
use projecthub_assistant::{routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "projecthub_assistant=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let knowledge = KnowledgeBase::load(config.knowledge_path.as_deref())?;
    tracing::info!(
        "📚 Loaded {} FAQ entries and {} scripted topics",
        knowledge.faq.len(),
        knowledge.topics.len()
    );

    let state = AppState::new(config, knowledge);

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("💬 ProjectHub assistant running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
