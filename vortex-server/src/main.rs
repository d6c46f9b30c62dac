use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use vortex_core::VectorDb;

mod config;
mod embedding;
mod error;
mod replication;
mod routes;

use config::ServerConfig;
use embedding::{EmbeddingProvider, HashEmbedder};
use routes::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Arc::new(ServerConfig::from_env());
    let embedder = Arc::new(HashEmbedder::new(config.embedding_dimension));
    let state = AppState {
        db: Arc::new(VectorDb::new()),
        embedder: embedder.clone(),
        config: config.clone(),
    };

    let app = routes::router(state);

    tracing::info!(
        embedding_dimension = embedder.dimension(),
        replication_poll_interval_secs = config.replication_poll_interval.as_secs(),
        "listening on {}",
        config.bind_addr
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
