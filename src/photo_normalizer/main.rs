mod application;
mod domain;
mod infrastructure;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::normalizer_service::NormalizerService;
use crate::infrastructure::axum_handler::{router, AppState};
use crate::infrastructure::config::Config;
use crate::infrastructure::image_processor::DefaultImageProcessor;
use crate::infrastructure::memory_store::InMemoryDocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photo_normalizer=debug,info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState {
        normalizer: Arc::new(NormalizerService::new(Arc::new(DefaultImageProcessor::new()))),
        store: Arc::new(InMemoryDocumentStore::new()),
        post_budget: config.post_budget,
        avatar_budget: config.avatar_budget,
        shutdown: shutdown.clone(),
    });

    info!(
        addr = %config.bind_addr,
        max_bytes = config.post_budget.max_bytes(),
        post_max_dimension = config.post_budget.max_dimension_px(),
        avatar_max_dimension = config.avatar_budget.max_dimension_px(),
        "photo normalizer listening"
    );

    // サーバーの開始
    axum::Server::bind(&config.bind_addr)
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down, cancelling in-flight normalizations");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
