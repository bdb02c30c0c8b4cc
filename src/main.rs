use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod extract;
mod inference;
mod labels;
mod scoring;
mod web;

use config::AppConfig;
use inference::Classifier;
use labels::LabelMap;
use web::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    info!(?config, "starting rhetoric scorer");

    // -----------------------------
    // Label map + classifier (fatal on failure)
    // -----------------------------
    let label_path = config.label_map_path();
    let labels = Arc::new(
        LabelMap::load(&label_path)
            .with_context(|| format!("loading label map from {}", label_path.display()))?,
    );
    info!(labels = ?labels.all_labels(), "label map loaded");

    let classifier = {
        let model_dir = config.model_dir.clone();
        let labels = labels.clone();
        let opts = config.classifier_options();
        tokio::task::spawn_blocking(move || Classifier::load(&model_dir, labels, opts))
            .await?
            .with_context(|| format!("loading model from {}", config.model_dir.display()))?
    };

    let state = AppState {
        device: classifier.device(),
        predictor: Arc::new(classifier),
        labels,
    };

    // -----------------------------
    // Router
    // -----------------------------
    let app = web::router(state, config.max_upload_bytes);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("🌐 HTTP listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
