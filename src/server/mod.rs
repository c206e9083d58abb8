//! HTTP-слой сервиса: /generate и /gpu-info

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::cache::FileAudioCache;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::inference::ProcessRunner;
use crate::pipeline::Converter;

pub use handlers::MessageResponse;

/// Общее состояние обработчиков
pub struct AppState {
    pub converter: Converter,
}

impl AppState {
    pub fn new(converter: Converter) -> Self {
        Self { converter }
    }

    /// Состояние с файловым кэшем и настоящим дочерним процессом
    pub fn from_config(config: ServiceConfig) -> Self {
        let cache = Arc::new(FileAudioCache::from_config(&config));
        let runner = Arc::new(ProcessRunner::new());
        Self::new(Converter::new(config, cache, runner))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", post(handlers::generate))
        .route("/gpu-info", get(handlers::gpu_info))
        .with_state(state)
}

/// Запустить HTTP-сервер и работать до остановки
pub async fn serve(config: ServiceConfig) -> Result<()> {
    let address = config.bind_address();
    let state = Arc::new(AppState::from_config(config));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    log::info!("Listening on {}", address);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
