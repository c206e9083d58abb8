use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::SvcError;
use crate::gpu::{self, GpuInfo};

/// Тело любого ответа /generate
///
/// Сообщение может содержать кавычки и фигурные скобки, поэтому оно кодируется в base64.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn encode(message: &str) -> Self {
        Self {
            message: base64::engine::general_purpose::STANDARD.encode(message.as_bytes()),
        }
    }

    pub fn decode(&self) -> Option<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.message)
            .ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// POST /generate
///
/// Конвертация идет в отдельной задаче и доводится до конца, даже если клиент
/// отключился и axum отменил обработчик.
pub async fn generate(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let task = tokio::spawn(async move { state.converter.handle(&body).await });

    let (status, message) = match task.await {
        Ok(Ok(())) => (StatusCode::OK, String::new()),
        Ok(Err(failure)) if failure.is_client_error() => (StatusCode::BAD_REQUEST, failure.report()),
        Ok(Err(failure)) => (StatusCode::INTERNAL_SERVER_ERROR, failure.report()),
        Err(e) => {
            let error = SvcError::from(e);
            log::error!("{}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    };

    (status, Json(MessageResponse::encode(&message))).into_response()
}

#[derive(Debug, Serialize)]
pub struct GpuInfoResponse {
    pub gpus: Vec<GpuInfo>,
}

/// GET /gpu-info
pub async fn gpu_info() -> Response {
    match gpu::query_gpus().await {
        Ok(gpus) => (StatusCode::OK, Json(GpuInfoResponse { gpus })).into_response(),
        Err(e) => {
            log::error!("Failed to query GPUs: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MessageResponse::encode(&e.to_string())),
            )
                .into_response()
        }
    }
}
