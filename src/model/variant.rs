//! Выбор ветки so-vits-svc по содержимому config.json

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::ServiceConfig;
use crate::error::{Result, SvcError};

/// Ключ в секции `data`, который появляется только у моделей, обученных на ветке 4.1
pub const STABLE_4_1_MARKER: &str = "contentvec_final_proj";

/// Ветка внешней программы инференса
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceVariant {
    /// so-vits-svc 4.0
    V4_0,
    /// so-vits-svc 4.1-Stable
    V4_1Stable,
}

impl InferenceVariant {
    /// Парсер аргументов 4.1-Stable требует явное значение даже у флагов
    pub fn flags_take_values(&self) -> bool {
        matches!(self, InferenceVariant::V4_1Stable)
    }

    /// Скрипт inference_main.py соответствующей ветки
    pub fn script_path(&self, config: &ServiceConfig) -> PathBuf {
        match self {
            InferenceVariant::V4_0 => config.inference_script.clone(),
            InferenceVariant::V4_1Stable => config.inference_script_4_1_stable.clone(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceVariant::V4_0 => "4.0",
            InferenceVariant::V4_1Stable => "4.1-Stable",
        }
    }
}

/// Определить ветку по файлу конфигурации модели
pub fn select_variant(config_path: &Path) -> Result<InferenceVariant> {
    let json = fs::read_to_string(config_path)?;
    let value: Value = serde_json::from_str(&json).map_err(|e| SvcError::InvalidModelConfig {
        path: config_path.to_path_buf(),
        reason: e.to_string(),
    })?;
    select_variant_from_value(config_path, &value)
}

/// То же, что `select_variant`, для уже разобранного config.json
pub fn select_variant_from_value(config_path: &Path, config: &Value) -> Result<InferenceVariant> {
    let data = config
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| SvcError::InvalidModelConfig {
            path: config_path.to_path_buf(),
            reason: "missing \"data\" section".to_string(),
        })?;

    if data.contains_key(STABLE_4_1_MARKER) {
        Ok(InferenceVariant::V4_1Stable)
    } else {
        Ok(InferenceVariant::V4_0)
    }
}
