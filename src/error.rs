//! Модуль обработки ошибок сервиса
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при обработке запроса
//! на конвертацию голоса.

use std::path::PathBuf;
use thiserror::Error;

/// Ошибки сервиса so-vits-svc
#[derive(Debug, Error)]
pub enum SvcError {
    /// Некорректный запрос клиента (HTTP 400)
    #[error("Bad input:\n{0}")]
    BadInput(String),

    /// Папка персонажа не найдена
    #[error("Character model directory not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Нет config.json
    #[error("Config file not found! Expecting a file with the name config.json in {}", .0.display())]
    ConfigMissing(PathBuf),

    /// Нет файла весов G_*
    #[error("Model file was not found! Expected a file with the name G_<number>.pth in {}", .0.display())]
    WeightsMissing(PathBuf),

    /// Несколько файлов весов G_*
    #[error("Too many model files found! Expected only one file with the name G_<number>.pth in {}", .0.display())]
    WeightsAmbiguous(PathBuf),

    /// В конфиге несколько спикеров, а speaker.json отсутствует
    #[error(
        "speaker.json not found in {}! If config.json has more than one speaker, then you must add a \
         speaker.json file to the character folder which specifies the desired speaker. The contents \
         of speaker.json should be a single entry in the following format: {{\"speaker\": <desired speaker name>}}",
        .0.display()
    )]
    SpeakerSelectorMissing(PathBuf),

    /// Спикер из speaker.json отсутствует в config.json
    #[error("The key \"{key}\", from speaker.json, not found in config.json. Expecting one of: {available:?}")]
    SpeakerKeyUnknown { key: String, available: Vec<String> },

    /// Нет кластерной модели kmeans*
    #[error("Cluster model was not found! Expected a file with the name kmeans_<number>.pt in {}", .0.display())]
    ClusterModelMissing(PathBuf),

    /// Несколько кластерных моделей kmeans*
    #[error("Too many cluster models found! Expected only one file with the name kmeans_<number>.pt in {}", .0.display())]
    ClusterModelAmbiguous(PathBuf),

    /// config.json или speaker.json имеют неожиданную структуру
    #[error("Invalid model configuration {}: {reason}", .path.display())]
    InvalidModelConfig { path: PathBuf, reason: String },

    /// Не удалось скопировать аудио из кэша в папку raw
    #[error("Unable to copy file from the audio cache to the raw directory {}", .target.display())]
    StagingFailed {
        target: PathBuf,
        #[source]
        source: Box<SvcError>,
    },

    /// Внешняя программа не создала выходной файл
    #[error("No output file was produced! Expected file to appear in {}", .0.display())]
    NoOutputProduced(PathBuf),

    /// В папке results больше одного файла
    #[error("More than one file was found in {}! {}", .dir.display(), ambiguous_output_hint(.cleaned))]
    AmbiguousOutput { dir: PathBuf, cleaned: bool },

    /// Ошибка кэша аудио
    #[error("Audio cache error: {0}")]
    Cache(String),

    /// Не удалось запустить внешний процесс
    #[error("Failed to launch inference program {}: {source}", .program.display())]
    ProcessLaunch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Фоновая задача tokio завершилась паникой или была отменена
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn ambiguous_output_hint(cleaned: &bool) -> &'static str {
    if *cleaned {
        "The directory has now been cleaned. Please try generating your output again."
    } else {
        "An attempt was made to clean the directory to correct this situation, but the operation failed."
    }
}

impl SvcError {
    /// Ошибка вызвана клиентом и отдается как 400
    pub fn is_client_error(&self) -> bool {
        matches!(self, SvcError::BadInput(_))
    }

    /// Ошибка поиска артефактов модели
    pub fn is_model_resolution(&self) -> bool {
        matches!(
            self,
            SvcError::ModelNotFound(_)
                | SvcError::ConfigMissing(_)
                | SvcError::WeightsMissing(_)
                | SvcError::WeightsAmbiguous(_)
                | SvcError::SpeakerSelectorMissing(_)
                | SvcError::SpeakerKeyUnknown { .. }
                | SvcError::ClusterModelMissing(_)
                | SvcError::ClusterModelAmbiguous(_)
                | SvcError::InvalidModelConfig { .. }
        )
    }
}

/// Тип Result для сервиса
pub type Result<T> = std::result::Result<T, SvcError>;
