//! Поиск файлов модели персонажа в хранилище моделей
//!
//! Папка персонажа должна содержать ровно один `G_*` (веса) и `config.json`,
//! по желанию `speaker.json` и один `kmeans*` (кластерная модель).

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::variant::{select_variant_from_value, InferenceVariant};
use crate::config::ServiceConfig;
use crate::error::{Result, SvcError};
use crate::request::SynthesisOptions;
use crate::utils::fs::files_with_prefix;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const SPEAKER_FILE_NAME: &str = "speaker.json";
pub const WEIGHTS_PREFIX: &str = "G_";
pub const CLUSTER_MODEL_PREFIX: &str = "kmeans";

/// Все, что нужно знать о модели для вызова внешней программы
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub weights_path: PathBuf,
    pub config_path: PathBuf,
    /// Ключ спикера из секции `spk` config.json
    pub speaker: String,
    /// Смешивание с кластерной моделью, только при Character Likeness > 0
    pub cluster: Option<ClusterBlend>,
    pub variant: InferenceVariant,
}

/// Кластерная модель и доля ее влияния
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBlend {
    pub model_path: PathBuf,
    /// Character Likeness, строго больше нуля
    pub ratio: f64,
}

/// Хранилище моделей одной архитектуры
#[derive(Debug, Clone)]
pub struct ModelStore {
    characters_dir: PathBuf,
}

impl ModelStore {
    pub fn new(characters_dir: impl Into<PathBuf>) -> Self {
        Self {
            characters_dir: characters_dir.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config
                .models_dir
                .join(&config.architecture_name)
                .join("characters"),
        )
    }

    /// Папка персонажа, ошибка если ее нет
    pub fn character_dir(&self, character: &str) -> Result<PathBuf> {
        let dir = self.characters_dir.join(character);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(SvcError::ModelNotFound(dir))
        }
    }

    /// Пути к весам и config.json
    pub fn resolve_model(&self, character: &str) -> Result<(PathBuf, PathBuf)> {
        let dir = self.character_dir(character)?;
        let weights = single_file(&dir, WEIGHTS_PREFIX, SvcError::WeightsMissing, SvcError::WeightsAmbiguous)?;
        let config = config_path(&dir)?;
        Ok((weights, config))
    }

    /// Ключ спикера: единственный из config.json либо выбранный в speaker.json
    pub fn resolve_speaker(&self, character: &str) -> Result<String> {
        let dir = self.character_dir(character)?;
        let config_path = config_path(&dir)?;
        let config = read_json(&config_path)?;
        speaker_key(&dir, &config_path, &config)
    }

    /// Путь к кластерной модели kmeans*
    pub fn resolve_cluster_model(&self, character: &str) -> Result<PathBuf> {
        let dir = self.character_dir(character)?;
        single_file(
            &dir,
            CLUSTER_MODEL_PREFIX,
            SvcError::ClusterModelMissing,
            SvcError::ClusterModelAmbiguous,
        )
    }

    /// Разрешить модель целиком под конкретные параметры синтеза.
    ///
    /// config.json читается один раз и используется и для спикера, и для выбора ветки.
    pub fn resolve(&self, options: &SynthesisOptions) -> Result<ResolvedModel> {
        let character = options.character.as_str();
        let (weights_path, config_path) = self.resolve_model(character)?;
        let config = read_json(&config_path)?;

        let variant = select_variant_from_value(&config_path, &config)?;
        let dir = self.character_dir(character)?;
        let speaker = speaker_key(&dir, &config_path, &config)?;

        let cluster = if options.character_likeness > 0.0 {
            Some(ClusterBlend {
                model_path: self.resolve_cluster_model(character)?,
                ratio: options.character_likeness,
            })
        } else {
            None
        };

        log::info!(
            "Resolved model for {}: weights={}, speaker={}, variant={}, cluster={}",
            character,
            weights_path.display(),
            speaker,
            variant.as_str(),
            cluster
                .as_ref()
                .map(|c| c.model_path.display().to_string())
                .unwrap_or_else(|| "none".to_string()),
        );

        Ok(ResolvedModel {
            weights_path,
            config_path,
            speaker,
            cluster,
            variant,
        })
    }
}

fn config_path(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.is_file() {
        Ok(path)
    } else {
        Err(SvcError::ConfigMissing(dir.to_path_buf()))
    }
}

fn single_file(
    dir: &Path,
    prefix: &str,
    missing: fn(PathBuf) -> SvcError,
    ambiguous: fn(PathBuf) -> SvcError,
) -> Result<PathBuf> {
    let mut found = files_with_prefix(dir, prefix)?;
    match found.len() {
        0 => Err(missing(dir.to_path_buf())),
        1 => Ok(found.remove(0)),
        _ => Err(ambiguous(dir.to_path_buf())),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| SvcError::InvalidModelConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn speaker_key(dir: &Path, config_path: &Path, config: &Value) -> Result<String> {
    let speakers: &Map<String, Value> = config
        .get("spk")
        .and_then(Value::as_object)
        .ok_or_else(|| SvcError::InvalidModelConfig {
            path: config_path.to_path_buf(),
            reason: "missing \"spk\" section".to_string(),
        })?;

    if speakers.len() == 1 {
        if let Some(key) = speakers.keys().next() {
            return Ok(key.clone());
        }
    }

    let selected = selected_speaker(dir)?;
    if speakers.contains_key(&selected) {
        Ok(selected)
    } else {
        Err(SvcError::SpeakerKeyUnknown {
            key: selected,
            available: speakers.keys().cloned().collect(),
        })
    }
}

/// Прочитать {"speaker": "<name>"} из speaker.json
fn selected_speaker(dir: &Path) -> Result<String> {
    let path = dir.join(SPEAKER_FILE_NAME);
    if !path.is_file() {
        return Err(SvcError::SpeakerSelectorMissing(dir.to_path_buf()));
    }

    let selector = read_json(&path)?;
    selector
        .get("speaker")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SvcError::InvalidModelConfig {
            path,
            reason: "expected {\"speaker\": <desired speaker name>}".to_string(),
        })
}
