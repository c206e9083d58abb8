//! Обработка одного запроса на конвертацию
//!
//! Validating → Resolving → Staging → Invoking → Collecting → CleaningUp → Responding,
//! из любого шага возможен переход в Failed.

use std::error::Error as _;
use std::fmt;
use std::sync::Arc;

use crate::cache::AudioCache;
use crate::config::ServiceConfig;
use crate::error::SvcError;
use crate::inference::{build_command, InferenceCommand, InferenceRunner};
use crate::model::ModelStore;
use crate::request::{parse_request, SynthesisRequest};
use crate::staging::{StagingArea, StagingGuard};
use crate::utils::fs::describe_dir;

/// Шаг обработки запроса
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Validating,
    Resolving,
    Staging,
    Invoking,
    Collecting,
    CleaningUp,
    Responding,
}

impl ConversionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Resolving => "resolving",
            Self::Staging => "staging",
            Self::Invoking => "invoking",
            Self::Collecting => "collecting",
            Self::CleaningUp => "cleaning up",
            Self::Responding => "responding",
        }
    }
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Переход в состояние Failed
#[derive(Debug)]
pub struct ConversionFailure {
    /// Шаг, на котором произошла ошибка
    pub stage: ConversionStage,
    pub error: SvcError,
    /// Содержимое рабочих папок на момент ошибки
    pub diagnostics: Option<String>,
}

impl ConversionFailure {
    pub fn is_client_error(&self) -> bool {
        self.error.is_client_error()
    }

    /// Текст для клиента: для 400 только ошибка, для 500 еще цепочка причин и
    /// содержимое рабочих папок
    pub fn report(&self) -> String {
        if self.is_client_error() {
            return self.error.to_string();
        }

        let mut report = format!("Conversion failed while {}: {}", self.stage, self.error);
        let mut source = self.error.source();
        while let Some(cause) = source {
            report.push_str(&format!("\nCaused by: {}", cause));
            source = cause.source();
        }
        if let Some(diagnostics) = &self.diagnostics {
            report.push_str("\n\n");
            report.push_str(diagnostics);
        }
        report
    }
}

impl fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

/// Конвейер конвертации: модели, кэш, папки внешней программы и исполнитель
pub struct Converter {
    config: ServiceConfig,
    models: ModelStore,
    cache: Arc<dyn AudioCache>,
    staging: StagingArea,
    runner: Arc<dyn InferenceRunner>,
}

impl Converter {
    pub fn new(config: ServiceConfig, cache: Arc<dyn AudioCache>, runner: Arc<dyn InferenceRunner>) -> Self {
        Self {
            models: ModelStore::from_config(&config),
            staging: StagingArea::from_config(&config),
            config,
            cache,
            runner,
        }
    }

    /// Полный цикл по сырому телу HTTP-запроса
    pub async fn handle(&self, body: &[u8]) -> std::result::Result<(), ConversionFailure> {
        log::debug!("Stage: {}", ConversionStage::Validating);
        let request = parse_request(body).map_err(|error| {
            log::warn!("Rejected request: {}", error);
            ConversionFailure {
                stage: ConversionStage::Validating,
                error,
                diagnostics: None,
            }
        })?;

        self.convert(&request).await?;
        log::debug!("Stage: {}", ConversionStage::Responding);
        Ok(())
    }

    /// Конвертация уже проверенного запроса
    pub async fn convert(&self, request: &SynthesisRequest) -> std::result::Result<(), ConversionFailure> {
        log::info!(
            "Converting {} with character {} into {}",
            request.user_audio,
            request.options.character,
            request.output_file
        );

        log::debug!("Stage: {}", ConversionStage::Resolving);
        let models = self.models.clone();
        let options = request.options.clone();
        let model = tokio::task::spawn_blocking(move || models.resolve(&options))
            .await
            .map_err(SvcError::from)
            .and_then(|resolved| resolved)
            .map_err(|error| {
                let evidence = if error.is_model_resolution() {
                    self.model_evidence(&request.options.character)
                } else {
                    self.staging.diagnostics()
                };
                self.failure(ConversionStage::Resolving, error, evidence)
            })?;
        let command = build_command(&self.config, &model, request);

        log::debug!("Stage: {}", ConversionStage::Staging);
        let guard = self
            .staging
            .acquire()
            .await
            .map_err(|error| self.failure(ConversionStage::Staging, error, self.staging.diagnostics()))?;

        let result = match self.run_staged(&guard, request, &command).await {
            Ok(()) => {
                log::debug!("Stage: {}", ConversionStage::CleaningUp);
                guard.cleanup().map_err(|error| (ConversionStage::CleaningUp, error))
            }
            Err(failed) => Err(failed),
        };

        // Содержимое папок снимается до того, как guard их очистит
        result.map_err(|(stage, error)| self.failure(stage, error, guard.diagnostics()))?;

        log::info!("Conversion of {} finished", request.user_audio);
        Ok(())
    }

    async fn run_staged(
        &self,
        guard: &StagingGuard<'_>,
        request: &SynthesisRequest,
        command: &InferenceCommand,
    ) -> std::result::Result<(), (ConversionStage, SvcError)> {
        let session = request.session_id.as_deref();

        guard
            .stage_input(self.cache.as_ref(), session, &request.user_audio)
            .await
            .map_err(|e| (ConversionStage::Staging, e))?;

        log::debug!("Stage: {}", ConversionStage::Invoking);
        self.runner
            .run(command)
            .await
            .map_err(|e| (ConversionStage::Invoking, e))?;

        log::debug!("Stage: {}", ConversionStage::Collecting);
        guard
            .forward_output(self.cache.as_ref(), session, &request.output_file)
            .await
            .map_err(|e| (ConversionStage::Collecting, e))
    }

    /// Содержимое папки персонажа, а если ее нет, то список всех персонажей
    fn model_evidence(&self, character: &str) -> String {
        let dir = self.config.character_dir(character);
        match dir.parent() {
            Some(characters) if !dir.is_dir() => describe_dir(characters),
            _ => describe_dir(&dir),
        }
    }

    fn failure(&self, stage: ConversionStage, error: SvcError, evidence: String) -> ConversionFailure {
        log::error!("Conversion failed while {}: {}", stage, error);
        let diagnostics = format!("{}\n{}", describe_dir(&self.config.architecture_root()), evidence);
        ConversionFailure {
            stage,
            error,
            diagnostics: Some(diagnostics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_client_report_has_no_diagnostics() {
        let failure = ConversionFailure {
            stage: ConversionStage::Validating,
            error: SvcError::BadInput("Missing \"Character\"".to_string()),
            diagnostics: Some("raw contains: x.flac".to_string()),
        };
        assert!(failure.is_client_error());
        assert!(!failure.report().contains("x.flac"));
    }

    #[test]
    fn test_server_report_includes_causes_and_directories() {
        let failure = ConversionFailure {
            stage: ConversionStage::Staging,
            error: SvcError::StagingFailed {
                target: PathBuf::from("/raw/a.flac"),
                source: Box::new(SvcError::Cache("cannot read /cache/a.flac".to_string())),
            },
            diagnostics: Some("/raw is empty".to_string()),
        };
        let report = failure.report();
        assert!(report.starts_with("Conversion failed while staging"));
        assert!(report.contains("Caused by: Audio cache error: cannot read /cache/a.flac"));
        assert!(report.ends_with("/raw is empty"));
    }
}
