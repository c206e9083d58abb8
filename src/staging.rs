//! Подготовка файлов для внешней программы и уборка после нее
//!
//! Внешняя программа читает вход из фиксированной папки raw и пишет результат в
//! фиксированную папку results. Эти папки общие для всего процесса, поэтому
//! доступ к ним выдается через `StagingGuard`: он держит блокировку на время
//! одной конвертации и очищает обе папки при уничтожении.

use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, MutexGuard};

use crate::cache::{AudioCache, CacheStage};
use crate::config::ServiceConfig;
use crate::error::{Result, SvcError};
use crate::utils::fs::{describe_dir, list_entries, remove_files};

/// Пара папок raw/results внешней программы
#[derive(Debug)]
pub struct StagingArea {
    raw_dir: PathBuf,
    results_dir: PathBuf,
    extension: String,
    lock: Mutex<()>,
}

impl StagingArea {
    pub fn new(raw_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            results_dir: results_dir.into(),
            extension: extension.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.raw_dir, &config.results_dir, config.cache_extension.clone())
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Содержимое папок raw и results для сообщения об ошибке
    pub fn diagnostics(&self) -> String {
        format!("{}\n{}", describe_dir(&self.raw_dir), describe_dir(&self.results_dir))
    }

    /// Дождаться своей очереди и получить папки в единоличное пользование
    pub async fn acquire(&self) -> Result<StagingGuard<'_>> {
        let lock = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.raw_dir).await?;
        tokio::fs::create_dir_all(&self.results_dir).await?;
        Ok(StagingGuard { area: self, _lock: lock })
    }
}

/// Доступ к папкам raw/results на время одной конвертации
pub struct StagingGuard<'a> {
    area: &'a StagingArea,
    _lock: MutexGuard<'a, ()>,
}

impl StagingGuard<'_> {
    /// Скопировать входное аудио из кэша в папку raw
    pub async fn stage_input(
        &self,
        cache: &dyn AudioCache,
        session: Option<&str>,
        reference: &str,
    ) -> Result<PathBuf> {
        let target = self
            .area
            .raw_dir
            .join(format!("{}{}", reference, self.area.extension));

        let copied = match cache.read(CacheStage::Preprocessed, session, reference) {
            Ok(audio) => tokio::fs::write(&target, audio).await.map_err(SvcError::from),
            Err(e) => Err(e),
        };

        copied.map_err(|e| SvcError::StagingFailed {
            target: target.clone(),
            source: Box::new(e),
        })?;

        log::info!("Staged input audio at {}", target.display());
        Ok(target)
    }

    /// Прочитать единственный файл из папки results
    pub async fn collect_output(&self) -> Result<Vec<u8>> {
        let results_dir = &self.area.results_dir;
        let mut outputs = list_entries(results_dir)?;

        match outputs.len() {
            0 => Err(SvcError::NoOutputProduced(results_dir.clone())),
            1 => {
                let output = outputs.remove(0);
                log::info!("Collected output {}", output.display());
                Ok(tokio::fs::read(output).await?)
            }
            count => {
                log::error!("Found {} files in {}, cleaning up", count, results_dir.display());
                let cleaned = match self.cleanup() {
                    Ok(()) => true,
                    Err(e) => {
                        log::error!("Cleanup of staging directories failed: {}", e);
                        false
                    }
                };
                Err(SvcError::AmbiguousOutput {
                    dir: results_dir.clone(),
                    cleaned,
                })
            }
        }
    }

    /// Переложить результат в кэш выходных файлов
    pub async fn forward_output(
        &self,
        cache: &dyn AudioCache,
        session: Option<&str>,
        output_name: &str,
    ) -> Result<()> {
        let audio = self.collect_output().await?;
        cache.write(CacheStage::Output, session, output_name, &audio)
    }

    /// Все временные файлы: сначала results, затем raw
    pub fn temp_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = list_entries(&self.area.results_dir)?;
        files.extend(list_entries(&self.area.raw_dir)?);
        Ok(files)
    }

    /// Удалить все файлы из raw и results
    pub fn cleanup(&self) -> Result<()> {
        remove_files(&self.temp_files()?)
    }

    /// Содержимое папок для сообщения об ошибке
    pub fn diagnostics(&self) -> String {
        self.area.diagnostics()
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::warn!("Failed to clean staging directories: {}", e);
        }
    }
}
