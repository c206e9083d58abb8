//! Модуль кэша аудио
//!
//! Кэш хранит аудио по сессии, этапу обработки и имени файла. Хранилище
//! подключаемое: сервису нужен только трейт `AudioCache`.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::config::ServiceConfig;
use crate::error::{Result, SvcError};

/// Этап обработки, к которому относится файл в кэше
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStage {
    /// Вход после препроцессинга, его читает конвертация
    Preprocessed,
    /// Результат конвертации
    Output,
}

impl CacheStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocessed => "preprocessed",
            Self::Output => "output",
        }
    }
}

/// Хранилище аудио, общее для всех архитектур
pub trait AudioCache: Send + Sync {
    /// Прочитать файл `name` этапа `stage`
    fn read(&self, stage: CacheStage, session: Option<&str>, name: &str) -> Result<Vec<u8>>;

    /// Записать файл `name` этапа `stage`
    fn write(&self, stage: CacheStage, session: Option<&str>, name: &str, audio: &[u8]) -> Result<()>;
}

/// Кэш в файловой системе: <root>/<session>/<stage>/<name><extension>
#[derive(Debug, Clone)]
pub struct FileAudioCache {
    root: PathBuf,
    extension: String,
}

impl FileAudioCache {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.cache_dir, config.cache_extension.clone())
    }

    /// Путь к файлу в кэше
    pub fn path_for(&self, stage: CacheStage, session: Option<&str>, name: &str) -> PathBuf {
        let mut dir = self.root.clone();
        if let Some(session) = session {
            dir.push(session);
        }
        dir.push(stage.as_str());
        dir.join(format!("{}{}", name, self.extension))
    }
}

impl AudioCache for FileAudioCache {
    fn read(&self, stage: CacheStage, session: Option<&str>, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(stage, session, name);
        fs::read(&path).map_err(|e| SvcError::Cache(format!("cannot read {}: {}", path.display(), e)))
    }

    fn write(&self, stage: CacheStage, session: Option<&str>, name: &str, audio: &[u8]) -> Result<()> {
        let path = self.path_for(stage, session, name);
        let dir = path
            .parent()
            .ok_or_else(|| SvcError::Cache(format!("invalid cache path {}", path.display())))?;
        fs::create_dir_all(dir)?;

        // Пишем во временный файл рядом и переименовываем, чтобы читатели не видели половину файла
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(audio)?;
        tmp.persist(&path)
            .map_err(|e| SvcError::Cache(format!("cannot write {}: {}", path.display(), e.error)))?;

        log::debug!("Cached {} bytes at {}", audio.len(), path.display());
        Ok(())
    }
}
