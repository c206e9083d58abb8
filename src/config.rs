//! Модуль конфигурации сервиса
//!
//! Все пути (модели, кэш, виртуальное окружение, скрипты инференса) выводятся из
//! одного корня, но любой из них можно переопределить через JSON-файл. Поля,
//! которых нет в файле, выводятся из корня, заданного в файле или окружении.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SvcError};

/// Корень по умолчанию
pub const DEFAULT_ROOT_DIR: &str = "/root/hay_say";
/// Имя архитектуры, под которым лежат модели персонажей
pub const ARCHITECTURE_NAME: &str = "so_vits_svc_4";
/// Папка ветки 4.1-Stable
pub const STABLE_4_1_DIR_NAME: &str = "so_vits_svc_4_dot_1_stable";
/// Расширение файлов в кэше аудио
pub const CACHE_EXTENSION: &str = ".flac";
pub const DEFAULT_PORT: u16 = 6576;

/// Переменная окружения с путем к JSON-конфигу
pub const CONFIG_PATH_ENV: &str = "SO_VITS_SVC_CONFIG";
/// Переменная окружения, переопределяющая корень
pub const ROOT_ENV: &str = "HAY_SAY_ROOT";
/// Переменная окружения, переопределяющая порт
pub const PORT_ENV: &str = "SO_VITS_SVC_PORT";

/// Конфигурация сервиса
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Корневая директория установки
    pub root_dir: PathBuf,
    /// Имя архитектуры в хранилище моделей
    pub architecture_name: String,
    /// Хранилище моделей: <models_dir>/<architecture>/characters/<character>
    pub models_dir: PathBuf,
    /// Корень кэша аудио
    pub cache_dir: PathBuf,
    /// Расширение файлов кэша (с точкой)
    pub cache_extension: String,
    /// Python из виртуального окружения so-vits-svc
    pub python_executable: PathBuf,
    /// inference_main.py ветки 4.0
    pub inference_script: PathBuf,
    /// inference_main.py ветки 4.1-Stable
    pub inference_script_4_1_stable: PathBuf,
    /// Папка, из которой внешняя программа читает входные файлы
    pub raw_dir: PathBuf,
    /// Папка, в которую внешняя программа пишет результат
    pub results_dir: PathBuf,
    /// Рабочая директория дочернего процесса
    pub working_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

/// Содержимое JSON-файла конфигурации: каждое поле необязательно
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    root_dir: Option<PathBuf>,
    architecture_name: Option<String>,
    models_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    cache_extension: Option<String>,
    python_executable: Option<PathBuf>,
    inference_script: Option<PathBuf>,
    inference_script_4_1_stable: Option<PathBuf>,
    raw_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

impl ConfigFile {
    /// Наложить заданные поля на конфигурацию, выведенную из корня
    fn into_config(self, fallback_root: PathBuf) -> ServiceConfig {
        let mut config = ServiceConfig::with_root(self.root_dir.unwrap_or(fallback_root));

        if let Some(name) = self.architecture_name {
            config.architecture_name = name;
        }
        if let Some(path) = self.models_dir {
            config.models_dir = path;
        }
        if let Some(path) = self.cache_dir {
            config.cache_dir = path;
        }
        if let Some(extension) = self.cache_extension {
            config.cache_extension = extension;
        }
        if let Some(path) = self.python_executable {
            config.python_executable = path;
        }
        if let Some(path) = self.inference_script {
            config.inference_script = path;
        }
        if let Some(path) = self.inference_script_4_1_stable {
            config.inference_script_4_1_stable = path;
        }
        if let Some(path) = self.raw_dir {
            config.raw_dir = path;
        }
        if let Some(path) = self.results_dir {
            config.results_dir = path;
        }
        if let Some(path) = self.working_dir {
            config.working_dir = path;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::with_root(DEFAULT_ROOT_DIR)
    }
}

impl ServiceConfig {
    /// Построить конфигурацию, в которой все пути выведены из `root`
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let architecture_root = root.join(ARCHITECTURE_NAME);

        Self {
            architecture_name: ARCHITECTURE_NAME.to_string(),
            models_dir: root.join("models"),
            cache_dir: root.join("audio_cache"),
            cache_extension: CACHE_EXTENSION.to_string(),
            python_executable: root
                .join(".venvs")
                .join(ARCHITECTURE_NAME)
                .join("bin")
                .join("python"),
            inference_script: architecture_root.join("inference_main.py"),
            inference_script_4_1_stable: root.join(STABLE_4_1_DIR_NAME).join("inference_main.py"),
            raw_dir: architecture_root.join("raw"),
            results_dir: architecture_root.join("results"),
            working_dir: architecture_root,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            root_dir: root,
        }
    }

    /// Корень архитектуры (папка с кодом so-vits-svc 4.0)
    pub fn architecture_root(&self) -> PathBuf {
        self.root_dir.join(&self.architecture_name)
    }

    /// Папка модели конкретного персонажа
    pub fn character_dir(&self, character: &str) -> PathBuf {
        self.models_dir
            .join(&self.architecture_name)
            .join("characters")
            .join(character)
    }

    /// Адрес для прослушивания
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Загрузить конфигурацию из JSON-файла с корнем по умолчанию
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_root(path, DEFAULT_ROOT_DIR)
    }

    /// Загрузить конфигурацию из JSON-файла.
    ///
    /// `root_dir` из файла важнее `fallback_root`; пути, которых нет в файле,
    /// выводятся из итогового корня.
    pub fn from_file_with_root(path: impl AsRef<Path>, fallback_root: impl Into<PathBuf>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SvcError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let file: ConfigFile = serde_json::from_str(&json)
            .map_err(|e| SvcError::Configuration(format!("cannot parse {}: {}", path.display(), e)))?;
        Ok(file.into_config(fallback_root.into()))
    }

    /// Загрузить конфигурацию с учетом переменных окружения
    pub fn load() -> Result<Self> {
        let root = std::env::var_os(ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT_DIR));

        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => {
                log::info!("Loading configuration from {}", PathBuf::from(&path).display());
                Self::from_file_with_root(path, root)?
            }
            None => Self::with_root(root),
        };

        if let Ok(port) = std::env::var(PORT_ENV) {
            config.port = port
                .parse()
                .map_err(|_| SvcError::Configuration(format!("{} is not a valid port: {}", PORT_ENV, port)))?;
        }

        Ok(config)
    }
}
