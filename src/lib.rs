//! HTTP-сервис конвертации голоса на базе so-vits-svc 4.x
//!
//! Сервис принимает запрос со ссылкой на аудио в кэше, находит модель персонажа,
//! выбирает ветку программы инференса, запускает ее как дочерний процесс и
//! кладет результат обратно в кэш.

pub mod cache;
pub mod config;
pub mod error;
pub mod gpu;
pub mod inference;
pub mod logger;
pub mod model;
pub mod pipeline;
pub mod request;
pub mod server;
pub mod staging;
pub mod utils;

pub use config::ServiceConfig;
pub use error::{Result, SvcError};
pub use pipeline::{ConversionFailure, ConversionStage, Converter};
