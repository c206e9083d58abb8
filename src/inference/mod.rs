//! Внешняя программа инференса so-vits-svc: аргументы и запуск

pub mod arguments;
pub mod runner;

pub use arguments::{build_arguments, build_command, InferenceCommand};
pub use runner::{InferenceRunner, ProcessRunner};
