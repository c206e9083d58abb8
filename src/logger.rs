//! Настройка логирования
//!
//! Без RUST_LOG сервис пишет info, а модуль inference пишет debug: в логе
//! оказывается каждый аргумент командной строки внешней программы.

use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Фильтр по умолчанию, переопределяется через RUST_LOG
pub const DEFAULT_FILTER: &str = "warn,so_vits_svc_server=info,so_vits_svc_server::inference=debug";

pub fn init_logger() {
    builder(Env::default().filter_or("RUST_LOG", DEFAULT_FILTER)).init();
}

fn builder(env: Env) -> Builder {
    let mut builder = Builder::from_env(env);

    // Подавляем шумные модули HTTP-стека
    builder
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("tower", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error)
        .filter_module("axum", LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);
    builder
}
