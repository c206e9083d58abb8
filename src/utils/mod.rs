//! Вспомогательные модули

pub mod fs;
