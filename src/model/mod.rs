//! Модели персонажей: поиск файлов и выбор ветки программы инференса

pub mod resolver;
pub mod variant;

pub use resolver::{ClusterBlend, ModelStore, ResolvedModel};
pub use variant::{select_variant, InferenceVariant};
