//! Построение командной строки inference_main.py
//!
//! Чистые функции: по разрешенной модели и параметрам синтеза получается
//! вектор аргументов, процесс здесь не запускается.

use std::path::PathBuf;

use crate::config::ServiceConfig;
use crate::gpu::GpuSelection;
use crate::model::ResolvedModel;
use crate::request::{SynthesisOptions, SynthesisRequest};

/// Полностью подготовленный вызов внешней программы
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceCommand {
    /// Интерпретатор Python из виртуального окружения
    pub program: PathBuf,
    /// Путь к скрипту, затем аргументы скрипта
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub gpu: GpuSelection,
}

/// Аргументы скрипта инференса в том порядке, в котором их ожидает argparse
pub fn build_arguments(model: &ResolvedModel, options: &SynthesisOptions, clean_name: &str) -> Vec<String> {
    let explicit_true = model.variant.flags_take_values();
    let mut args = Vec::new();

    let mut push = |name: &str, value: String| {
        args.push(name.to_string());
        args.push(value);
    };

    push("--model_path", model.weights_path.display().to_string());
    push("--config_path", model.config_path.display().to_string());
    push("--clean_names", clean_name.to_string());
    push("--trans", options.pitch_shift.to_string());
    push("--spk_list", model.speaker.clone());

    let flag = |args: &mut Vec<String>, name: &str| {
        args.push(name.to_string());
        if explicit_true {
            args.push("True".to_string());
        }
    };

    if options.predict_pitch {
        flag(&mut args, "--auto_predict_f0");
    }

    // linear_gradient включается тем же условием, что и clip
    if options.slice_length > 0.0 {
        args.push("--clip".to_string());
        args.push(format_float(options.slice_length));
        args.push("--linear_gradient".to_string());
        args.push(format_float(options.crossfade_length));
    }

    // Character Likeness попадает сюда только через ResolvedModel::cluster
    if let Some(cluster) = &model.cluster {
        args.push("--cluster_model_path".to_string());
        args.push(cluster.model_path.display().to_string());
        args.push("--cluster_infer_ratio".to_string());
        args.push(format_float(cluster.ratio));
    }

    if options.reduce_hoarseness {
        flag(&mut args, "--f0_mean_pooling");
    }

    if options.apply_nsf_hifigan {
        flag(&mut args, "--enhance");
    }

    if options.noise_scale != 0.0 {
        // "noice" is the spelling the inference script's argparse expects
        args.push("--noice_scale".to_string());
        args.push(format_float(options.noise_scale));
    }

    args
}

/// Собрать полный вызов: python <script> <arguments>
pub fn build_command(
    config: &ServiceConfig,
    model: &ResolvedModel,
    request: &SynthesisRequest,
) -> InferenceCommand {
    let clean_name = format!("{}{}", request.user_audio, config.cache_extension);

    let mut args = vec![model.variant.script_path(config).display().to_string()];
    args.extend(build_arguments(model, &request.options, &clean_name));

    InferenceCommand {
        program: config.python_executable.clone(),
        args,
        working_dir: config.working_dir.clone(),
        gpu: request.gpu,
    }
}

/// Целые значения печатаются с ".0", как их печатает Python
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
