//! Выбор GPU для дочернего процесса и сведения о видеокартах
//!
//! Переменная CUDA_VISIBLE_DEVICES выставляется только в окружении дочернего
//! процесса, окружение сервера не меняется.

use std::path::PathBuf;

use serde::Serialize;
use tokio::process::Command;

use crate::error::Result;

pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";

/// Какое устройство отдать внешней программе
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuSelection {
    /// Пустая строка в запросе: только CPU
    Cpu,
    /// Индекс видеокарты
    Device(u32),
}

impl GpuSelection {
    /// Значение для CUDA_VISIBLE_DEVICES
    pub fn visible_devices(&self) -> String {
        match self {
            GpuSelection::Cpu => String::new(),
            GpuSelection::Device(index) => index.to_string(),
        }
    }

    pub fn apply(&self, command: &mut Command) {
        command.env(CUDA_VISIBLE_DEVICES, self.visible_devices());
    }
}

/// Описание одной видеокарты для /gpu-info
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GpuInfo {
    pub index: u32,
    pub name: String,
    pub memory_total_mib: u64,
    pub memory_used_mib: u64,
}

fn find_nvidia_smi() -> Option<PathBuf> {
    which::which("nvidia-smi").ok()
}

/// Получить список видеокарт через nvidia-smi
///
/// Без nvidia-smi возвращается пустой список.
pub async fn query_gpus() -> Result<Vec<GpuInfo>> {
    let Some(nvidia_smi) = find_nvidia_smi() else {
        log::debug!("nvidia-smi not found in PATH, reporting no GPUs");
        return Ok(Vec::new());
    };

    let output = Command::new(&nvidia_smi)
        .arg("--query-gpu=index,name,memory.total,memory.used")
        .arg("--format=csv,noheader,nounits")
        .output()
        .await?;

    if !output.status.success() {
        log::warn!("nvidia-smi exited with status {}", output.status);
        return Ok(Vec::new());
    }

    Ok(parse_nvidia_smi_csv(&String::from_utf8_lossy(&output.stdout)))
}

/// Разбор вывода nvidia-smi в формате csv,noheader,nounits
pub fn parse_nvidia_smi_csv(text: &str) -> Vec<GpuInfo> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return None;
            }
            Some(GpuInfo {
                index: fields[0].parse().ok()?,
                name: fields[1].to_string(),
                memory_total_mib: fields[2].parse().ok()?,
                memory_used_mib: fields[3].parse().ok()?,
            })
        })
        .collect()
}
