//! Запуск внешней программы инференса
//!
//! Код возврата и вывод программы не анализируются: об успехе судят только по
//! появлению выходного файла в папке results.
//!
//! Если ожидание отменено, дочерний процесс убивается: иначе он продолжил бы
//! писать в папку results после того, как ее получил следующий запрос.

use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

use super::arguments::InferenceCommand;
use crate::error::{Result, SvcError};

/// Внешний исполнитель инференса
#[async_trait::async_trait]
pub trait InferenceRunner: Send + Sync {
    /// Выполнить команду и дождаться завершения
    async fn run(&self, command: &InferenceCommand) -> Result<()>;
}

/// Исполнитель, запускающий настоящий дочерний процесс
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn prepare(command: &InferenceCommand) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command.gpu.apply(&mut cmd);
        cmd
    }
}

#[async_trait::async_trait]
impl InferenceRunner for ProcessRunner {
    async fn run(&self, command: &InferenceCommand) -> Result<()> {
        log::info!(
            "Running {} {} (CUDA_VISIBLE_DEVICES={:?})",
            command.program.display(),
            command.args.join(" "),
            command.gpu.visible_devices()
        );

        for (index, arg) in command.args.iter().enumerate() {
            log::debug!("argv[{}] = {}", index + 1, arg);
        }

        let mut child = Self::prepare(command)
            .spawn()
            .map_err(|source| SvcError::ProcessLaunch {
                program: command.program.clone(),
                source,
            })?;

        let status = child.wait().await?;
        log_exit_status(status);
        Ok(())
    }
}

fn log_exit_status(status: ExitStatus) {
    if status.success() {
        log::info!("Inference program finished: {}", status);
    } else {
        log::warn!("Inference program exited with {}", status);
    }
}
