use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use pipette_exec::{CommandInput, CommandOutput, ExecutionEnvironment};
use pipette_types::{string_param, Parameters, PipetteError, Result};

use crate::stage::Stage;

// ---------------------------------------------------------------------------
// ShellStage: runs `bash_command` through the environment's shell
// ---------------------------------------------------------------------------

/// Parameters:
/// - `bash_command` (required): command line handed to the shell.
/// - `input_filepath`: file used as stdin, else `command_input` text.
/// - `output_filepath` / `error_filepath`: files receiving stdout / stderr,
///   else the text is captured into `output` / `error` results.
///
/// Redirect files must already exist. Results echo every parameter.
pub struct ShellStage {
    env: Arc<dyn ExecutionEnvironment>,
}

impl ShellStage {
    pub const TYPE_NAME: &'static str = "BashCommand";

    pub fn new(env: Arc<dyn ExecutionEnvironment>) -> Self {
        Self { env }
    }

    /// Look up an optional redirect path and make sure it exists.
    fn existing_path(&self, stage: &str, parameters: &Parameters, key: &str) -> Result<Option<PathBuf>> {
        let Some(raw) = string_param(parameters, key).map_err(|message| failed(stage, message))? else {
            return Ok(None);
        };
        let path = PathBuf::from(raw);
        if !self.env.file_exists(&path) {
            return Err(PipetteError::UnsafePath {
                stage: stage.to_string(),
                path,
            });
        }
        Ok(Some(path))
    }
}

fn failed(stage: &str, message: String) -> PipetteError {
    PipetteError::StageFailed {
        stage: stage.to_string(),
        message,
    }
}

impl Stage for ShellStage {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn run(&self, parameters: &Parameters) -> Result<Parameters> {
        let stage = parameters
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(Self::TYPE_NAME);

        let command = string_param(parameters, "bash_command")
            .map_err(|message| failed(stage, message))?
            .ok_or_else(|| failed(stage, "Missing bash_command parameter".into()))?;

        let stdin = match self.existing_path(stage, parameters, "input_filepath")? {
            Some(path) => CommandInput::File(path),
            None => CommandInput::Inline(
                string_param(parameters, "command_input")
                    .map_err(|message| failed(stage, message))?
                    .unwrap_or_default()
                    .to_string(),
            ),
        };
        let stdout = self
            .existing_path(stage, parameters, "output_filepath")?
            .map_or(CommandOutput::Capture, CommandOutput::File);
        let stderr = self
            .existing_path(stage, parameters, "error_filepath")?
            .map_or(CommandOutput::Capture, CommandOutput::File);

        let capture_stdout = stdout == CommandOutput::Capture;
        let capture_stderr = stderr == CommandOutput::Capture;

        tracing::info!(stage, command, "Executing shell command");
        let result = self.env.exec_command(command, stdin, stdout, stderr)?;

        if result.exit_code != 0 {
            tracing::warn!(
                stage,
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "Shell command exited with non-zero status"
            );
        } else {
            tracing::debug!(stage, duration_ms = result.duration_ms, "Shell command finished");
        }

        let mut results = parameters.clone();
        if capture_stdout {
            results.insert("output".into(), Value::String(result.stdout));
        }
        if capture_stderr {
            results.insert("error".into(), Value::String(result.stderr));
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
