use std::path::{Path, PathBuf};

/// Where a command's standard input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandInput {
    /// Text fed to the command through a pipe. Empty text means no input.
    Inline(String),
    /// An existing file opened for reading.
    File(PathBuf),
}

impl Default for CommandInput {
    fn default() -> Self {
        CommandInput::Inline(String::new())
    }
}

/// Where a command's standard output or error goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CommandOutput {
    /// Captured in memory and returned in [`ExecResult`].
    #[default]
    Capture,
    /// An existing file, truncated and written by the command.
    File(PathBuf),
}

/// Result of executing a shell command.
///
/// `stdout` / `stderr` hold the captured text; they are empty for streams
/// redirected to a file.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Abstraction over the environment shell stages run their commands in.
pub trait ExecutionEnvironment: Send + Sync {
    fn file_exists(&self, path: &Path) -> bool;

    /// Run `command` through the shell with the given stdio bindings and block
    /// until it exits. A non-zero exit code is reported, not raised.
    fn exec_command(
        &self,
        command: &str,
        stdin: CommandInput,
        stdout: CommandOutput,
        stderr: CommandOutput,
    ) -> pipette_types::Result<ExecResult>;

    fn working_directory(&self) -> &Path;
    fn shell(&self) -> &Path;
}
