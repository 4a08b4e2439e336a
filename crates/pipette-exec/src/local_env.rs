use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use pipette_types::PipetteError;

use crate::environment::{CommandInput, CommandOutput, ExecResult, ExecutionEnvironment};

/// Default shell used to interpret stage commands.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Concrete execution environment that runs commands on the local machine.
pub struct LocalExecutionEnvironment {
    working_dir: PathBuf,
    shell: PathBuf,
}

impl LocalExecutionEnvironment {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }

    pub fn current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Resolve a path relative to the working directory if it is not absolute.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    fn sink(&self, output: &CommandOutput) -> std::io::Result<Stdio> {
        Ok(match output {
            CommandOutput::Capture => Stdio::piped(),
            CommandOutput::File(path) => OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(self.resolve(path))?
                .into(),
        })
    }
}

impl ExecutionEnvironment for LocalExecutionEnvironment {
    fn file_exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn exec_command(
        &self,
        command: &str,
        stdin: CommandInput,
        stdout: CommandOutput,
        stderr: CommandOutput,
    ) -> pipette_types::Result<ExecResult> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command).current_dir(&self.working_dir);

        let inline_input = match stdin {
            CommandInput::Inline(text) if text.is_empty() => {
                cmd.stdin(Stdio::null());
                None
            }
            CommandInput::Inline(text) => {
                cmd.stdin(Stdio::piped());
                Some(text)
            }
            CommandInput::File(path) => {
                cmd.stdin(File::open(self.resolve(&path))?);
                None
            }
        };
        cmd.stdout(self.sink(&stdout)?);
        cmd.stderr(self.sink(&stderr)?);

        tracing::debug!(shell = %self.shell.display(), command = %command, "Spawning command");
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| PipetteError::CommandSpawn {
            command: command.to_string(),
            source,
        })?;

        // Feed inline input from a helper thread so a child that fills its
        // stdout pipe before draining stdin cannot deadlock us.
        let feeder = match (inline_input, child.stdin.take()) {
            (Some(text), Some(mut pipe)) => {
                Some(std::thread::spawn(move || pipe.write_all(text.as_bytes())))
            }
            _ => None,
        };

        let output = child.wait_with_output()?;

        if let Some(handle) = feeder {
            // A child that exits without reading its input closes the pipe early.
            if let Ok(Err(e)) = handle.join() {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    fn shell(&self) -> &Path {
        &self.shell
    }
}
