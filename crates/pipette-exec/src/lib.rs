//! Blocking command execution for pipette shell stages.
//!
//! Provides the `ExecutionEnvironment` trait, the `LocalExecutionEnvironment`
//! implementation, and the `CommandInput` / `CommandOutput` stdio bindings a
//! command is run with.

pub mod environment;
pub mod local_env;

pub use environment::{CommandInput, CommandOutput, ExecResult, ExecutionEnvironment};
pub use local_env::{LocalExecutionEnvironment, DEFAULT_SHELL};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_result_creation() {
        let r = ExecResult {
            stdout: "out".into(),
            stderr: "err".into(),
            exit_code: 0,
            duration_ms: 42,
        };
        assert_eq!(r.stdout, "out");
        assert_eq!(r.exit_code, 0);
        assert_eq!(r.duration_ms, 42);
    }

    #[test]
    fn stdio_defaults() {
        assert_eq!(CommandInput::default(), CommandInput::Inline(String::new()));
        assert_eq!(CommandOutput::default(), CommandOutput::Capture);
    }

    #[test]
    fn environment_is_object_safe() {
        let env: Box<dyn ExecutionEnvironment> =
            Box::new(LocalExecutionEnvironment::new(std::env::temp_dir()));
        assert_eq!(env.shell(), std::path::Path::new(DEFAULT_SHELL));
    }
}
