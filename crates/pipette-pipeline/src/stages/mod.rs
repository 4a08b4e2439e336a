//! Built-in stage implementations.

pub mod shell;

pub use shell::ShellStage;
