//! Pipeline execution engine, stage contract, registry, and validation.
//!
//! This crate implements the core pipette runner: stage resolution through a
//! namespace-grouped registry, stream wiring with in-memory buffers between
//! stages, parameter merging, sequential execution, the built-in shell stage,
//! execution events, and the 5 built-in lint rules.

pub mod buffer;
pub mod engine;
pub mod events;
pub mod registry;
pub mod stage;
pub mod stages;
pub mod validation;
pub mod wiring;

pub use buffer::Buffer;
pub use engine::{Pipe, PipeStreams};
pub use events::{EventEmitter, PipelineEvent};
pub use registry::{
    default_registry, default_registry_with_environment, StageFactory, StageRegistry,
    DEFAULT_NAMESPACE, DEFAULT_STAGE_TYPE, SHELL_STAGE_ALIASES,
};
pub use stage::{flush_streams, parse_input, produce_output, InputSource, Stage, StageInstance, StageStreams};
pub use stages::ShellStage;
pub use validation::{has_errors, validate, validate_in, Diagnostic, LintRule, Severity, ValidationContext};
pub use wiring::{Endpoint, StageWiring};
