//! Pipeline definition model and loader for pipette pipelines.
//!
//! A definition is a JSON (`*Pipe.json`) or YAML (`*.pipe`) mapping with a
//! required `chain` of stage specs and optional `pipe_parameters`. The
//! pipeline name is the file name with its suffix stripped.
//!
//! # Example
//! ```
//! use pipette_definition::{Format, PipelineDefinition};
//!
//! let text = r#"{"chain": [{"default_parameters": {"bash_command": "echo hi"}}]}"#;
//! let def = PipelineDefinition::parse("greet", text, Format::Json).unwrap();
//! assert_eq!(def.name, "greet");
//! assert_eq!(def.chain.len(), 1);
//! ```

pub mod loader;
pub mod model;

pub use loader::{strip_comments, Format, JSON_SUFFIX, YAML_SUFFIX};
pub use model::{PipelineDefinition, StageSpec};
