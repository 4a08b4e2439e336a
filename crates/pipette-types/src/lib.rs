//! Shared types and errors for the pipette pipeline engine.
//!
//! This crate provides the foundational types used across all other pipette crates:
//! - `PipetteError`: unified error taxonomy
//! - `Parameters`: the string-keyed mapping stages read and write
//! - `merge_parameters` / `string_param`: helpers for working with parameter maps

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Unified error type for all pipette subsystems.
#[derive(Debug, thiserror::Error)]
pub enum PipetteError {
    // === Definition Errors ===
    #[error("Invalid pipeline definition '{source_name}': {message}")]
    DefinitionFormat { source_name: String, message: String },

    #[error("Pipeline '{pipeline}' has an empty chain")]
    ChainEmpty { pipeline: String },

    // === Resolution Errors ===
    #[error("Failed to find stage type '{identifier}' in namespaces {namespaces:?}")]
    StageResolution {
        identifier: String,
        namespaces: Vec<String>,
    },

    #[error("Stage type '{identifier}' resolved to '{resolved}', which is not a stage: {reason}")]
    InvalidStageType {
        identifier: String,
        resolved: String,
        reason: String,
    },

    // === Stage Errors ===
    #[error("Stage '{stage}' received malformed input: {message}")]
    MalformedInput { stage: String, message: String },

    #[error("Stage '{stage}' refers to a path that does not exist: {}", .path.display())]
    UnsafePath { stage: String, path: PathBuf },

    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("Failed to spawn `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream wiring failed at stage {index}: {message}")]
    Wiring { index: usize, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PipetteError {
    /// Returns `true` if the error was raised before any stage started running.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            PipetteError::DefinitionFormat { .. }
                | PipetteError::ChainEmpty { .. }
                | PipetteError::StageResolution { .. }
                | PipetteError::InvalidStageType { .. }
        )
    }

    /// The stage an error is attributed to, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipetteError::MalformedInput { stage, .. }
            | PipetteError::UnsafePath { stage, .. }
            | PipetteError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, PipetteError>`.
pub type Result<T> = std::result::Result<T, PipetteError>;

// ---------------------------------------------------------------------------
// Parameters: the mapping every stage reads from and writes to
// ---------------------------------------------------------------------------

/// String-keyed parameter (and result) mapping.
///
/// Ordered so that serialized stage output is deterministic.
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// Overlay `overrides` onto `target`. Keys present in both take the value
/// from `overrides`; keys only in `target` are preserved.
pub fn merge_parameters(target: &mut Parameters, overrides: &Parameters) {
    target.extend(
        overrides
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
}

/// Read a string-valued parameter.
///
/// Returns `Ok(None)` when the key is absent or null, and an error message when
/// the key holds a non-string value.
pub fn string_param<'a>(
    parameters: &'a Parameters,
    key: &str,
) -> std::result::Result<Option<&'a str>, String> {
    match parameters.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(format!("parameter '{key}' must be a string, got {other}")),
    }
}
