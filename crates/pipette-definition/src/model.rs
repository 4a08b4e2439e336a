use serde::{Deserialize, Serialize};

use pipette_types::Parameters;

use crate::loader::Format;

/// Declarative description of one chain element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage type identifier, resolved against the registry's namespaces.
    /// `None` selects the built-in shell stage.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub stage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub default_parameters: Parameters,
    /// Any other keys of the chain entry, kept for diagnostics.
    #[serde(flatten)]
    pub extra: Parameters,
}

impl StageSpec {
    pub fn new(stage_type: impl Into<String>) -> Self {
        Self {
            stage_type: Some(stage_type.into()),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.default_parameters.insert(key.into(), value);
        self
    }
}

/// The parsed form of a pipeline definition file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub chain: Vec<StageSpec>,
    pub pipe_parameters: Parameters,
    /// Wire format of the definition; stages exchange data in the same format.
    pub format: Format,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, chain: Vec<StageSpec>) -> Self {
        Self {
            name: name.into(),
            chain,
            pipe_parameters: Parameters::new(),
            format: Format::default(),
        }
    }

    pub fn with_pipe_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.pipe_parameters.insert(key.into(), value);
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

/// Shape of the definition file content before the file-derived name is attached.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDefinition {
    pub chain: Vec<StageSpec>,
    #[serde(default)]
    pub pipe_parameters: Parameters,
}
