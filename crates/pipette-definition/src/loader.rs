use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use pipette_types::{Parameters, PipetteError, Result};

use crate::model::{PipelineDefinition, RawDefinition};

/// Required file name suffix of JSON definitions.
pub const JSON_SUFFIX: &str = "Pipe.json";
/// Required file name suffix of YAML definitions.
pub const YAML_SUFFIX: &str = ".pipe";

/// Structured-text format shared by definition files and stage streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl Format {
    /// Detect the format from a definition file name and return it together
    /// with the pipeline name (the file name without its suffix).
    pub fn from_definition_filename(file_name: &str) -> Option<(Format, &str)> {
        [(JSON_SUFFIX, Format::Json), (YAML_SUFFIX, Format::Yaml)]
            .into_iter()
            .find_map(|(suffix, format)| {
                file_name
                    .strip_suffix(suffix)
                    .filter(|name| !name.is_empty())
                    .map(|name| (format, name))
            })
    }

    /// Decode `text` into a parameter mapping.
    ///
    /// Blank text and a null document decode to `None`. Anything that is not a
    /// mapping is an error.
    pub fn decode(self, text: &str) -> std::result::Result<Option<Parameters>, String> {
        let value: serde_json::Value = match self {
            Format::Json => {
                let stripped = strip_comments(text);
                if stripped.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&stripped).map_err(|e| e.to_string())?
            }
            Format::Yaml => {
                if text.trim().is_empty() {
                    return Ok(None);
                }
                serde_yaml::from_str(text).map_err(|e| e.to_string())?
            }
        };

        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Object(map) => Ok(Some(map.into_iter().collect())),
            other => Err(format!("expected a mapping, got {}", kind_of(&other))),
        }
    }

    /// Encode a parameter mapping. The result always ends with a newline.
    pub fn encode(self, data: &Parameters) -> Result<String> {
        match self {
            Format::Json => {
                let mut text = serde_json::to_string_pretty(data)?;
                text.push('\n');
                Ok(text)
            }
            Format::Yaml => Ok(serde_yaml::to_string(data)?),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("json"),
            Format::Yaml => f.write_str("yaml"),
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            other => Err(format!("unknown format '{other}' (expected json or yaml)")),
        }
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a sequence",
        serde_json::Value::Object(_) => "a mapping",
    }
}

/// Strip `//` line comments and `/* */` block comments, leaving string
/// literals untouched. Newlines inside block comments are kept so that parser
/// line numbers still match the source.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
            }
            '"' => {
                out.push('"');
                while let Some(next) = chars.next() {
                    out.push(next);
                    match next {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Definition loading
// ---------------------------------------------------------------------------

impl PipelineDefinition {
    /// Load a definition file.
    ///
    /// The file name must end with [`JSON_SUFFIX`] or [`YAML_SUFFIX`]; this is
    /// checked before the file is opened.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let (format, name) = Format::from_definition_filename(file_name).ok_or_else(|| {
            PipetteError::DefinitionFormat {
                source_name: path.display().to_string(),
                message: format!(
                    "wrong pipe description filename '{file_name}': expected a name ending with '{JSON_SUFFIX}' or '{YAML_SUFFIX}'"
                ),
            }
        })?;

        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), %format, "Loading pipeline definition");
        parse_definition(&path.display().to_string(), name, &text, format)
    }

    /// Parse definition content that was not read from a file.
    pub fn parse(name: &str, text: &str, format: Format) -> Result<Self> {
        parse_definition(name, name, text, format)
    }
}

fn parse_definition(
    source_name: &str,
    name: &str,
    text: &str,
    format: Format,
) -> Result<PipelineDefinition> {
    let format_error = |message: String| PipetteError::DefinitionFormat {
        source_name: source_name.to_string(),
        message,
    };

    let content = format
        .decode(text)
        .map_err(|e| format_error(format!("cannot be parsed as {format}: {e}")))?
        .ok_or_else(|| format_error("definition is empty".into()))?;

    let raw: RawDefinition =
        serde_json::from_value(serde_json::Value::Object(content.into_iter().collect()))
            .map_err(|e| format_error(e.to_string()))?;

    Ok(PipelineDefinition {
        name: name.to_string(),
        chain: raw.chain,
        pipe_parameters: raw.pipe_parameters,
        format,
    })
}
