//! Stage trait, stream bindings, and the per-run stage instance lifecycle.

use std::fmt;
use std::io::{self, Read, Write};

use pipette_definition::{Format, StageSpec};
use pipette_types::{merge_parameters, Parameters, PipetteError, Result};

use crate::wiring::StageWiring;

// ---------------------------------------------------------------------------
// Stage trait
// ---------------------------------------------------------------------------

/// A unit of work in a chain.
///
/// Implementations only provide `run`; reading input and writing output are
/// handled by [`parse_input`] and [`produce_output`].
pub trait Stage: Send + Sync {
    /// The type identifier the stage is known by (e.g. "BashCommand").
    fn type_name(&self) -> &str;

    /// Do the stage's work on the merged parameters and return its results.
    fn run(&self, parameters: &Parameters) -> Result<Parameters>;
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Where a stage reads its input parameters from.
pub enum InputSource<'a> {
    Inline(String),
    Readable(Box<dyn Read + 'a>),
}

impl<'a> InputSource<'a> {
    pub fn empty() -> Self {
        InputSource::Inline(String::new())
    }

    pub fn reader(reader: impl Read + 'a) -> Self {
        InputSource::Readable(Box::new(reader))
    }

    /// Consume the source and return its raw contents.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self {
            InputSource::Inline(text) => Ok(text.into_bytes()),
            InputSource::Readable(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

impl Default for InputSource<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for InputSource<'_> {
    fn from(text: &str) -> Self {
        InputSource::Inline(text.to_string())
    }
}

impl fmt::Debug for InputSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Inline(text) => f.debug_tuple("Inline").field(text).finish(),
            InputSource::Readable(_) => f.write_str("Readable(..)"),
        }
    }
}

/// The three streams a stage is bound to for one execution.
pub struct StageStreams<'s> {
    pub input: InputSource<'s>,
    pub output: &'s mut dyn Write,
    pub error: &'s mut dyn Write,
}

// ---------------------------------------------------------------------------
// Default input/output handling
// ---------------------------------------------------------------------------

/// Read `input` and decode it as a parameter mapping.
///
/// Empty input yields `None`. Content that is not UTF-8 or does not decode to
/// a mapping is a `MalformedInput` error attributed to `stage`; a failed read
/// stays an `Io` error.
pub fn parse_input(stage: &str, input: InputSource<'_>, format: Format) -> Result<Option<Parameters>> {
    let malformed = |message: String| PipetteError::MalformedInput {
        stage: stage.to_string(),
        message,
    };
    let text = String::from_utf8(input.into_bytes()?)
        .map_err(|e| malformed(format!("input is not valid UTF-8: {e}")))?;
    format.decode(&text).map_err(malformed)
}

/// Encode `results` and write them to `output`.
pub fn produce_output(results: &Parameters, format: Format, output: &mut dyn Write) -> Result<()> {
    let text = format.encode(results)?;
    output.write_all(text.as_bytes())?;
    Ok(())
}

/// Flush both streams. The error stream is flushed even if flushing output
/// fails; the first failure is returned.
pub fn flush_streams(output: &mut dyn Write, error: &mut dyn Write) -> Result<()> {
    let out = output.flush();
    let err = error.flush();
    out.and(err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// StageInstance
// ---------------------------------------------------------------------------

/// Runtime embodiment of a [`StageSpec`] for a single pipeline run.
pub struct StageInstance {
    pub parameters: Parameters,
    pub results: Parameters,
    /// The [`StageSpec`] this instance was built from.
    pub description: StageSpec,
    /// Stream bindings, set by the orchestrator before the stage runs.
    pub wiring: Option<StageWiring>,
    label: String,
    format: Format,
    stage: Box<dyn Stage>,
}

impl StageInstance {
    /// Seed the instance from its spec: default parameters are copied and a
    /// `name` parameter is set (explicit stage name, else the lower-cased type
    /// name).
    pub fn new(stage: Box<dyn Stage>, description: StageSpec, format: Format) -> Self {
        let label = description
            .name
            .clone()
            .unwrap_or_else(|| stage.type_name().to_lowercase());
        let mut parameters = description.default_parameters.clone();
        parameters.insert("name".into(), serde_json::Value::String(label.clone()));

        Self {
            parameters,
            results: Parameters::new(),
            description,
            wiring: None,
            label,
            format,
            stage,
        }
    }

    /// The name the stage was instantiated with.
    pub fn name(&self) -> &str {
        &self.label
    }

    pub fn stage_type(&self) -> &str {
        self.stage.type_name()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Apply pipeline-wide overrides on top of the current parameters.
    pub fn merge_parameters(&mut self, overrides: &Parameters) {
        merge_parameters(&mut self.parameters, overrides);
    }

    /// Merge parameters decoded from the input stream, overriding every key
    /// set so far.
    pub fn put_on(&mut self, input: InputSource<'_>) -> Result<()> {
        if let Some(input_parameters) = parse_input(&self.label, input, self.format)? {
            tracing::debug!(
                stage = %self.label,
                keys = ?input_parameters.keys().collect::<Vec<_>>(),
                "Merging input parameters"
            );
            merge_parameters(&mut self.parameters, &input_parameters);
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        self.results = self.stage.run(&self.parameters)?;
        Ok(())
    }

    /// Write the results to `output`, then flush both output and error. The
    /// flush happens even if writing failed.
    pub fn reduce(&mut self, output: &mut dyn Write, error: &mut dyn Write) -> Result<()> {
        let written = produce_output(&self.results, self.format, output);
        let flushed = flush_streams(output, error);
        written.and(flushed)
    }

    /// Full lifecycle: merge pipeline parameters, acquire input, run, produce output.
    pub fn execute(&mut self, pipe_parameters: &Parameters, streams: StageStreams<'_>) -> Result<()> {
        let StageStreams {
            input,
            output,
            error,
        } = streams;
        self.merge_parameters(pipe_parameters);
        self.put_on(input)?;
        self.run()?;
        self.reduce(output, error)
    }
}

impl fmt::Debug for StageInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageInstance")
            .field("name", &self.label)
            .field("stage_type", &self.stage.type_name())
            .field("parameters", &self.parameters)
            .field("results", &self.results)
            .field("wiring", &self.wiring)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
