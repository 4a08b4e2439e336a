//! Pipeline orchestrator: builds a fresh chain per run, wires stage streams,
//! and executes the stages strictly in declaration order.

use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

use pipette_definition::{Format, PipelineDefinition};
use pipette_types::{PipetteError, Result};

use crate::buffer::Buffer;
use crate::events::{EventEmitter, PipelineEvent};
use crate::registry::{default_registry, StageRegistry, DEFAULT_NAMESPACE};
use crate::stage::{InputSource, StageInstance, StageStreams};
use crate::validation::{validate, Diagnostic, ValidationContext};
use crate::wiring::{Endpoint, StageWiring};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The pipeline-level streams a run reads from and writes to.
pub struct PipeStreams<'a> {
    pub input: InputSource<'a>,
    pub output: Box<dyn Write + 'a>,
    pub error: Box<dyn Write + 'a>,
}

impl<'a> PipeStreams<'a> {
    pub fn new(input: InputSource<'a>, output: impl Write + 'a, error: impl Write + 'a) -> Self {
        Self {
            input,
            output: Box::new(output),
            error: Box::new(error),
        }
    }

    /// The process's stdin, stdout and stderr.
    pub fn standard() -> PipeStreams<'static> {
        PipeStreams {
            input: InputSource::reader(io::stdin()),
            output: Box::new(io::stdout()),
            error: Box::new(io::stderr()),
        }
    }

    pub fn with_input<'b>(self, input: InputSource<'b>) -> PipeStreams<'b>
    where
        'a: 'b,
    {
        PipeStreams {
            input,
            output: self.output,
            error: self.error,
        }
    }

    pub fn with_output<'b>(self, output: impl Write + 'b) -> PipeStreams<'b>
    where
        'a: 'b,
    {
        PipeStreams {
            input: self.input,
            output: Box::new(output),
            error: self.error,
        }
    }

    pub fn with_error<'b>(self, error: impl Write + 'b) -> PipeStreams<'b>
    where
        'a: 'b,
    {
        PipeStreams {
            input: self.input,
            output: self.output,
            error: Box::new(error),
        }
    }
}

/// A pipeline bound to its definition and the registry its stage types are
/// resolved from.
pub struct Pipe {
    definition: PipelineDefinition,
    registry: StageRegistry,
    namespaces: Vec<String>,
    format: Format,
    chain: Vec<StageInstance>,
    events: EventEmitter,
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

impl Pipe {
    pub fn new(definition: PipelineDefinition, registry: StageRegistry) -> Self {
        let format = definition.format;
        Self {
            definition,
            registry,
            namespaces: vec![DEFAULT_NAMESPACE.to_string()],
            format,
            chain: Vec::new(),
            events: EventEmitter::new(),
        }
    }

    /// Pipe over the built-in stages, running commands in the current directory.
    pub fn with_default_registry(definition: PipelineDefinition) -> Result<Self> {
        Ok(Self::new(definition, default_registry()?))
    }

    /// Load a definition file and bind it to the built-in stages.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::with_default_registry(PipelineDefinition::from_file(path)?)
    }

    /// Replace the namespaces stage types are searched in, in priority order.
    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Override the wire format stages read and write.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Stage instances of the most recent run, including a failed one.
    pub fn chain(&self) -> &[StageInstance] {
        &self.chain
    }

    pub fn subscribe(&mut self) -> std::sync::mpsc::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Build a fresh, wired stage instance for every chain entry.
    ///
    /// Fails before resolving anything if the chain is empty, and on the
    /// first entry whose type cannot be resolved.
    pub fn instantiate(&self) -> Result<Vec<StageInstance>> {
        if self.definition.chain.is_empty() {
            return Err(PipetteError::ChainEmpty {
                pipeline: self.definition.name.clone(),
            });
        }

        let chain_size = self.definition.chain.len();
        self.definition
            .chain
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let mut stage = self.registry.instantiate(spec, &self.namespaces, self.format)?;
                stage.wiring = Some(StageWiring::for_position(index, chain_size));
                Ok(stage)
            })
            .collect()
    }

    /// Advisory lint diagnostics for the bound definition.
    pub fn validate(&self) -> Vec<Diagnostic> {
        validate(&ValidationContext {
            definition: &self.definition,
            registry: &self.registry,
            namespaces: &self.namespaces,
        })
    }

    /// Run the pipeline on the process's standard streams.
    pub fn run(&mut self) -> Result<()> {
        self.communicate(PipeStreams::standard())
    }

    /// Run the pipeline once against the given streams.
    pub fn communicate(&mut self, streams: PipeStreams<'_>) -> Result<()> {
        let start = Instant::now();
        tracing::info!(pipeline = %self.definition.name, "Pipeline started");

        match self.execute_chain(streams) {
            Ok(()) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::info!(pipeline = %self.definition.name, duration_ms, "Pipeline completed");
                self.events.emit(PipelineEvent::PipelineCompleted {
                    pipeline_name: self.definition.name.clone(),
                    completed_stages: self.chain.iter().map(|s| s.name().to_string()).collect(),
                    duration_ms,
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(pipeline = %self.definition.name, error = %e, "Pipeline failed");
                self.events.emit(PipelineEvent::PipelineFailed {
                    pipeline_name: self.definition.name.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn execute_chain(&mut self, streams: PipeStreams<'_>) -> Result<()> {
        self.chain.clear();
        self.chain = self.instantiate()?;

        let chain_size = self.chain.len();
        self.events.emit(PipelineEvent::PipelineStarted {
            pipeline_name: self.definition.name.clone(),
            stage_count: chain_size,
        });

        let PipeStreams {
            input,
            mut output,
            mut error,
        } = streams;
        let mut pipe_input = Some(input);
        let mut handoff: Option<Buffer> = None;

        for index in 0..chain_size {
            let stage = &mut self.chain[index];
            let wiring = stage
                .wiring
                .unwrap_or_else(|| StageWiring::for_position(index, chain_size));
            tracing::debug!(stage = %stage.name(), index, ?wiring, "Wiring stage");

            let stage_input = match wiring.input {
                Endpoint::Pipeline => pipe_input.take().ok_or_else(|| PipetteError::Wiring {
                    index,
                    message: "pipeline input was already consumed".into(),
                })?,
                Endpoint::Buffer(_) => {
                    let mut buffer = handoff.take().ok_or_else(|| PipetteError::Wiring {
                        index,
                        message: "no buffer was produced by the previous stage".into(),
                    })?;
                    buffer.rewind_to_start();
                    InputSource::reader(buffer)
                }
            };

            self.events.emit(PipelineEvent::StageStarted {
                index,
                stage: stage.name().to_string(),
                stage_type: stage.stage_type().to_string(),
            });
            tracing::info!(stage = %stage.name(), stage_type = %stage.stage_type(), index, "Executing stage");
            let stage_start = Instant::now();

            let outcome = match wiring.output {
                Endpoint::Pipeline => stage.execute(
                    &self.definition.pipe_parameters,
                    StageStreams {
                        input: stage_input,
                        output: &mut *output,
                        error: &mut *error,
                    },
                ),
                Endpoint::Buffer(_) => {
                    let mut buffer = Buffer::new();
                    let outcome = stage.execute(
                        &self.definition.pipe_parameters,
                        StageStreams {
                            input: stage_input,
                            output: &mut buffer,
                            error: &mut *error,
                        },
                    );
                    handoff = Some(buffer);
                    outcome
                }
            };

            if let Err(e) = outcome {
                self.events.emit(PipelineEvent::StageFailed {
                    index,
                    stage: stage.name().to_string(),
                    error: e.to_string(),
                });
                return Err(e);
            }

            let duration_ms = stage_start.elapsed().as_millis() as u64;
            tracing::debug!(stage = %stage.name(), duration_ms, "Stage completed");
            self.events.emit(PipelineEvent::StageCompleted {
                index,
                stage: stage.name().to_string(),
                duration_ms,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
