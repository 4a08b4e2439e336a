//! Stream wiring plan for a chain of stages.

use serde::Serialize;

/// What a stage stream is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// The pipeline-level stream supplied by the caller.
    Pipeline,
    /// The inter-stage buffer of edge `n`, connecting stage `n` to stage `n + 1`.
    Buffer(usize),
}

/// Bindings of one stage's input, output, and error streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageWiring {
    pub input: Endpoint,
    pub output: Endpoint,
    pub error: Endpoint,
}

impl StageWiring {
    /// Wiring of the stage at `index` in a chain of `chain_size` stages.
    ///
    /// The first stage reads the pipeline input, the last one writes the
    /// pipeline output, and every stage shares the pipeline error stream.
    pub fn for_position(index: usize, chain_size: usize) -> Self {
        let input = if index == 0 {
            Endpoint::Pipeline
        } else {
            Endpoint::Buffer(index - 1)
        };
        let output = if index + 1 == chain_size {
            Endpoint::Pipeline
        } else {
            Endpoint::Buffer(index)
        };
        Self {
            input,
            output,
            error: Endpoint::Pipeline,
        }
    }
}

/// Wiring for every stage of a chain.
pub fn plan(chain_size: usize) -> Vec<StageWiring> {
    (0..chain_size)
        .map(|index| StageWiring::for_position(index, chain_size))
        .collect()
}
