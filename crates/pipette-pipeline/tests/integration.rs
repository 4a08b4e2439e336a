//! End-to-end integration tests for the pipette pipeline engine.
//!
//! Each test exercises the full pipeline: load definition -> resolve stages ->
//! run real shell commands -> verify the pipeline output.

use std::io;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use pipette_definition::{Format, PipelineDefinition, StageSpec};
use pipette_exec::LocalExecutionEnvironment;
use pipette_pipeline::{
    default_registry_with_environment, has_errors, InputSource, Pipe, PipeStreams, PipelineEvent,
    Stage, StageRegistry,
};
use pipette_types::{Parameters, PipetteError, Result};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Upper-cases the `output` parameter of the previous stage.
struct Upper;

impl Stage for Upper {
    fn type_name(&self) -> &str {
        "Upper"
    }

    fn run(&self, parameters: &Parameters) -> Result<Parameters> {
        let text = parameters
            .get("output")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut results = Parameters::new();
        results.insert("shout".into(), json!(text.to_uppercase()));
        Ok(results)
    }
}

/// Registry with the built-in stages running in `dir`, plus test stages.
fn registry(dir: &TempDir) -> StageRegistry {
    let env = LocalExecutionEnvironment::new(dir.path());
    let mut reg = default_registry_with_environment(Arc::new(env));
    reg.register("pipette.text", "Upper", || Upper);
    reg
}

fn write_definition(dir: &TempDir, file_name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(file_name);
    std::fs::write(&path, content).expect("write definition");
    path
}

/// Run `pipe` with `input` and return the decoded pipeline output.
fn communicate(pipe: &mut Pipe, input: &str) -> Result<Parameters> {
    let mut output = Vec::new();
    pipe.communicate(PipeStreams::new(InputSource::from(input), &mut output, io::sink()))?;
    let text = String::from_utf8(output).expect("utf-8 output");
    Ok(pipe.format().decode(&text).expect("decodable output").unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn echo_stage_round_trip() {
    let dir = TempDir::new().unwrap();
    let definition = PipelineDefinition::new(
        "foo",
        vec![StageSpec::new("BuiltinEcho").with_default("bash_command", json!("echo hello"))],
    );
    let mut pipe = Pipe::new(definition, registry(&dir));

    let results = communicate(&mut pipe, "").unwrap();
    assert_eq!(results.get("output"), Some(&json!("hello\n")));
    assert_eq!(results.get("error"), Some(&json!("")));
    assert_eq!(results.get("name"), Some(&json!("bashcommand")));
}

#[test]
fn json_definition_file_with_comments() {
    let dir = TempDir::new().unwrap();
    let path = write_definition(
        &dir,
        "greetPipe.json",
        r#"{
            // shared by every stage
            "pipe_parameters": {"command_input": "from pipe"},
            "chain": [
                /* reads its stdin */
                {"type": "BashCommand", "default_parameters": {"bash_command": "cat"}}
            ]
        }"#,
    );
    let definition = PipelineDefinition::from_file(&path).unwrap();
    assert_eq!(definition.name, "greet");

    let mut pipe = Pipe::new(definition, registry(&dir));
    let results = communicate(&mut pipe, "").unwrap();
    assert_eq!(results.get("output"), Some(&json!("from pipe")));
}

#[test]
fn stage_input_overrides_pipe_parameters() {
    let dir = TempDir::new().unwrap();
    let definition = PipelineDefinition::new(
        "override",
        vec![StageSpec::new("BashCommand").with_default("bash_command", json!("cat"))],
    )
    .with_pipe_parameter("command_input", json!("from pipe"));
    let mut pipe = Pipe::new(definition, registry(&dir));

    let results = communicate(&mut pipe, r#"{"command_input": "from input"}"#).unwrap();
    assert_eq!(results.get("output"), Some(&json!("from input")));
}

// ---------------------------------------------------------------------------
// Multi-stage chains
// ---------------------------------------------------------------------------

#[test]
fn yaml_definition_chains_shell_into_custom_stage() {
    let dir = TempDir::new().unwrap();
    let path = write_definition(
        &dir,
        "shout.pipe",
        "chain:\n  - type: BashCommand\n    default_parameters:\n      bash_command: printf hello\n  - type: text.Upper\n",
    );
    let definition = PipelineDefinition::from_file(&path).unwrap();
    assert_eq!(definition.name, "shout");
    assert_eq!(definition.format, Format::Yaml);

    let mut pipe = Pipe::new(definition, registry(&dir));
    let results = communicate(&mut pipe, "").unwrap();
    assert_eq!(results.get("shout"), Some(&json!("HELLO")));

    let chain = pipe.chain();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].parameters.get("output"), Some(&json!("hello")));
}

#[test]
fn shell_results_become_next_stage_parameters() {
    let dir = TempDir::new().unwrap();
    let definition = PipelineDefinition::new(
        "pair",
        vec![
            StageSpec::new("BashCommand")
                .named("first")
                .with_default("bash_command", json!("echo one")),
            StageSpec::new("BashCommand")
                .named("second")
                .with_default("bash_command", json!("echo two")),
        ],
    );
    let mut pipe = Pipe::new(definition, registry(&dir));
    let results = communicate(&mut pipe, "").unwrap();

    // The first stage echoes every parameter, so its command reaches the
    // second stage as input and takes precedence over the default.
    assert_eq!(results.get("output"), Some(&json!("one\n")));
    assert_eq!(results.get("name"), Some(&json!("first")));
    assert_eq!(pipe.chain()[1].name(), "second");
}

#[test]
fn events_follow_stage_execution() {
    let dir = TempDir::new().unwrap();
    let definition = PipelineDefinition::new(
        "observed",
        vec![
            StageSpec::new("BashCommand").with_default("bash_command", json!("printf x")),
            StageSpec::new("text.Upper"),
        ],
    );
    let mut pipe = Pipe::new(definition, registry(&dir));
    let events = pipe.subscribe();
    communicate(&mut pipe, "").unwrap();

    let received: Vec<PipelineEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 6);
    assert!(matches!(
        &received[0],
        PipelineEvent::PipelineStarted { stage_count: 2, .. }
    ));
    match &received[3] {
        PipelineEvent::StageStarted { index, stage_type, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(stage_type, "Upper");
        }
        other => panic!("Expected StageStarted, got: {other:?}"),
    }
    assert!(matches!(&received[5], PipelineEvent::PipelineCompleted { .. }));
}

// ---------------------------------------------------------------------------
// Redirection
// ---------------------------------------------------------------------------

#[test]
fn output_redirected_to_existing_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("out.txt"), "").unwrap();
    std::fs::write(dir.path().join("in.txt"), "file input\n").unwrap();
    let definition = PipelineDefinition::new(
        "redirect",
        vec![StageSpec::new("BashCommand")
            .with_default("bash_command", json!("cat"))
            .with_default("input_filepath", json!("in.txt"))
            .with_default("output_filepath", json!("out.txt"))],
    );
    let mut pipe = Pipe::new(definition, registry(&dir));

    let results = communicate(&mut pipe, "").unwrap();
    assert!(!results.contains_key("output"));
    assert_eq!(results.get("error"), Some(&json!("")));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
        "file input\n"
    );
}

#[test]
fn missing_redirect_file_is_unsafe_path() {
    let dir = TempDir::new().unwrap();
    let definition = PipelineDefinition::new(
        "unsafe",
        vec![StageSpec::new("BashCommand")
            .with_default("bash_command", json!("cat"))
            .with_default("input_filepath", json!("missing.txt"))],
    );
    let mut pipe = Pipe::new(definition, registry(&dir));

    match communicate(&mut pipe, "").unwrap_err() {
        PipetteError::UnsafePath { path, .. } => assert_eq!(path, std::path::PathBuf::from("missing.txt")),
        other => panic!("Expected UnsafePath, got: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Failures before execution
// ---------------------------------------------------------------------------

#[test]
fn missing_suffix_rejected_before_parsing() {
    let dir = TempDir::new().unwrap();
    let path = write_definition(&dir, "plain.json", "this is not json at all");

    match PipelineDefinition::from_file(&path).unwrap_err() {
        PipetteError::DefinitionFormat { source_name, .. } => assert!(source_name.contains("plain.json")),
        other => panic!("Expected DefinitionFormat, got: {other:?}"),
    }
}

#[test]
fn empty_chain_file_fails_before_instantiation() {
    let dir = TempDir::new().unwrap();
    let path = write_definition(&dir, "emptyPipe.json", r#"{"chain": []}"#);
    let mut pipe = Pipe::new(PipelineDefinition::from_file(&path).unwrap(), registry(&dir));

    assert!(has_errors(&pipe.validate()));
    match communicate(&mut pipe, "").unwrap_err() {
        PipetteError::ChainEmpty { pipeline } => assert_eq!(pipeline, "empty"),
        other => panic!("Expected ChainEmpty, got: {other:?}"),
    }
}

#[test]
fn unknown_stage_type_names_namespaces() {
    let dir = TempDir::new().unwrap();
    let definition = PipelineDefinition::new("unknown", vec![StageSpec::new("does.not.Exist")]);
    let mut pipe = Pipe::new(definition, registry(&dir)).with_namespaces(["pipette", "contrib"]);

    let err = communicate(&mut pipe, "").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("does.not.Exist"), "{message}");
    assert!(message.contains("contrib"), "{message}");
}

#[test]
fn malformed_stage_input_is_reported() {
    let dir = TempDir::new().unwrap();
    let definition = PipelineDefinition::new(
        "malformed",
        vec![StageSpec::new("BashCommand").with_default("bash_command", json!("true"))],
    );
    let mut pipe = Pipe::new(definition, registry(&dir));
    assert!(matches!(
        communicate(&mut pipe, "[1, 2"),
        Err(PipetteError::MalformedInput { .. })
    ));
}
