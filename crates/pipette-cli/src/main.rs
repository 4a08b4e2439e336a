//! CLI binary for running and validating pipette pipelines.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use pipette_definition::{Format, PipelineDefinition};
use pipette_exec::{LocalExecutionEnvironment, DEFAULT_SHELL};
use pipette_pipeline::{
    default_registry_with_environment, validate_in, InputSource, Pipe, PipeStreams, Severity,
    ValidationContext, DEFAULT_NAMESPACE, DEFAULT_STAGE_TYPE,
};

#[derive(Parser)]
#[command(name = "pipette", version, about = "Declarative pipelines of chained shell stages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// How stage types are resolved and where shell stages run.
#[derive(Args)]
struct ResolveArgs {
    /// Namespace to search stage types in; repeat to search several, in order
    #[arg(short, long = "namespace", default_value = DEFAULT_NAMESPACE)]
    namespaces: Vec<String>,

    /// Working directory for shell stages (default: current directory)
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Shell used to run bash_command
    #[arg(long, default_value = DEFAULT_SHELL)]
    shell: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline definition (NamePipe.json or name.pipe)
    Run {
        /// Path to the pipeline definition file
        pipeline: PathBuf,

        #[command(flatten)]
        resolve: ResolveArgs,

        /// Wire format stages exchange (default: the definition's format)
        #[arg(long)]
        format: Option<Format>,

        /// Read the first stage's input from this file instead of stdin
        #[arg(short, long, conflicts_with = "params")]
        input: Option<PathBuf>,

        /// Inline input for the first stage, in the wire format
        #[arg(short, long)]
        params: Option<String>,

        /// Write the last stage's output to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write stage error output to this file instead of stderr
        #[arg(short, long)]
        error: Option<PathBuf>,

        /// Write pipeline events as JSON lines to this file
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Validate a pipeline definition file
    Validate {
        /// Path to the pipeline definition file
        pipeline: PathBuf,

        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// Show information about a pipeline
    Info {
        /// Path to the pipeline definition file
        pipeline: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries pipeline output, so logs go to stderr
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            pipeline,
            resolve,
            format,
            input,
            params,
            output,
            error,
            events,
        } => {
            let streams = RunStreams {
                input,
                params,
                output,
                error,
            };
            cmd_run(&pipeline, &resolve, format, streams, events.as_deref())?;
        }
        Commands::Validate { pipeline, resolve } => {
            cmd_validate(&pipeline, &resolve)?;
        }
        Commands::Info { pipeline } => {
            cmd_info(&pipeline)?;
        }
    }

    Ok(())
}

/// Stream overrides for `pipette run`.
struct RunStreams {
    input: Option<PathBuf>,
    params: Option<String>,
    output: Option<PathBuf>,
    error: Option<PathBuf>,
}

impl RunStreams {
    /// Open the configured streams. A second handle on the `--error` file is
    /// returned so a fatal error can be reported there after the run.
    fn open(self) -> anyhow::Result<(PipeStreams<'static>, Option<File>)> {
        let mut streams = PipeStreams::standard();
        let mut error_sink = None;
        if let Some(text) = self.params {
            streams = streams.with_input(InputSource::Inline(text));
        } else if let Some(path) = self.input {
            streams = streams.with_input(InputSource::reader(File::open(path)?));
        }
        if let Some(path) = self.output {
            streams = streams.with_output(File::create(path)?);
        }
        if let Some(path) = self.error {
            let file = File::create(path)?;
            error_sink = Some(file.try_clone()?);
            streams = streams.with_error(file);
        }
        Ok((streams, error_sink))
    }
}

fn working_dir(resolve: &ResolveArgs) -> anyhow::Result<PathBuf> {
    Ok(match &resolve.workdir {
        Some(dir) => std::fs::canonicalize(dir)?,
        None => std::env::current_dir()?,
    })
}

fn build_pipe(path: &Path, resolve: &ResolveArgs) -> anyhow::Result<Pipe> {
    let definition = PipelineDefinition::from_file(path)?;
    let env = LocalExecutionEnvironment::new(working_dir(resolve)?).with_shell(&resolve.shell);
    let registry = default_registry_with_environment(Arc::new(env));
    Ok(Pipe::new(definition, registry).with_namespaces(resolve.namespaces.iter().cloned()))
}

fn cmd_run(
    path: &Path,
    resolve: &ResolveArgs,
    format: Option<Format>,
    streams: RunStreams,
    events_path: Option<&Path>,
) -> anyhow::Result<()> {
    let mut pipe = build_pipe(path, resolve)?;
    if let Some(format) = format {
        pipe = pipe.with_format(format);
    }
    let events = pipe.subscribe();

    tracing::info!(
        pipeline = %pipe.name(),
        stages = pipe.definition().chain.len(),
        format = %pipe.format(),
        "Running pipeline"
    );
    let (streams, error_sink) = streams.open()?;
    let result = pipe.communicate(streams);

    if let Some(events_path) = events_path {
        let mut writer = BufWriter::new(File::create(events_path)?);
        for event in events.try_iter() {
            serde_json::to_writer(&mut writer, &event)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }

    if let Err(e) = &result {
        match e.stage() {
            Some(stage) => tracing::error!(stage, "Stage aborted the pipeline"),
            None if e.is_definition_error() => {
                tracing::error!("Pipeline rejected before any stage ran")
            }
            None => {}
        }
        if let Some(mut sink) = error_sink {
            if let Err(write_err) = writeln!(sink, "Error: {e}").and_then(|()| sink.flush()) {
                tracing::warn!(error = %write_err, "Could not report the error to the error file");
            }
        }
    }
    result?;
    Ok(())
}

fn cmd_validate(path: &Path, resolve: &ResolveArgs) -> anyhow::Result<()> {
    let pipe = build_pipe(path, resolve)?;
    let diagnostics = validate_in(
        &ValidationContext {
            definition: pipe.definition(),
            registry: pipe.registry(),
            namespaces: pipe.namespaces(),
        },
        &working_dir(resolve)?,
    );

    if diagnostics.is_empty() {
        println!("Pipeline is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        let location = diag
            .stage_index
            .map(|i| format!(" (stage {i})"))
            .unwrap_or_default();
        println!("[{}] {}{}: {}", severity, diag.rule, location, diag.message);
        if let Some(fix) = &diag.fix {
            println!("    fix: {}", fix);
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let definition = PipelineDefinition::from_file(path)?;

    println!("Pipeline: {}", definition.name);
    println!("Format: {}", definition.format);
    println!("Stages: {}", definition.chain.len());

    if !definition.pipe_parameters.is_empty() {
        println!("\nPipe parameters:");
        for (key, value) in &definition.pipe_parameters {
            println!("  {} = {}", key, value);
        }
    }

    println!("\nChain:");
    for (index, spec) in definition.chain.iter().enumerate() {
        let stage_type = spec.stage_type.as_deref().unwrap_or(DEFAULT_STAGE_TYPE);
        let name = spec.name.as_deref().unwrap_or("(default)");
        let keys: Vec<&str> = spec.default_parameters.keys().map(String::as_str).collect();
        println!(
            "  {}. {} type={} defaults=[{}]",
            index,
            name,
            stage_type,
            keys.join(", ")
        );
    }

    Ok(())
}
