//! Definition validation: lint rules and diagnostics.
//!
//! Provides 5 built-in rules that check a [`PipelineDefinition`] against the
//! registry it will run with. Diagnostics are advisory; [`has_errors`] tells
//! whether a run is bound to fail.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pipette_definition::{PipelineDefinition, StageSpec};

use crate::registry::{StageRegistry, DEFAULT_STAGE_TYPE};
use crate::stages::ShellStage;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub stage_index: Option<usize>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Everything a rule may look at.
pub struct ValidationContext<'a> {
    pub definition: &'a PipelineDefinition,
    pub registry: &'a StageRegistry,
    pub namespaces: &'a [String],
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const REDIRECT_KEYS: &[&str] = &["input_filepath", "output_filepath", "error_filepath"];

fn declared_type(spec: &StageSpec) -> &str {
    spec.stage_type.as_deref().unwrap_or(DEFAULT_STAGE_TYPE)
}

/// The type name the stage would run as, if it resolves.
fn resolved_type_name(ctx: &ValidationContext<'_>, spec: &StageSpec) -> Option<String> {
    ctx.registry
        .resolve(declared_type(spec), ctx.namespaces)
        .ok()
        .map(|factory| factory().type_name().to_string())
}

/// Name the stage instance would get at run time.
fn effective_name(ctx: &ValidationContext<'_>, spec: &StageSpec) -> String {
    if let Some(name) = &spec.name {
        return name.clone();
    }
    resolved_type_name(ctx, spec)
        .unwrap_or_else(|| {
            let declared = declared_type(spec);
            declared.rsplit('.').next().unwrap_or(declared).to_string()
        })
        .to_lowercase()
}

fn diagnostic(rule: &str, severity: Severity, message: String, stage_index: Option<usize>) -> Diagnostic {
    Diagnostic {
        rule: rule.into(),
        severity,
        message,
        stage_index,
        fix: None,
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct ChainNotEmptyRule;
impl LintRule for ChainNotEmptyRule {
    fn name(&self) -> &str { "chain_not_empty" }
    fn apply(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        if ctx.definition.chain.is_empty() {
            vec![Diagnostic {
                fix: Some("Add at least one stage to the chain".into()),
                ..diagnostic(
                    self.name(),
                    Severity::Error,
                    format!("Pipeline '{}' has an empty chain", ctx.definition.name),
                    None,
                )
            }]
        } else {
            vec![]
        }
    }
}

struct StageTypeResolvableRule;
impl LintRule for StageTypeResolvableRule {
    fn name(&self) -> &str { "stage_type_resolvable" }
    fn apply(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for (index, spec) in ctx.definition.chain.iter().enumerate() {
            if spec.stage_type.is_none() {
                diags.push(diagnostic(
                    self.name(),
                    Severity::Info,
                    format!("Stage {index} declares no type; defaults to '{DEFAULT_STAGE_TYPE}'"),
                    Some(index),
                ));
            }
            if let Err(e) = ctx.registry.resolve(declared_type(spec), ctx.namespaces) {
                diags.push(Diagnostic {
                    fix: Some("Register the stage type or add its namespace".into()),
                    ..diagnostic(self.name(), Severity::Error, e.to_string(), Some(index))
                });
            }
        }
        diags
    }
}

struct ShellCommandPresentRule;
impl LintRule for ShellCommandPresentRule {
    fn name(&self) -> &str { "shell_command_present" }
    fn apply(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let from_pipe = ctx.definition.pipe_parameters.contains_key("bash_command");
        ctx.definition
            .chain
            .iter()
            .enumerate()
            .filter(|(_, spec)| {
                resolved_type_name(ctx, spec).as_deref() == Some(ShellStage::TYPE_NAME)
                    && !from_pipe
                    && !spec.default_parameters.contains_key("bash_command")
            })
            .map(|(index, _)| Diagnostic {
                fix: Some("Set bash_command in default_parameters".into()),
                ..diagnostic(
                    self.name(),
                    Severity::Warning,
                    format!("Shell stage {index} has no bash_command; it must arrive on its input"),
                    Some(index),
                )
            })
            .collect()
    }
}

struct UniqueStageNamesRule;
impl LintRule for UniqueStageNamesRule {
    fn name(&self) -> &str { "unique_stage_names" }
    fn apply(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut diags = Vec::new();
        for (index, spec) in ctx.definition.chain.iter().enumerate() {
            let name = effective_name(ctx, spec);
            if let Some(first) = seen.get(&name) {
                diags.push(Diagnostic {
                    fix: Some("Give the stage an explicit, distinct name".into()),
                    ..diagnostic(
                        self.name(),
                        Severity::Warning,
                        format!("Stage {index} has the same name '{name}' as stage {first}"),
                        Some(index),
                    )
                });
            } else {
                seen.insert(name, index);
            }
        }
        diags
    }
}

struct RedirectPathsExistRule {
    working_dir: PathBuf,
}
impl LintRule for RedirectPathsExistRule {
    fn name(&self) -> &str { "redirect_paths_exist" }
    fn apply(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for (index, spec) in ctx.definition.chain.iter().enumerate() {
            for key in REDIRECT_KEYS {
                // pipe parameters override stage defaults at run time
                let value = ctx
                    .definition
                    .pipe_parameters
                    .get(*key)
                    .or_else(|| spec.default_parameters.get(*key));
                let Some(path) = value.and_then(|v| v.as_str()) else {
                    continue;
                };
                if !self.working_dir.join(Path::new(path)).exists() {
                    diags.push(Diagnostic {
                        fix: Some(format!("Create '{path}' before running the pipeline")),
                        ..diagnostic(
                            self.name(),
                            Severity::Warning,
                            format!("Stage {index} {key} '{path}' does not exist"),
                            Some(index),
                        )
                    });
                }
            }
        }
        diags
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules; redirect paths are checked against the
/// current directory.
pub fn validate(ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
    let working_dir = std::env::current_dir().unwrap_or_default();
    validate_in(ctx, &working_dir)
}

/// Run all built-in lint rules, checking relative redirect paths against
/// `working_dir`.
pub fn validate_in(ctx: &ValidationContext<'_>, working_dir: &Path) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(ChainNotEmptyRule),
        Box::new(StageTypeResolvableRule),
        Box::new(ShellCommandPresentRule),
        Box::new(UniqueStageNamesRule),
        Box::new(RedirectPathsExistRule {
            working_dir: working_dir.to_path_buf(),
        }),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(ctx));
    }
    diagnostics
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_registry_with_environment;
    use pipette_exec::LocalExecutionEnvironment;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn registry() -> StageRegistry {
        default_registry_with_environment(Arc::new(LocalExecutionEnvironment::new(".")))
    }

    fn check(definition: &PipelineDefinition, working_dir: &Path) -> Vec<Diagnostic> {
        let registry = registry();
        let namespaces = vec!["pipette".to_string()];
        validate_in(
            &ValidationContext {
                definition,
                registry: &registry,
                namespaces: &namespaces,
            },
            working_dir,
        )
    }

    fn rules_of(diags: &[Diagnostic], severity: Severity) -> Vec<&str> {
        diags
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.rule.as_str())
            .collect()
    }

    #[test]
    fn valid_definition_passes() {
        let dir = TempDir::new().unwrap();
        let definition = PipelineDefinition::new(
            "ok",
            vec![StageSpec::new("BashCommand").with_default("bash_command", json!("echo hi"))],
        );
        let diags = check(&definition, dir.path());
        assert!(diags.is_empty(), "Expected no diagnostics, got: {diags:?}");
        assert!(!has_errors(&diags));
    }

    #[test]
    fn empty_chain_error() {
        let dir = TempDir::new().unwrap();
        let diags = check(&PipelineDefinition::new("empty", vec![]), dir.path());
        assert_eq!(rules_of(&diags, Severity::Error), vec!["chain_not_empty"]);
        assert!(has_errors(&diags));
    }

    #[test]
    fn unknown_type_error() {
        let dir = TempDir::new().unwrap();
        let definition = PipelineDefinition::new("bad", vec![StageSpec::new("does.not.Exist")]);
        let diags = check(&definition, dir.path());
        let errors: Vec<_> = diags.iter().filter(|d| d.severity == Severity::Error).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, "stage_type_resolvable");
        assert_eq!(errors[0].stage_index, Some(0));
        assert!(errors[0].message.contains("does.not.Exist"));
    }

    #[test]
    fn untyped_stage_is_info() {
        let dir = TempDir::new().unwrap();
        let spec = StageSpec::default().with_default("bash_command", json!("true"));
        let diags = check(&PipelineDefinition::new("untyped", vec![spec]), dir.path());
        assert_eq!(rules_of(&diags, Severity::Info), vec!["stage_type_resolvable"]);
        assert!(!has_errors(&diags));
    }

    #[test]
    fn missing_bash_command_warning() {
        let dir = TempDir::new().unwrap();
        let definition = PipelineDefinition::new("no_cmd", vec![StageSpec::new("BashCommand")]);
        let diags = check(&definition, dir.path());
        assert_eq!(rules_of(&diags, Severity::Warning), vec!["shell_command_present"]);

        let from_pipe = definition.with_pipe_parameter("bash_command", json!("date"));
        assert!(check(&from_pipe, dir.path()).is_empty());
    }

    #[test]
    fn duplicate_names_warning() {
        let dir = TempDir::new().unwrap();
        let stage = StageSpec::new("BashCommand").with_default("bash_command", json!("true"));
        let definition = PipelineDefinition::new(
            "dups",
            vec![stage.clone(), stage.clone().named("other"), stage],
        );
        let diags = check(&definition, dir.path());
        let warnings: Vec<_> = diags.iter().filter(|d| d.rule == "unique_stage_names").collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].stage_index, Some(2));
        assert!(warnings[0].message.contains("bashcommand"));
    }

    #[test]
    fn missing_redirect_path_warning() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("present.txt"), "").unwrap();
        let definition = PipelineDefinition::new(
            "redirects",
            vec![StageSpec::new("BashCommand")
                .with_default("bash_command", json!("cat"))
                .with_default("input_filepath", json!("present.txt"))
                .with_default("output_filepath", json!("absent.txt"))],
        );
        let diags = check(&definition, dir.path());
        let warnings: Vec<_> = diags.iter().filter(|d| d.rule == "redirect_paths_exist").collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("output_filepath"));
        assert!(warnings[0].fix.is_some());
    }

    #[test]
    fn redirect_check_uses_pipe_parameter_over_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("present.txt"), "").unwrap();
        let stage = StageSpec::new("BashCommand")
            .with_default("bash_command", json!("cat"))
            .with_default("input_filepath", json!("present.txt"));

        let definition = PipelineDefinition::new("shadowed", vec![stage.clone()])
            .with_pipe_parameter("input_filepath", json!("absent.txt"));
        let diags = check(&definition, dir.path());
        let warnings: Vec<_> = diags.iter().filter(|d| d.rule == "redirect_paths_exist").collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("absent.txt"));

        let stage = stage.with_default("input_filepath", json!("absent.txt"));
        let definition = PipelineDefinition::new("overridden", vec![stage])
            .with_pipe_parameter("input_filepath", json!("present.txt"));
        let diags = check(&definition, dir.path());
        assert!(!diags.iter().any(|d| d.rule == "redirect_paths_exist"));
    }
}
