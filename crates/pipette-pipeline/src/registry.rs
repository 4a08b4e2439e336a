//! Stage factories grouped by namespace, and type resolution.

use std::collections::HashMap;
use std::sync::Arc;

use pipette_definition::{Format, StageSpec};
use pipette_exec::{ExecutionEnvironment, LocalExecutionEnvironment};
use pipette_types::{PipetteError, Result};

use crate::stage::{Stage, StageInstance};
use crate::stages::ShellStage;

/// Namespace searched when none is configured.
pub const DEFAULT_NAMESPACE: &str = "pipette";

/// Type used for chain entries that do not declare one.
pub const DEFAULT_STAGE_TYPE: &str = "BashCommand";

/// Other names the shell stage is registered under in the default namespace.
pub const SHELL_STAGE_ALIASES: &[&str] = &["BuiltinEcho"];

/// Builds a fresh stage for every instantiation.
pub type StageFactory = Box<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

// ---------------------------------------------------------------------------
// StageRegistry
// ---------------------------------------------------------------------------

/// Startup-time table of stage factories.
///
/// Every stage type lives in a namespace group. A namespace path is dotted
/// (`pipette.contrib`), and registering one also registers each of its parent
/// paths so they resolve as namespaces rather than as missing names.
#[derive(Default)]
pub struct StageRegistry {
    namespaces: HashMap<String, HashMap<String, StageFactory>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_namespace(&mut self, namespace: &str) {
        let mut prefix = String::new();
        for part in namespace.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            self.namespaces.entry(prefix.clone()).or_default();
        }
    }

    /// Register a stage type under `namespace`, replacing any previous factory
    /// with the same name.
    pub fn register<F, S>(&mut self, namespace: &str, type_name: &str, factory: F)
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stage + 'static,
    {
        self.register_namespace(namespace);
        if let Some(group) = self.namespaces.get_mut(namespace) {
            group.insert(
                type_name.to_string(),
                Box::new(move || Box::new(factory()) as Box<dyn Stage>),
            );
        }
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    /// Whether `type_name` is registered directly in `namespace`.
    pub fn has(&self, namespace: &str, type_name: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|group| group.contains_key(type_name))
    }

    /// Resolve `identifier` against `namespaces` in order; the first namespace
    /// that yields a stage wins.
    pub fn resolve(&self, identifier: &str, namespaces: &[String]) -> Result<&StageFactory> {
        for namespace in namespaces {
            let qualified = if namespace.is_empty() {
                identifier.to_string()
            } else {
                format!("{namespace}.{identifier}")
            };

            if let Some((path, type_name)) = qualified.rsplit_once('.') {
                if let Some(factory) = self.namespaces.get(path).and_then(|g| g.get(type_name)) {
                    tracing::debug!(identifier, resolved = %qualified, "Resolved stage type");
                    return Ok(factory);
                }
            }

            if self.has_namespace(&qualified) {
                return Err(PipetteError::InvalidStageType {
                    identifier: identifier.to_string(),
                    resolved: qualified,
                    reason: "names a namespace, not a stage".into(),
                });
            }
        }

        Err(PipetteError::StageResolution {
            identifier: identifier.to_string(),
            namespaces: namespaces.to_vec(),
        })
    }

    /// Resolve the stage type (or the default type) and build a
    /// [`StageInstance`] seeded from the spec.
    pub fn instantiate(
        &self,
        spec: &StageSpec,
        namespaces: &[String],
        format: Format,
    ) -> Result<StageInstance> {
        let identifier = spec.stage_type.as_deref().unwrap_or(DEFAULT_STAGE_TYPE);
        let factory = self.resolve(identifier, namespaces)?;
        Ok(StageInstance::new(factory(), spec.clone(), format))
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

/// Registry with the built-in stages, running commands in the current
/// directory with the default shell.
pub fn default_registry() -> Result<StageRegistry> {
    let env = LocalExecutionEnvironment::current_dir()?;
    Ok(default_registry_with_environment(Arc::new(env)))
}

/// Registry with the built-in stages bound to the given execution environment.
///
/// The shell stage is also reachable through [`SHELL_STAGE_ALIASES`]; an
/// aliased stage still reports `BashCommand` as its type.
pub fn default_registry_with_environment(env: Arc<dyn ExecutionEnvironment>) -> StageRegistry {
    let mut reg = StageRegistry::new();
    let type_names =
        std::iter::once(ShellStage::TYPE_NAME).chain(SHELL_STAGE_ALIASES.iter().copied());
    for type_name in type_names {
        let env = Arc::clone(&env);
        reg.register(DEFAULT_NAMESPACE, type_name, move || {
            ShellStage::new(Arc::clone(&env))
        });
    }
    reg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
