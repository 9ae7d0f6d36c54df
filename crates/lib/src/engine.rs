//! Loading a module for an invocation and running the requested targets.
//!
//! [`Engine::load`] does everything that can fail before a target body runs:
//! argument parsing, module evaluation, disabled-flag and required-parameter
//! checks, and cycle/unknown-target resolution for every requested target.
//! All of those are structural errors. [`Engine::run`] then executes the
//! requested targets in order and stops at the first failure.

use std::path::Path;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use crate::args::{ArgsError, Invocation};
use crate::consts::{EXIT_FAILURE, EXIT_STRUCTURAL};
use crate::context::RunContext;
use crate::module::{self, ModuleError};
use crate::observer::{NoopObserver, RunObserver};
use crate::target::{
  DependencyGraph, ExecuteError, ExecutedTarget, Executor, ResolveError, Target, TargetOrigin, TargetRegistry, builtin,
};
use crate::testing::TestRunSummary;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Args(#[from] ArgsError),

  #[error(transparent)]
  Module(#[from] ModuleError),

  #[error("flag --{flag} is disabled: {reason}")]
  DisabledFlag { flag: String, reason: String },

  #[error("missing required parameter -P{0}=<value>")]
  MissingParam(String),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),
}

impl EngineError {
  /// Whether the invocation was rejected before any target body ran.
  pub fn is_structural(&self) -> bool {
    !matches!(self, EngineError::Execute(ExecuteError::TargetFailed { .. }))
  }

  pub fn exit_code(&self) -> u8 {
    if self.is_structural() {
      EXIT_STRUCTURAL
    } else {
      EXIT_FAILURE
    }
  }
}

/// A registered target as shown by `--list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
  pub name: String,
  pub deps: Vec<String>,
  pub description: Option<String>,
  pub origin: TargetOrigin,
}

/// A module loaded for one invocation.
pub struct Engine {
  ctx: Rc<RunContext>,
  registry: TargetRegistry,
  requested: Vec<String>,
}

impl Engine {
  /// Load the module at `module_location` for the raw argument list `argv`.
  pub fn load<S: AsRef<str>>(
    module_location: &Path,
    argv: &[S],
    observer: Rc<dyn RunObserver>,
  ) -> Result<Self, EngineError> {
    let invocation = Invocation::parse(argv)?;
    debug!(targets = ?invocation.targets, params = invocation.params.len(), flags = invocation.flags.len(), "parsed arguments");

    let root = module::locate(module_location)?;
    let ctx = Rc::new(RunContext::new(
      root,
      invocation.params,
      invocation.flags,
      observer,
    ));
    let loaded = module::load(&ctx)?;

    let mut registry = TargetRegistry::new();
    for target in builtin::all(&ctx) {
      registry.register(target);
    }
    for target in loaded.targets() {
      if let Some(previous) = registry.register(target.clone())
        && previous.origin() == TargetOrigin::Builtin
      {
        debug!(target = %target.name(), "module overrides built-in target");
      }
    }

    for disabled in loaded.disabled_flags() {
      if ctx.flags().contains(&disabled.flag) {
        return Err(EngineError::DisabledFlag {
          flag: disabled.flag.clone(),
          reason: disabled.reason.clone(),
        });
      }
    }

    for param in loaded.required_params() {
      if !ctx.params().borrow().contains(param) {
        return Err(EngineError::MissingParam(param.clone()));
      }
    }

    let requested = invocation.targets;
    DependencyGraph::new(&registry, &requested).verify(&requested)?;

    info!(module = %ctx.module_name(), targets = ?requested, "module loaded");
    Ok(Self {
      ctx,
      registry,
      requested,
    })
  }

  pub fn context(&self) -> &RunContext {
    &self.ctx
  }

  pub fn requested(&self) -> &[String] {
    &self.requested
  }

  /// Registered targets in registration order, built-ins first.
  pub fn targets(&self) -> Vec<TargetInfo> {
    self
      .registry
      .iter()
      .map(|t: &Target| TargetInfo {
        name: t.name().to_string(),
        deps: t.deps().to_vec(),
        description: t.description().map(str::to_string),
        origin: t.origin(),
      })
      .collect()
  }

  /// The order targets would run in, without running them.
  pub fn plan(&self) -> Result<Vec<String>, EngineError> {
    Ok(DependencyGraph::new(&self.registry, &self.requested).execution_order(&self.requested)?)
  }

  /// Run the requested targets in order, stopping at the first failure.
  pub fn run(&self) -> Result<Vec<ExecutedTarget>, EngineError> {
    let graph = DependencyGraph::new(&self.registry, &self.requested);
    let mut executor = Executor::new(graph, self.ctx.observer());
    for target in &self.requested {
      executor.execute(target)?;
    }
    Ok(executor.into_history())
  }

  /// Summary of the `test` target, if it ran.
  pub fn test_summary(&self) -> Option<TestRunSummary> {
    self.ctx.test_summary()
  }
}

/// Load the module and run the requested targets.
pub fn invoke<S: AsRef<str>>(module_location: &Path, argv: &[S]) -> Result<Vec<ExecutedTarget>, EngineError> {
  invoke_with_observer(module_location, argv, Rc::new(NoopObserver))
}

pub fn invoke_with_observer<S: AsRef<str>>(
  module_location: &Path,
  argv: &[S],
  observer: Rc<dyn RunObserver>,
) -> Result<Vec<ExecutedTarget>, EngineError> {
  Engine::load(module_location, argv, observer)?.run()
}
