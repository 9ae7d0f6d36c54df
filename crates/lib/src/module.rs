//! Module location and evaluation.
//!
//! Evaluating `module.lua` produces [`ModuleDecls`]: settings, targets,
//! disabled flags and required parameters. Declared targets become
//! [`Target`]s whose bodies call back into the module's Lua state. The state
//! is attached to the [`RunContext`], and test files later run in it too.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::MODULE_FILE;
use crate::context::{ModuleSettings, RunContext, SharedScope};
use crate::extension::sh::{self, ShellOptions};
use crate::lua::globals::ScriptHost;
use crate::lua::{error_message, loaders, runtime};
use crate::target::{BodyError, Target, TargetOrigin};

#[derive(Debug, Error)]
pub enum ModuleError {
  #[error("module not found: {}", .0.display())]
  NotFound(PathBuf),

  #[error("failed to evaluate {}: {message}", .path.display())]
  Script { path: PathBuf, message: String },
}

/// A flag the module refuses, with the reason shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledFlag {
  pub flag: String,
  pub reason: String,
}

pub enum TargetBody {
  Function(LuaFunction),
  /// Shell command run in the module root.
  Command(String),
}

pub struct TargetDecl {
  pub name: String,
  pub deps: Vec<String>,
  pub description: Option<String>,
  pub body: TargetBody,
}

/// Everything `module.lua` declared.
pub struct ModuleDecls {
  pub settings: ModuleSettings,
  pub targets: Vec<TargetDecl>,
  pub disabled_flags: Vec<DisabledFlag>,
  pub required_params: Vec<String>,
}

impl ModuleDecls {
  pub fn new(settings: ModuleSettings) -> Self {
    Self {
      settings,
      targets: Vec::new(),
      disabled_flags: Vec::new(),
      required_params: Vec::new(),
    }
  }
}

/// Resolve a module location (directory or `module.lua` path) to its root directory.
pub fn locate(location: &Path) -> Result<PathBuf, ModuleError> {
  let root = if location.is_file() {
    location.parent().unwrap_or(Path::new(".")).to_path_buf()
  } else {
    location.to_path_buf()
  };

  if !root.join(MODULE_FILE).is_file() {
    return Err(ModuleError::NotFound(location.to_path_buf()));
  }
  dunce::canonicalize(&root).map_err(|_| ModuleError::NotFound(location.to_path_buf()))
}

/// What a module declared.
pub struct LoadedModule {
  disabled_flags: Vec<DisabledFlag>,
  required_params: Vec<String>,
  targets: Vec<Target>,
}

impl LoadedModule {
  pub fn disabled_flags(&self) -> &[DisabledFlag] {
    &self.disabled_flags
  }

  pub fn required_params(&self) -> &[String] {
    &self.required_params
  }

  /// Targets declared by the module, in declaration order.
  pub fn targets(&self) -> &[Target] {
    &self.targets
  }
}

fn host(ctx: &RunContext, decls: Rc<RefCell<ModuleDecls>>) -> ScriptHost {
  ScriptHost {
    script: MODULE_FILE.to_string(),
    module_dir: ctx.root().to_path_buf(),
    build_dir: ctx.build_dir(),
    test_dir: ctx.test_dir(),
    params: ctx.params(),
    flags: ctx.flags().clone(),
    scope: ctx.scope(),
    extensions: ctx.extensions(),
    decls,
  }
}

/// The Lua state of the run.
///
/// A context whose module was never evaluated gets a fresh state with the
/// `kiln` global, attached so that later callers share it.
pub fn script_state(ctx: &RunContext) -> LuaResult<Lua> {
  if let Some(lua) = ctx.lua() {
    return Ok(lua);
  }
  let decls = Rc::new(RefCell::new(ModuleDecls::new(ctx.settings().clone())));
  let lua = runtime::create_runtime(&host(ctx, decls))?;
  ctx.attach_lua(lua.clone());
  Ok(lua)
}

/// Evaluate the module file of `ctx` and apply its settings to `ctx`.
pub fn load(ctx: &RunContext) -> Result<LoadedModule, ModuleError> {
  let path = ctx.root().join(MODULE_FILE);
  let script_error = |e: LuaError| ModuleError::Script {
    path: path.clone(),
    message: error_message(&e),
  };

  let decls = Rc::new(RefCell::new(ModuleDecls::new(ctx.settings().clone())));
  let lua = runtime::create_runtime(&host(ctx, decls.clone())).map_err(script_error)?;
  ctx.attach_lua(lua.clone());
  loaders::load_file_with_dir(&lua, &path).map_err(script_error)?;

  let decls = std::mem::replace(
    &mut *decls.borrow_mut(),
    ModuleDecls::new(ModuleSettings::for_root(ctx.root())),
  );
  let settings = decls.settings;
  ctx.update_settings(|s| *s = settings);

  let scope = ctx.scope();
  let targets: Vec<Target> = decls
    .targets
    .into_iter()
    .map(|decl| into_target(decl, &scope))
    .collect();

  info!(
    module = %ctx.module_name(),
    targets = targets.len(),
    "evaluated module"
  );

  Ok(LoadedModule {
    disabled_flags: decls.disabled_flags,
    required_params: decls.required_params,
    targets,
  })
}

fn into_target(decl: TargetDecl, scope: &SharedScope) -> Target {
  debug!(target = %decl.name, "registering module target");
  let target = match decl.body {
    TargetBody::Function(func) => Target::new(&decl.name, move || match func.call::<LuaValue>(()) {
      Ok(LuaValue::Boolean(false)) => Err(BodyError::ReturnedFalse),
      Ok(_) => Ok(()),
      Err(e) => Err(BodyError::Script(error_message(&e))),
    }),
    TargetBody::Command(cmd) => {
      let scope = scope.clone();
      Target::new(&decl.name, move || {
        let output = sh::exec(&cmd, &scope.borrow(), &ShellOptions::default())?;
        if !output.is_empty() {
          debug!(output = %output, "command output");
        }
        Ok(())
      })
    }
  };

  let target = target.with_deps(decl.deps).with_origin(TargetOrigin::Module);
  match decl.description {
    Some(description) => target.with_description(description),
    None => target,
  }
}
