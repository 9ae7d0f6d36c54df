//! Capability extensions loaded by name through `kiln.load`.
//!
//! An extension is a table of operations. Built-in extensions are constructed in
//! Rust; script extensions are Lua files found on the search path and return
//! their table. A run has one registry and one Lua state, so each name is
//! initialized at most once per run: later loads from any script return the
//! cached table.
//!
//! # Submodules
//!
//! - [`fs`] - file operations
//! - [`path`] - path manipulation
//! - [`sh`] - shell commands with timeouts

pub mod fs;
pub mod path;
pub mod sh;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use mlua::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::SharedScope;
use crate::lua::{error_message, loaders};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtensionError {
  #[error("extension '{name}' not found (searched: {})", display_dirs(.searched))]
  NotFound { name: String, searched: Vec<PathBuf> },

  #[error("invalid extension name '{0}'")]
  InvalidName(String),

  #[error("circular extension load: {}", .chain.join(" -> "))]
  CircularLoad { chain: Vec<String> },

  #[error("extension '{name}' failed to initialize: {message}")]
  Script { name: String, message: String },
}

fn display_dirs(dirs: &[PathBuf]) -> String {
  if dirs.is_empty() {
    return "no directories".to_string();
  }
  dirs
    .iter()
    .map(|d| d.display().to_string())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Extensions implemented in Rust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
  Sh,
  Fs,
  Path,
}

impl Builtin {
  pub const ALL: [Builtin; 3] = [Builtin::Sh, Builtin::Fs, Builtin::Path];

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|b| b.name() == name)
  }

  pub fn name(self) -> &'static str {
    match self {
      Builtin::Sh => "sh",
      Builtin::Fs => "fs",
      Builtin::Path => "path",
    }
  }

  fn create(self, lua: &Lua, scope: SharedScope) -> LuaResult<LuaTable> {
    match self {
      Builtin::Sh => sh::create_sh(lua, scope),
      Builtin::Fs => fs::create_fs(lua, scope),
      Builtin::Path => path::create_path(lua),
    }
  }
}

#[derive(Default)]
struct LoaderState {
  loaded: HashMap<String, LuaTable>,
  /// Names whose initialization is in progress, outermost first.
  loading: Vec<String>,
  init_count: HashMap<String, usize>,
}

/// Extension registry of one run.
pub struct ExtensionLoader {
  dirs: Vec<PathBuf>,
  scope: SharedScope,
  state: RefCell<LoaderState>,
}

impl ExtensionLoader {
  pub fn new(dirs: Vec<PathBuf>, scope: SharedScope) -> Self {
    Self {
      dirs,
      scope,
      state: RefCell::new(LoaderState::default()),
    }
  }

  pub fn search_dirs(&self) -> &[PathBuf] {
    &self.dirs
  }

  pub fn is_loaded(&self, name: &str) -> bool {
    self.state.borrow().loaded.contains_key(name)
  }

  /// How many times `name` has been initialized. At most one.
  pub fn init_count(&self, name: &str) -> usize {
    self.state.borrow().init_count.get(name).copied().unwrap_or(0)
  }

  /// Script location for `name`, if any directory on the search path has one.
  pub fn resolve(&self, name: &str) -> Option<PathBuf> {
    self
      .dirs
      .iter()
      .map(|dir| dir.join(format!("{}.lua", name)))
      .find(|candidate| candidate.is_file())
  }

  /// Load `name`, initializing it on first use.
  pub fn load(&self, lua: &Lua, name: &str) -> Result<LuaTable, ExtensionError> {
    validate_name(name)?;

    {
      let state = self.state.borrow();
      if let Some(table) = state.loaded.get(name) {
        debug!(extension = %name, "already loaded");
        return Ok(table.clone());
      }
      if let Some(pos) = state.loading.iter().position(|n| n == name) {
        let mut chain = state.loading[pos..].to_vec();
        chain.push(name.to_string());
        return Err(ExtensionError::CircularLoad { chain });
      }
    }

    let builtin = Builtin::from_name(name);
    let script = match builtin {
      Some(_) => None,
      None => Some(self.resolve(name).ok_or_else(|| ExtensionError::NotFound {
        name: name.to_string(),
        searched: self.dirs.clone(),
      })?),
    };

    self.state.borrow_mut().loading.push(name.to_string());
    // No borrow is held here: script initialization may call back into `load`.
    let result = match (builtin, &script) {
      (Some(builtin), _) => builtin.create(lua, self.scope.clone()),
      (None, Some(path)) => run_script(lua, path),
      (None, None) => Err(LuaError::external("unreachable extension source")),
    };
    let mut state = self.state.borrow_mut();
    state.loading.pop();

    let table = result.map_err(|e| ExtensionError::Script {
      name: name.to_string(),
      message: error_message(&e),
    })?;

    match &script {
      Some(path) => info!(extension = %name, path = %path.display(), "loaded extension"),
      None => info!(extension = %name, "loaded built-in extension"),
    }
    state.loaded.insert(name.to_string(), table.clone());
    *state.init_count.entry(name.to_string()).or_default() += 1;
    Ok(table)
  }
}

fn validate_name(name: &str) -> Result<(), ExtensionError> {
  let valid = !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    && !name.starts_with('.');
  if valid {
    Ok(())
  } else {
    Err(ExtensionError::InvalidName(name.to_string()))
  }
}

/// Evaluate a script extension. A script that returns nothing exports an empty table.
fn run_script(lua: &Lua, path: &std::path::Path) -> LuaResult<LuaTable> {
  match loaders::load_file_with_dir(lua, path)? {
    LuaValue::Table(table) => Ok(table),
    LuaValue::Nil => lua.create_table(),
    other => Err(LuaError::external(format!(
      "extension must return a table, got {}",
      other.type_name()
    ))),
  }
}
