//! File loading with per-file `__dir` injection.
//!
//! Every file is evaluated in its own environment table that holds `__dir`
//! (the directory of the file) and falls back to `_G`. `dofile` is replaced so
//! relative paths resolve against the calling file's directory.
//!
//! Test files get a different environment: global assignments stay in the
//! file's table, and the names `setup`, `teardown`, `test_main` and `test_*`
//! are recorded in the order they are first assigned. Reads fall back to `_G`,
//! so every test file of a run shares the module's state without seeing
//! another file's definitions.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use crate::consts::TEST_CASE_PREFIX;

/// Registry key for the directory of the file being loaded.
const CURRENT_DIR_KEY: &str = "__kiln_current_dir";

pub const SETUP_FN: &str = "setup";
pub const TEARDOWN_FN: &str = "teardown";
pub const MAIN_FN: &str = "test_main";

struct SourceFile {
  path: PathBuf,
  dir: String,
  content: String,
}

fn read_source(path: &Path) -> LuaResult<SourceFile> {
  let canonical_path = dunce::canonicalize(path)
    .map_err(|e| LuaError::external(format!("cannot resolve '{}': {}", path.display(), e)))?;
  let content = fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;
  let dir = canonical_path
    .parent()
    .unwrap_or(Path::new("."))
    .to_string_lossy()
    .into_owned();
  Ok(SourceFile {
    path: canonical_path,
    dir,
    content,
  })
}

/// Evaluate `chunk` with the current-dir registry value set to `dir`, restoring it afterwards.
fn eval_in_dir(lua: &Lua, source: &SourceFile, env: LuaTable) -> LuaResult<LuaValue> {
  let prev_dir: Option<String> = lua.named_registry_value(CURRENT_DIR_KEY)?;
  lua.set_named_registry_value(CURRENT_DIR_KEY, source.dir.as_str())?;

  let result = lua
    .load(&source.content)
    .set_name(format!("@{}", source.path.display()))
    .set_environment(env)
    .eval::<LuaValue>();

  // Cleanup errors must not mask the evaluation result.
  let _ = lua.set_named_registry_value(CURRENT_DIR_KEY, prev_dir);
  result
}

/// Load and evaluate a Lua file. Globals it assigns land in `_G`.
pub fn load_file_with_dir(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let source = read_source(path)?;

  let env = lua.create_table()?;
  env.set("__dir", source.dir.as_str())?;

  let mt = lua.create_table()?;
  mt.set("__index", lua.globals())?;
  mt.set("__newindex", lua.globals())?;
  env.set_metatable(Some(mt))?;

  eval_in_dir(lua, &source, env)
}

/// Globals a test file defined, in first-assignment order of the recorded names.
pub struct TestDeclarations {
  env: LuaTable,
  names: Vec<String>,
}

impl TestDeclarations {
  /// The function currently bound to `name`, if it is one.
  pub fn function(&self, name: &str) -> LuaResult<Option<LuaFunction>> {
    match self.env.raw_get::<LuaValue>(name)? {
      LuaValue::Function(f) => Ok(Some(f)),
      _ => Ok(None),
    }
  }

  /// Recorded `test_*` case names (excluding `test_main`) bound to functions, in order.
  pub fn case_names(&self) -> LuaResult<Vec<String>> {
    let mut cases = Vec::new();
    for name in &self.names {
      if is_case_name(name) && self.function(name)?.is_some() {
        cases.push(name.clone());
      }
    }
    Ok(cases)
  }

  pub fn recorded(&self) -> &[String] {
    &self.names
  }
}

/// Whether `name` is a per-case test function.
pub fn is_case_name(name: &str) -> bool {
  name != MAIN_FN && name.starts_with(TEST_CASE_PREFIX)
}

fn is_declaration(name: &str) -> bool {
  name == SETUP_FN || name == TEARDOWN_FN || name == MAIN_FN || name.starts_with(TEST_CASE_PREFIX)
}

/// Evaluate a test file in a recording environment.
///
/// `kiln`, when given, shadows the global `kiln` table for this file.
pub fn load_test_file(lua: &Lua, path: &Path, kiln: Option<LuaTable>) -> LuaResult<TestDeclarations> {
  let source = read_source(path)?;
  let names = Rc::new(RefCell::new(Vec::<String>::new()));

  let env = lua.create_table()?;
  env.raw_set("__dir", source.dir.as_str())?;
  if let Some(kiln) = kiln {
    env.raw_set("kiln", kiln)?;
  }

  let recorder = names.clone();
  let record = lua.create_function(move |_, (table, key, value): (LuaTable, LuaValue, LuaValue)| {
    if let LuaValue::String(s) = &key {
      let name = s.to_str()?.to_string();
      let mut names = recorder.borrow_mut();
      if is_declaration(&name) && !names.contains(&name) {
        names.push(name);
      }
    }
    table.raw_set(key, value)
  })?;

  let mt = lua.create_table()?;
  mt.set("__index", lua.globals())?;
  mt.set("__newindex", record)?;
  env.set_metatable(Some(mt))?;

  eval_in_dir(lua, &source, env.clone())?;

  let names = names.borrow().clone();
  Ok(TestDeclarations { env, names })
}

fn resolve_path(lua: &Lua, path_str: &str) -> LuaResult<PathBuf> {
  let path = Path::new(path_str);
  if path.is_absolute() {
    return Ok(path.to_path_buf());
  }

  let current: Option<String> = lua.named_registry_value(CURRENT_DIR_KEY)?;
  if let Some(current_dir) = current {
    let resolved = Path::new(&current_dir).join(path);
    if resolved.exists() {
      return Ok(resolved);
    }
  }

  Ok(path.to_path_buf())
}

/// Replace `dofile` so relative paths resolve against the calling file.
pub fn install_loaders(lua: &Lua) -> LuaResult<()> {
  let dofile = lua.create_function(|lua, path: Option<String>| match path {
    Some(path_str) => {
      let resolved = resolve_path(lua, &path_str)?;
      load_file_with_dir(lua, &resolved)
    }
    None => Err(LuaError::external("dofile() without path not supported")),
  })?;
  lua.globals().set("dofile", dofile)?;
  Ok(())
}
