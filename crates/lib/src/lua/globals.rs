//! The `kiln` global table.
//!
//! The module file, target bodies and extensions see the global table. Its
//! declaration functions (`kiln.module`, `kiln.target`, `kiln.disable_flag`,
//! `kiln.require_param`) feed the module's declarations. Test files see an
//! overlay instead (see [`create_test_globals`]): it adds `kiln.skip`, refuses
//! declarations and falls back to the global table for everything else.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use mlua::prelude::*;
use tracing::{debug, error, info, trace, warn};

use crate::args::{Flags, Params, strip_flag_prefix};
use crate::context::SharedScope;
use crate::extension::ExtensionLoader;
use crate::module::{DisabledFlag, ModuleDecls, TargetBody, TargetDecl};
use crate::target::normalize_name;

const DECLARATION_FNS: [&str; 4] = ["module", "target", "disable_flag", "require_param"];

/// Skip request raised by `kiln.skip` in a test file.
#[derive(Debug, Default)]
pub struct SkipSignal {
  reason: Option<String>,
}

impl SkipSignal {
  pub fn raise(&mut self, reason: String) {
    self.reason = Some(reason);
  }

  /// Consume a pending skip request.
  pub fn take(&mut self) -> Option<String> {
    self.reason.take()
  }
}

/// Host state the `kiln` table is bound to.
#[derive(Clone)]
pub struct ScriptHost {
  /// Shown in script log records.
  pub script: String,
  pub module_dir: PathBuf,
  pub build_dir: PathBuf,
  pub test_dir: PathBuf,
  pub params: Rc<RefCell<Params>>,
  pub flags: Flags,
  pub scope: SharedScope,
  pub extensions: Rc<ExtensionLoader>,
  pub decls: Rc<RefCell<ModuleDecls>>,
}

fn path_string(path: &std::path::Path) -> String {
  path.to_string_lossy().into_owned()
}

fn parse_target(fields: LuaTable) -> LuaResult<TargetDecl> {
  let name: String = fields
    .get::<Option<String>>("name")?
    .ok_or_else(|| LuaError::external("kiln.target: 'name' is required"))?;
  if normalize_name(&name).is_empty() {
    return Err(LuaError::external("kiln.target: 'name' must not be empty"));
  }

  let deps: Vec<String> = fields.get::<Option<Vec<String>>>("deps")?.unwrap_or_default();
  let run: Option<LuaFunction> = fields.get("run")?;
  let cmd: Option<String> = fields.get("cmd")?;

  let body = match (run, cmd) {
    (Some(func), None) => TargetBody::Function(func),
    (None, Some(cmd)) => TargetBody::Command(cmd),
    (Some(_), Some(_)) => {
      return Err(LuaError::external(format!(
        "kiln.target '{}': 'run' and 'cmd' are mutually exclusive",
        name
      )));
    }
    (None, None) => {
      return Err(LuaError::external(format!(
        "kiln.target '{}': one of 'run' or 'cmd' is required",
        name
      )));
    }
  };

  Ok(TargetDecl {
    name,
    deps,
    description: fields.get("description")?,
    body,
  })
}

fn register_declarations(lua: &Lua, kiln: &LuaTable, host: &ScriptHost) -> LuaResult<()> {
  // kiln.module{ name=, build_dir=, test_dir= }
  let decls = host.decls.clone();
  let module_dir = host.module_dir.clone();
  kiln.set(
    "module",
    lua.create_function(move |lua, fields: LuaTable| {
      let kiln: LuaTable = lua.globals().get("kiln")?;
      let mut decls = decls.borrow_mut();

      if let Some(name) = fields.get::<Option<String>>("name")? {
        decls.settings.name = name;
      }
      if let Some(dir) = fields.get::<Option<String>>("build_dir")? {
        decls.settings.build_dir = PathBuf::from(dir);
        kiln.set("build_dir", path_string(&module_dir.join(&decls.settings.build_dir)))?;
      }
      if let Some(dir) = fields.get::<Option<String>>("test_dir")? {
        decls.settings.test_dir = PathBuf::from(dir);
        kiln.set("test_dir", path_string(&module_dir.join(&decls.settings.test_dir)))?;
      }
      Ok(())
    })?,
  )?;

  // kiln.target{ name=, deps={}, run=function() end | cmd="...", description= }
  let decls = host.decls.clone();
  kiln.set(
    "target",
    lua.create_function(move |_, fields: LuaTable| {
      let decl = parse_target(fields)?;
      debug!(target = %decl.name, deps = ?decl.deps, "declared target");
      decls.borrow_mut().targets.push(decl);
      Ok(())
    })?,
  )?;

  let decls = host.decls.clone();
  kiln.set(
    "disable_flag",
    lua.create_function(move |_, (flag, reason): (String, String)| {
      decls.borrow_mut().disabled_flags.push(DisabledFlag {
        flag: strip_flag_prefix(&flag).to_string(),
        reason,
      });
      Ok(())
    })?,
  )?;

  let decls = host.decls.clone();
  kiln.set(
    "require_param",
    lua.create_function(move |_, name: String| {
      let mut decls = decls.borrow_mut();
      if !decls.required_params.contains(&name) {
        decls.required_params.push(name);
      }
      Ok(())
    })?,
  )?;

  Ok(())
}

fn register_params(lua: &Lua, kiln: &LuaTable, host: &ScriptHost) -> LuaResult<()> {
  let params = host.params.clone();
  kiln.set(
    "param",
    lua.create_function(move |_, (name, default): (String, Option<String>)| {
      Ok(params.borrow().get(&name).map(str::to_string).or(default))
    })?,
  )?;

  let params = host.params.clone();
  kiln.set(
    "params",
    lua.create_function(move |lua, ()| {
      let table = lua.create_table()?;
      for (key, value) in params.borrow().iter() {
        table.set(key, value)?;
      }
      Ok(table)
    })?,
  )?;

  let params = host.params.clone();
  kiln.set(
    "set_param",
    lua.create_function(move |_, (name, value): (String, Option<String>)| {
      let mut params = params.borrow_mut();
      match value {
        Some(value) => params.set(name, value),
        None => {
          params.remove(&name);
        }
      }
      Ok(())
    })?,
  )?;

  let flags = host.flags.clone();
  kiln.set(
    "flag",
    lua.create_function(move |_, name: String| Ok(flags.contains(&name)))?,
  )?;

  let flags = host.flags.clone();
  kiln.set(
    "flags",
    lua.create_function(move |lua, ()| lua.create_sequence_from(flags.iter()))?,
  )?;

  Ok(())
}

fn register_scope(lua: &Lua, kiln: &LuaTable, host: &ScriptHost) -> LuaResult<()> {
  let scope = host.scope.clone();
  kiln.set(
    "workdir",
    lua.create_function(move |_, ()| Ok(path_string(scope.borrow().workdir())))?,
  )?;

  let scope = host.scope.clone();
  kiln.set(
    "chdir",
    lua.create_function(move |_, path: String| {
      let mut scope = scope.borrow_mut();
      scope
        .chdir(&path)
        .map_err(|e| LuaError::external(format!("kiln.chdir('{}'): {}", path, e)))?;
      Ok(path_string(scope.workdir()))
    })?,
  )?;

  let scope = host.scope.clone();
  kiln.set(
    "getenv",
    lua.create_function(move |_, name: String| Ok(scope.borrow().getenv(&name)))?,
  )?;

  let scope = host.scope.clone();
  kiln.set(
    "setenv",
    lua.create_function(move |_, (name, value): (String, Option<String>)| {
      scope.borrow_mut().setenv(&name, value);
      Ok(())
    })?,
  )?;

  let extensions = host.extensions.clone();
  kiln.set(
    "load",
    lua.create_function(move |lua, name: String| extensions.load(lua, &name).map_err(LuaError::external))?,
  )?;

  kiln.set(
    "skip",
    lua.create_function(|_, _: Option<String>| -> LuaResult<()> {
      Err(LuaError::external("kiln.skip is only available in test files"))
    })?,
  )?;

  Ok(())
}

fn register_log(lua: &Lua, kiln: &LuaTable, script: &str) -> LuaResult<()> {
  let log = lua.create_table()?;

  macro_rules! level {
    ($name:literal, $mac:ident) => {{
      let script = script.to_string();
      log.set(
        $name,
        lua.create_function(move |_, msg: String| {
          $mac!(script = %script, "{}", msg);
          Ok(())
        })?,
      )?;
    }};
  }

  level!("trace", trace);
  level!("debug", debug);
  level!("info", info);
  level!("warn", warn);
  level!("error", error);

  kiln.set("log", log)?;
  Ok(())
}

/// Register the `kiln` global table.
pub fn register_globals(lua: &Lua, host: &ScriptHost) -> LuaResult<()> {
  let kiln = lua.create_table()?;

  kiln.set("module_dir", path_string(&host.module_dir))?;
  kiln.set("build_dir", path_string(&host.build_dir))?;
  kiln.set("test_dir", path_string(&host.test_dir))?;

  register_declarations(lua, &kiln, host)?;
  register_params(lua, &kiln, host)?;
  register_scope(lua, &kiln, host)?;
  register_log(lua, &kiln, &host.script)?;

  lua.globals().set("kiln", kiln)?;
  Ok(())
}

/// Build the `kiln` table a test file sees.
///
/// `kiln.skip` records its reason in `signal` and aborts the running function.
/// Log records carry `script` as their script name.
pub fn create_test_globals(lua: &Lua, script: &str, signal: Rc<RefCell<SkipSignal>>) -> LuaResult<LuaTable> {
  let kiln = lua.create_table()?;

  for func in DECLARATION_FNS {
    kiln.set(
      func,
      lua.create_function(move |_, _: LuaMultiValue| -> LuaResult<()> {
        Err(LuaError::external(format!(
          "kiln.{} is only available in the module file",
          func
        )))
      })?,
    )?;
  }

  kiln.set(
    "skip",
    lua.create_function(move |_, reason: Option<String>| -> LuaResult<()> {
      let reason = reason.unwrap_or_else(|| "skipped".to_string());
      signal.borrow_mut().raise(reason.clone());
      Err(LuaError::external(format!("skipped: {}", reason)))
    })?,
  )?;

  register_log(lua, &kiln, script)?;

  let mt = lua.create_table()?;
  mt.set("__index", lua.globals().get::<LuaTable>("kiln")?)?;
  kiln.set_metatable(Some(mt))?;
  Ok(kiln)
}
