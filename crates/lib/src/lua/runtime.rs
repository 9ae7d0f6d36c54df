use mlua::prelude::*;

use crate::lua::globals::{self, ScriptHost};
use crate::lua::loaders;

/// Create a Lua state bound to `host`.
///
/// `require` also searches the module's `lib/` directory, so modules and their
/// test files can share helper code.
pub fn create_runtime(host: &ScriptHost) -> LuaResult<Lua> {
  let lua = Lua::new();

  let package = lua.globals().get::<LuaTable>("package")?;
  let package_path = package.get::<String>("path")?;
  let lib = host.module_dir.join("lib");
  package.set(
    "path",
    format!(
      "{};{};{}",
      lib.join("?.lua").display(),
      lib.join("?").join("init.lua").display(),
      package_path
    ),
  )?;

  loaders::install_loaders(&lua)?;
  globals::register_globals(&lua, host)?;

  Ok(lua)
}
