//! The `fs` extension: file operations relative to the scope's working directory.

use std::fs;

use mlua::prelude::*;

use crate::context::SharedScope;

fn io_error(op: &str, path: &str, err: std::io::Error) -> LuaError {
  LuaError::external(format!("fs.{}('{}'): {}", op, path, err))
}

pub fn create_fs(lua: &Lua, scope: SharedScope) -> LuaResult<LuaTable> {
  let table = lua.create_table()?;

  let s = scope.clone();
  table.set(
    "write",
    lua.create_function(move |_, (path, content): (String, LuaString)| {
      let target = s.borrow().resolve(&path);
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("write", &path, e))?;
      }
      fs::write(&target, &*content.as_bytes()).map_err(|e| io_error("write", &path, e))
    })?,
  )?;

  let s = scope.clone();
  table.set(
    "read",
    lua.create_function(move |lua, path: String| {
      let target = s.borrow().resolve(&path);
      let bytes = fs::read(&target).map_err(|e| io_error("read", &path, e))?;
      lua.create_string(bytes)
    })?,
  )?;

  let s = scope.clone();
  table.set(
    "exists",
    lua.create_function(move |_, path: String| Ok(s.borrow().resolve(&path).exists()))?,
  )?;

  let s = scope.clone();
  table.set(
    "mkdir",
    lua.create_function(move |_, path: String| {
      let target = s.borrow().resolve(&path);
      fs::create_dir_all(&target).map_err(|e| io_error("mkdir", &path, e))
    })?,
  )?;

  // Returns whether anything was removed.
  let s = scope.clone();
  table.set(
    "remove",
    lua.create_function(move |_, path: String| {
      let target = s.borrow().resolve(&path);
      let result = if target.is_dir() {
        fs::remove_dir_all(&target)
      } else {
        fs::remove_file(&target)
      };
      match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error("remove", &path, e)),
      }
    })?,
  )?;

  table.set(
    "list",
    lua.create_function(move |lua, path: Option<String>| {
      let path = path.unwrap_or_else(|| ".".to_string());
      let target = scope.borrow().resolve(&path);
      let mut names = Vec::new();
      for entry in fs::read_dir(&target).map_err(|e| io_error("list", &path, e))? {
        let entry = entry.map_err(|e| io_error("list", &path, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
      }
      names.sort();
      lua.create_sequence_from(names)
    })?,
  )?;

  Ok(table)
}
