//! The `path` extension: pure path manipulation, no filesystem access.

use std::path::{Component, Path, PathBuf};

use mlua::prelude::*;

/// Resolve `.` and `..` lexically.
pub fn normalize(path: &Path) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::ParentDir => {
        if !normalized.pop() {
          normalized.push("..");
        }
      }
      Component::CurDir => {}
      other => normalized.push(other),
    }
  }
  normalized
}

/// Path of `to` relative to `from`, both taken lexically.
pub fn relative(from: &Path, to: &Path) -> PathBuf {
  let from: Vec<_> = from.components().collect();
  let to: Vec<_> = to.components().collect();
  let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

  let mut relative = PathBuf::new();
  for _ in common..from.len() {
    relative.push("..");
  }
  for component in &to[common..] {
    relative.push(component);
  }

  if relative.as_os_str().is_empty() {
    PathBuf::from(".")
  } else {
    relative
  }
}

fn lossy(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

pub fn create_path(lua: &Lua) -> LuaResult<LuaTable> {
  let path = lua.create_table()?;

  path.set(
    "join",
    lua.create_function(|_, segments: LuaVariadic<String>| {
      let joined: PathBuf = segments.iter().collect();
      Ok(lossy(&joined))
    })?,
  )?;

  path.set(
    "dirname",
    lua.create_function(|_, p: String| Ok(Path::new(&p).parent().map(lossy).unwrap_or_default()))?,
  )?;

  path.set(
    "basename",
    lua.create_function(|_, p: String| {
      Ok(
        Path::new(&p)
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_default(),
      )
    })?,
  )?;

  // Includes the leading dot, empty when there is no extension.
  path.set(
    "extname",
    lua.create_function(|_, p: String| {
      Ok(
        Path::new(&p)
          .extension()
          .map(|e| format!(".{}", e.to_string_lossy()))
          .unwrap_or_default(),
      )
    })?,
  )?;

  path.set(
    "is_absolute",
    lua.create_function(|_, p: String| Ok(Path::new(&p).is_absolute()))?,
  )?;

  path.set(
    "normalize",
    lua.create_function(|_, p: String| Ok(lossy(&normalize(Path::new(&p)))))?,
  )?;

  path.set(
    "relative",
    lua.create_function(|_, (from, to): (String, String)| {
      Ok(lossy(&relative(
        &normalize(Path::new(&from)),
        &normalize(Path::new(&to)),
      )))
    })?,
  )?;

  path.set(
    "split",
    lua.create_function(|lua, p: String| {
      let parts = Path::new(&p)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned());
      lua.create_sequence_from(parts)
    })?,
  )?;

  Ok(path)
}
