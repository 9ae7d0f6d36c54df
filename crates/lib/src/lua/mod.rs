//! Lua runtime and evaluation.
//!
//! Module files, test files and script extensions are Lua 5.4 chunks. Every
//! module and every test file gets its own Lua state, so nothing a test file
//! defines can leak into the next one.
//!
//! # Submodules
//!
//! - [`globals`] - the `kiln` global table
//! - [`loaders`] - file loading with `__dir`, and the declaration-recording environment for test files
//! - [`runtime`] - Lua state construction

pub mod globals;
pub mod loaders;
pub mod runtime;

use mlua::prelude::*;

/// Render a Lua error as the message a script author would expect, without
/// the callback tracebacks mlua accumulates.
pub fn error_message(err: &LuaError) -> String {
  match err {
    LuaError::RuntimeError(msg) => msg.clone(),
    LuaError::SyntaxError { message, .. } => message.clone(),
    LuaError::CallbackError { cause, .. } => error_message(cause),
    LuaError::WithContext { context, cause } => format!("{}: {}", context, error_message(cause)),
    LuaError::ExternalError(e) => e.to_string(),
    other => other.to_string(),
  }
}
