//! kiln-lib: declarative build orchestration for Lua-scripted modules.
//!
//! A module is a directory with a `module.lua` that declares targets. This crate
//! provides:
//! - `args`: classification of the command line into parameters, flags and targets
//! - `target`: the target registry, dependency resolution and memoized execution
//! - `extension`: capability extensions loaded at most once per Lua state
//! - `testing`: isolated test file execution and reporting
//! - `engine`: the entry point tying these together for one invocation

pub mod args;
pub mod consts;
pub mod context;
pub mod engine;
pub mod extension;
pub mod lua;
pub mod module;
pub mod observer;
pub mod paths;
pub mod target;
pub mod testing;

pub use engine::{Engine, EngineError, TargetInfo, invoke, invoke_with_observer};
