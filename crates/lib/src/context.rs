//! Per-run state.
//!
//! A [`RunContext`] owns everything one invocation shares: the module location
//! and settings, parameters, flags, the progress observer, the extension
//! registry and the Lua state scripts run in. Nothing here is global, so
//! independent runs (including tests of the engine) never interfere.
//!
//! A [`Scope`] is the working directory and environment overlay scripts see.
//! The run has one active scope; it holds the module root while targets run
//! and is swapped for a test file's scratch scope while that file runs.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use mlua::Lua;

use crate::args::{Flags, Params};
use crate::consts::{DEFAULT_BUILD_DIR, DEFAULT_TEST_DIR};
use crate::extension::ExtensionLoader;
use crate::observer::RunObserver;
use crate::paths;
use crate::testing::TestRunSummary;

/// Settings a module may override through `kiln.module{}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSettings {
  pub name: String,
  pub build_dir: PathBuf,
  pub test_dir: PathBuf,
}

impl ModuleSettings {
  pub fn for_root(root: &Path) -> Self {
    let name = root
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "module".to_string());
    Self {
      name,
      build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
      test_dir: PathBuf::from(DEFAULT_TEST_DIR),
    }
  }
}

pub struct RunContext {
  root: PathBuf,
  settings: RefCell<ModuleSettings>,
  params: Rc<RefCell<Params>>,
  flags: Flags,
  scope: SharedScope,
  extensions: Rc<ExtensionLoader>,
  lua: RefCell<Option<Lua>>,
  observer: Rc<dyn RunObserver>,
  test_summary: RefCell<Option<TestRunSummary>>,
}

impl RunContext {
  pub fn new(root: PathBuf, params: Params, flags: Flags, observer: Rc<dyn RunObserver>) -> Self {
    let settings = ModuleSettings::for_root(&root);
    let scope = Scope::new(&root).into_shared();
    let extensions = Rc::new(ExtensionLoader::new(paths::extension_search_path(&root), scope.clone()));
    Self {
      root,
      settings: RefCell::new(settings),
      params: Rc::new(RefCell::new(params)),
      flags,
      scope,
      extensions,
      lua: RefCell::new(None),
      observer,
      test_summary: RefCell::new(None),
    }
  }

  /// Absolute module root.
  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn settings(&self) -> Ref<'_, ModuleSettings> {
    self.settings.borrow()
  }

  pub fn update_settings(&self, update: impl FnOnce(&mut ModuleSettings)) {
    update(&mut self.settings.borrow_mut());
  }

  pub fn module_name(&self) -> String {
    self.settings.borrow().name.clone()
  }

  pub fn build_dir(&self) -> PathBuf {
    self.root.join(&self.settings.borrow().build_dir)
  }

  pub fn test_dir(&self) -> PathBuf {
    self.root.join(&self.settings.borrow().test_dir)
  }

  /// The parameter table shared with the module's Lua state.
  pub fn params(&self) -> Rc<RefCell<Params>> {
    self.params.clone()
  }

  pub fn param(&self, key: &str) -> Option<String> {
    self.params.borrow().get(key).map(str::to_string)
  }

  pub fn flags(&self) -> &Flags {
    &self.flags
  }

  pub fn extension_dirs(&self) -> &[PathBuf] {
    self.extensions.search_dirs()
  }

  /// The run's extension registry. Every script of the run loads through it.
  pub fn extensions(&self) -> Rc<ExtensionLoader> {
    self.extensions.clone()
  }

  /// The active scope.
  pub fn scope(&self) -> SharedScope {
    self.scope.clone()
  }

  /// Run `f` with `scope` active and a copy of the parameters, restoring both afterwards.
  pub fn isolated<R>(&self, scope: Scope, f: impl FnOnce() -> R) -> R {
    let previous_scope = self.scope.replace(scope);
    let previous_params = self.params.borrow().clone();
    let result = f();
    *self.params.borrow_mut() = previous_params;
    *self.scope.borrow_mut() = previous_scope;
    result
  }

  /// The Lua state attached to this run, if any.
  pub fn lua(&self) -> Option<Lua> {
    self.lua.borrow().clone()
  }

  pub fn attach_lua(&self, lua: Lua) {
    *self.lua.borrow_mut() = Some(lua);
  }

  pub fn observer(&self) -> &dyn RunObserver {
    self.observer.as_ref()
  }

  /// Summary of the last `test` run in this context.
  pub fn test_summary(&self) -> Option<TestRunSummary> {
    self.test_summary.borrow().clone()
  }

  pub fn record_test_summary(&self, summary: TestRunSummary) {
    *self.test_summary.borrow_mut() = Some(summary);
  }
}

impl std::fmt::Debug for RunContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RunContext")
      .field("root", &self.root)
      .field("settings", &self.settings)
      .field("params", &self.params)
      .field("flags", &self.flags)
      .field("extension_dirs", &self.extension_dirs())
      .field("scope", &self.scope)
      .finish_non_exhaustive()
  }
}

/// Working directory and environment overlay of one Lua state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
  workdir: PathBuf,
  /// `None` marks a variable removed for child processes.
  env: BTreeMap<String, Option<String>>,
  default_timeout: Option<Duration>,
}

pub type SharedScope = Rc<RefCell<Scope>>;

impl Scope {
  pub fn new(workdir: impl Into<PathBuf>) -> Self {
    Self {
      workdir: workdir.into(),
      env: BTreeMap::new(),
      default_timeout: None,
    }
  }

  pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.default_timeout = timeout;
    self
  }

  pub fn into_shared(self) -> SharedScope {
    Rc::new(RefCell::new(self))
  }

  pub fn workdir(&self) -> &Path {
    &self.workdir
  }

  /// Resolve `path` against the working directory.
  pub fn resolve(&self, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.workdir.join(path)
    }
  }

  /// Change the working directory. Relative paths resolve against the current one.
  pub fn chdir(&mut self, path: &str) -> std::io::Result<()> {
    let target = self.resolve(path);
    if !target.is_dir() {
      return Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("not a directory: {}", target.display()),
      ));
    }
    self.workdir = dunce::canonicalize(&target).unwrap_or(target);
    Ok(())
  }

  /// Overlay value first, then the process environment.
  pub fn getenv(&self, key: &str) -> Option<String> {
    match self.env.get(key) {
      Some(value) => value.clone(),
      None => std::env::var(key).ok(),
    }
  }

  pub fn setenv(&mut self, key: &str, value: Option<String>) {
    self.env.insert(key.to_string(), value);
  }

  pub fn env_overlay(&self) -> &BTreeMap<String, Option<String>> {
    &self.env
  }

  pub fn default_timeout(&self) -> Option<Duration> {
    self.default_timeout
  }
}
