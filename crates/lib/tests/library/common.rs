//! Shared helpers: temp modules and a recording observer.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use kiln_lib::observer::RunObserver;
use kiln_lib::target::ExecutedTarget;
use kiln_lib::testing::FileReport;
use kiln_lib::{Engine, EngineError};
use tempfile::TempDir;

/// A module directory written to a temp dir.
pub struct TestModule {
  pub temp: TempDir,
}

impl TestModule {
  pub fn new(module_lua: &str) -> Self {
    let module = Self {
      temp: TempDir::new().unwrap(),
    };
    module.write_file("module.lua", module_lua);
    module
  }

  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn build_path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join("build").join(relative_path)
  }

  pub fn read_build_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.build_path(relative_path)).unwrap()
  }

  pub fn json_report(&self) -> serde_json::Value {
    serde_json::from_str(&self.read_build_file("test-report.json")).unwrap()
  }
}

/// Records every observer event.
#[derive(Default)]
pub struct RecordingObserver {
  pub started: RefCell<Vec<String>>,
  pub finished: RefCell<Vec<(String, bool)>>,
  pub files: RefCell<Vec<FileReport>>,
}

impl RunObserver for RecordingObserver {
  fn target_started(&self, name: &str) {
    self.started.borrow_mut().push(name.to_string());
  }

  fn target_finished(&self, name: &str, _duration: Duration, success: bool) {
    self.finished.borrow_mut().push((name.to_string(), success));
  }

  fn test_file_finished(&self, report: &FileReport) {
    self.files.borrow_mut().push(report.clone());
  }
}

impl RecordingObserver {
  pub fn started(&self) -> Vec<String> {
    self.started.borrow().clone()
  }

  pub fn file(&self, name: &str) -> FileReport {
    self
      .files
      .borrow()
      .iter()
      .find(|f| f.file == name)
      .cloned()
      .unwrap_or_else(|| panic!("no report for {}", name))
  }
}

pub type RunResult = Result<Vec<ExecutedTarget>, EngineError>;

/// Load and run the module, returning the result and the recorded events.
pub fn run(module: &TestModule, argv: &[&str]) -> (RunResult, Rc<RecordingObserver>) {
  let observer = Rc::new(RecordingObserver::default());
  let result = Engine::load(module.path(), argv, observer.clone()).and_then(|engine| engine.run());
  (result, observer)
}
