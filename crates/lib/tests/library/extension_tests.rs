//! Capability extensions as modules and tests see them.

use kiln_lib::EngineError;
use serial_test::serial;

use super::common::{TestModule, run};

#[test]
fn extension_initializes_once() {
  let module = TestModule::new(
    r#"
local first = kiln.load("counter")
kiln.target {
  name = "build",
  run = function()
    local again = kiln.load("counter")
    return again == first and counter_inits == 1
  end,
}
kiln.target {
  name = "package",
  deps = { "build" },
  run = function() return kiln.load("counter").value() == 1 end,
}
"#,
  );
  module.write_file(
    "extensions/counter.lua",
    r#"
counter_inits = (counter_inits or 0) + 1
local M = {}
function M.value() return counter_inits end
return M
"#,
  );

  let (result, _) = run(&module, &["package"]);
  assert_eq!(result.unwrap().len(), 2);
}

#[test]
fn extension_is_shared_with_test_files() {
  let module = TestModule::new(
    r#"
local counter = kiln.load("counter")
kiln.target { name = "build", run = function() counter.bump() end }
"#,
  );
  module.write_file(
    "extensions/counter.lua",
    r#"
local fs = kiln.load("fs")
local log = kiln.build_dir .. "/inits.log"
fs.write(log, (fs.exists(log) and fs.read(log) or "") .. "init\n")
local M = { bumps = 0 }
function M.bump() M.bumps = M.bumps + 1 end
return M
"#,
  );
  module.write_file(
    "tests/a.lua",
    r#"function test_sees_build() assert(kiln.load("counter").bumps == 1) end"#,
  );
  module.write_file(
    "tests/b.lua",
    r#"function test_sees_build() assert(kiln.load("counter").bumps == 1) end"#,
  );

  let (result, _) = run(&module, &["build", "test"]);
  result.unwrap();
  assert_eq!(module.read_build_file("inits.log"), "init\n");
}

#[test]
fn extension_without_return_exports_empty_table() {
  let module = TestModule::new(
    r#"
kiln.target { name = "build", run = function() return next(kiln.load("quiet")) == nil end }
"#,
  );
  module.write_file("extensions/quiet.lua", "local x = 1\n");

  let (result, _) = run(&module, &["build"]);
  result.unwrap();
}

#[test]
fn circular_extension_fails_the_module() {
  let module = TestModule::new(r#"kiln.load("a")"#);
  module.write_file("extensions/a.lua", r#"return kiln.load("b")"#);
  module.write_file("extensions/b.lua", r#"return kiln.load("a")"#);

  let (result, _) = run(&module, &["build"]);
  let err = result.unwrap_err();
  assert!(matches!(err, EngineError::Module(_)));
  assert!(err.to_string().contains("circular extension load: a -> b -> a"), "{}", err);
}

#[test]
fn missing_extension_in_target_is_a_failure() {
  let module = TestModule::new(r#"kiln.target { name = "build", run = function() kiln.load("signer") end }"#);

  let (result, _) = run(&module, &["build"]);
  let err = result.unwrap_err();
  assert_eq!(err.exit_code(), 1);
  assert!(err.to_string().contains("extension 'signer' not found"), "{}", err);
}

#[test]
fn builtins_take_precedence_over_scripts() {
  let module = TestModule::new(
    r#"
kiln.target { name = "build", run = function() return type(kiln.load("path").join) == "function" end }
"#,
  );
  module.write_file("extensions/path.lua", "return {}");

  let (result, _) = run(&module, &["build"]);
  result.unwrap();
}

#[test]
#[serial]
fn extension_path_env_is_searched_after_module_dir() {
  let shared = tempfile::TempDir::new().unwrap();
  std::fs::write(shared.path().join("scan.lua"), r#"return { origin = "shared" }"#).unwrap();
  std::fs::write(shared.path().join("sign.lua"), r#"return { origin = "shared" }"#).unwrap();

  let module = TestModule::new(
    r#"
kiln.target {
  name = "build",
  run = function()
    return kiln.load("scan").origin == "shared" and kiln.load("sign").origin == "local"
  end,
}
"#,
  );
  module.write_file("extensions/sign.lua", r#"return { origin = "local" }"#);

  temp_env::with_var("KILN_EXTENSION_PATH", Some(shared.path()), || {
    let (result, _) = run(&module, &["build"]);
    result.unwrap();
  });
}

#[cfg(unix)]
#[test]
fn sh_extension_runs_in_module_root() {
  let module = TestModule::new(
    r#"
local sh = kiln.load("sh")
kiln.target {
  name = "build",
  run = function()
    local result = sh.run("pwd; exit 4")
    assert(result.code == 4 and not result.ok, "unexpected exit")
    assert(sh.exec("printf ' hi \n'") == "hi")
    sh.exec("touch made-by-sh")
  end,
}
"#,
  );

  let (result, _) = run(&module, &["build"]);
  result.unwrap();
  assert!(module.path().join("made-by-sh").is_file());
}
