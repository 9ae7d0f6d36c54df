//! Default bodies for `clean`, `build` and `test`.
//!
//! Modules may override any of them with `kiln.target{}`.

use std::rc::Rc;

use tracing::info;

use super::{BodyError, Target, TargetOrigin};
use crate::consts::{BUILD_TARGET, CLEAN_TARGET, TEST_TARGET};
use crate::context::RunContext;
use crate::testing;

/// Remove the module's build directory.
pub fn clean(ctx: Rc<RunContext>) -> Target {
  Target::new(CLEAN_TARGET, move || {
    let build_dir = ctx.build_dir();
    match std::fs::remove_dir_all(&build_dir) {
      Ok(()) => info!(dir = %build_dir.display(), "removed build directory"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    Ok(())
  })
  .with_description("remove the build directory")
  .with_origin(TargetOrigin::Builtin)
}

/// Always fails: every module supplies its own build.
pub fn build() -> Target {
  Target::new(BUILD_TARGET, || Err(BodyError::NotImplemented(BUILD_TARGET.to_string())))
    .with_description("build the module (must be defined by the module)")
    .with_origin(TargetOrigin::Builtin)
}

/// Discover and run the module's test files.
pub fn test(ctx: Rc<RunContext>) -> Target {
  Target::new(TEST_TARGET, move || {
    let summary = testing::run_tests(&ctx)?;
    let success = summary.success();
    let failed_suites = summary.suites.failed;
    let failed_cases = summary.cases.failed;
    ctx.record_test_summary(summary);

    if success {
      Ok(())
    } else {
      Err(BodyError::TestsFailed {
        failed_suites,
        failed_cases,
      })
    }
  })
  .with_description("run the module's tests")
  .with_origin(TargetOrigin::Builtin)
}

/// All built-in targets, in registration order.
pub fn all(ctx: &Rc<RunContext>) -> Vec<Target> {
  vec![clean(ctx.clone()), build(), test(ctx.clone())]
}
