//! Implementation of `kiln --show-plan`.

use std::path::Path;
use std::rc::Rc;

use anyhow::Result;

use kiln_lib::Engine;
use kiln_lib::observer::NoopObserver;

use crate::output::symbols;

pub fn cmd_plan(module_dir: &Path, args: &[String]) -> Result<()> {
  let engine = Engine::load(module_dir, args, Rc::new(NoopObserver))?;
  let order = engine.plan()?;

  println!("Plan: {}", engine.requested().join(" "));
  for (i, name) in order.iter().enumerate() {
    println!("  {} {}. {}", symbols::ARROW, i + 1, name);
  }
  Ok(())
}
