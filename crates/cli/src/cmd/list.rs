//! Implementation of `kiln --list`.

use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use kiln_lib::Engine;
use kiln_lib::observer::NoopObserver;
use kiln_lib::target::TargetOrigin;

/// Print every registered target with its dependencies and description.
pub fn cmd_list(module_dir: &Path, args: &[String]) -> Result<()> {
  let engine = Engine::load(module_dir, args, Rc::new(NoopObserver))?;

  println!("Module: {}", engine.context().module_name());
  for target in engine.targets() {
    let mut line = format!("  {}", target.name);
    if !target.deps.is_empty() {
      line.push_str(&format!(" <- {}", target.deps.join(", ")));
    }
    if target.origin == TargetOrigin::Builtin {
      line.push_str(" [builtin]");
    }
    println!("{}", line);
    if let Some(description) = &target.description {
      println!(
        "      {}",
        description.if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
  }
  Ok(())
}
