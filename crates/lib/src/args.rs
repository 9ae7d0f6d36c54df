//! Command-line classification into parameters, flags and target names.
//!
//! Recognition rules, checked in order:
//! - `-P<key>=<value>` sets a parameter (last occurrence wins)
//! - `--<name>` sets a flag
//! - any other argument starting with `-` is an error
//! - everything else is a target name
//!
//! Target names are normalized and de-duplicated in first-seen order. When no
//! target is given the list defaults to `build`.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::consts::DEFAULT_TARGET;
use crate::target::normalize_name;

/// Errors raised while classifying arguments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
  /// An argument starts with `-` but is neither a parameter nor a flag.
  #[error("unrecognized option '{0}' (expected -P<key>=<value> or --<flag>)")]
  UnknownOption(String),

  /// `--` with nothing after it.
  #[error("empty flag name")]
  EmptyFlag,
}

/// Named string parameters supplied as `-P<key>=<value>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  /// Set or overwrite a parameter.
  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.0.insert(key.into(), value.into());
  }

  pub fn remove(&mut self, key: &str) -> Option<String> {
    self.0.remove(key)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Active boolean flags, stored without the leading `--`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags(BTreeSet<String>);

impl Flags {
  /// Whether `name` is active. Accepts the name with or without `--`.
  pub fn contains(&self, name: &str) -> bool {
    self.0.contains(strip_flag_prefix(name))
  }

  pub fn insert(&mut self, name: &str) {
    self.0.insert(strip_flag_prefix(name).to_string());
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<'a> FromIterator<&'a str> for Flags {
  fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
    let mut flags = Flags::default();
    for name in iter {
      flags.insert(name);
    }
    flags
  }
}

/// Strip a leading `--` from a flag name.
pub fn strip_flag_prefix(name: &str) -> &str {
  name.strip_prefix("--").unwrap_or(name)
}

/// The classified command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub params: Params,
  pub flags: Flags,
  /// Normalized target names in request order, without duplicates.
  pub targets: Vec<String>,
}

impl Invocation {
  /// Classify the raw argument list.
  pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, ArgsError> {
    let mut params = Params::default();
    let mut flags = Flags::default();
    let mut targets: Vec<String> = Vec::new();

    for arg in args {
      let arg = arg.as_ref();

      if let Some((key, value)) = parse_param(arg) {
        params.set(key, value);
      } else if let Some(name) = arg.strip_prefix("--") {
        if name.is_empty() {
          return Err(ArgsError::EmptyFlag);
        }
        flags.insert(name);
      } else if arg.starts_with('-') {
        return Err(ArgsError::UnknownOption(arg.to_string()));
      } else {
        let name = normalize_name(arg);
        if !targets.contains(&name) {
          targets.push(name);
        }
      }
    }

    if targets.is_empty() {
      targets.push(DEFAULT_TARGET.to_string());
    }

    Ok(Self {
      params,
      flags,
      targets,
    })
  }
}

/// Match `-P<key>=<value>` with a non-empty key.
fn parse_param(arg: &str) -> Option<(&str, &str)> {
  let rest = arg.strip_prefix("-P")?;
  let (key, value) = rest.split_once('=')?;
  if key.is_empty() {
    return None;
  }
  Some((key, value))
}
