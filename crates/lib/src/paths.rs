//! Per-user directories and extension search paths.

use std::path::{Path, PathBuf};

use crate::consts::{APP_NAME, EXTENSION_DIR, EXTENSION_PATH_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> Option<PathBuf> {
  std::env::var_os("APPDATA").map(|appdata| PathBuf::from(appdata).join(APP_NAME))
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> Option<PathBuf> {
  let config_home = std::env::var_os("XDG_CONFIG_HOME")
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|home| home.join(".config")))?;
  Some(config_home.join(APP_NAME))
}

/// Directories searched for script extensions, in priority order:
/// the module's own `extensions/`, each entry of `KILN_EXTENSION_PATH`,
/// then the user's config directory.
pub fn extension_search_path(module_root: &Path) -> Vec<PathBuf> {
  let mut dirs = vec![module_root.join(EXTENSION_DIR)];

  if let Some(extra) = std::env::var_os(EXTENSION_PATH_ENV) {
    dirs.extend(std::env::split_paths(&extra).filter(|p| !p.as_os_str().is_empty()));
  }

  if let Some(config) = config_dir() {
    dirs.push(config.join(EXTENSION_DIR));
  }

  dirs
}
