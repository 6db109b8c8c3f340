pub mod config;

use std::{
  path::{
    Path,
    PathBuf,
  },
  sync::OnceLock,
};

use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};

const APP_DIR: &str = "the-expander";

/// Marker directory of a workspace-local configuration.
pub const WORKSPACE_DIR: &str = ".expander";

pub const CONFIG_FILE_NAME: &str = "expander.toml";

static CONFIG_FILE: OnceLock<PathBuf> = OnceLock::new();

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();

static STORE_FILE: OnceLock<PathBuf> = OnceLock::new();

pub fn initialize_config_file(specified_file: Option<PathBuf>) {
  let config_file = specified_file.unwrap_or_else(default_config_file);
  ensure_parent_dir(&config_file);
  CONFIG_FILE.set(config_file).ok();
}

pub fn initialize_log_file(specified_file: Option<PathBuf>) {
  let log_file = specified_file.unwrap_or_else(default_log_file);
  ensure_parent_dir(&log_file);
  LOG_FILE.set(log_file).ok();
}

pub fn initialize_store_file(specified_file: Option<PathBuf>) {
  let store_file = specified_file.unwrap_or_else(default_store_file);
  ensure_parent_dir(&store_file);
  STORE_FILE.set(store_file).ok();
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let Ok(rest) = path.strip_prefix("~") else {
    return path.to_path_buf();
  };
  match etcetera::home_dir() {
    Ok(home) => home.join(rest),
    Err(_) => path.to_path_buf(),
  }
}

fn dir_from_env(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).map(|dir| expand_tilde(Path::new(&dir)))
}

fn fallback_dir(err: impl std::fmt::Display) -> PathBuf {
  log::warn!("no home directory ({err}), falling back to the working directory");
  current_working_dir().join(APP_DIR)
}

pub fn config_dir() -> PathBuf {
  if let Some(dir) = dir_from_env("EXPANDER_CONFIG_DIR") {
    return dir;
  }
  match choose_base_strategy() {
    Ok(strategy) => strategy.config_dir().join(APP_DIR),
    Err(err) => fallback_dir(err),
  }
}

pub fn cache_dir() -> PathBuf {
  if let Some(dir) = dir_from_env("EXPANDER_CACHE_DIR") {
    return dir;
  }
  match choose_base_strategy() {
    Ok(strategy) => strategy.cache_dir().join(APP_DIR),
    Err(err) => fallback_dir(err),
  }
}

pub fn data_dir() -> PathBuf {
  if let Some(dir) = dir_from_env("EXPANDER_DATA_DIR") {
    return dir;
  }
  match choose_base_strategy() {
    Ok(strategy) => strategy.data_dir().join(APP_DIR),
    Err(err) => fallback_dir(err),
  }
}

pub fn config_file() -> PathBuf {
  CONFIG_FILE
    .get_or_init(|| {
      let path = default_config_file();
      ensure_parent_dir(&path);
      path
    })
    .clone()
}

pub fn log_file() -> PathBuf {
  LOG_FILE
    .get_or_init(|| {
      let path = default_log_file();
      ensure_parent_dir(&path);
      path
    })
    .clone()
}

/// JSON file backing the durable store of the CLI.
pub fn store_file() -> PathBuf {
  STORE_FILE
    .get_or_init(|| {
      let path = default_store_file();
      ensure_parent_dir(&path);
      path
    })
    .clone()
}

pub fn workspace_config_file() -> PathBuf {
  find_workspace().0.join(WORKSPACE_DIR).join(CONFIG_FILE_NAME)
}

pub fn default_log_file() -> PathBuf {
  cache_dir().join("expander.log")
}

fn default_config_file() -> PathBuf {
  config_dir().join(CONFIG_FILE_NAME)
}

fn default_store_file() -> PathBuf {
  data_dir().join("store.json")
}

/// Merges `right` onto `left`.
///
/// Tables present on both sides are merged key by key up to `merge_depth`
/// levels; below that, and for every other kind of value, `right` wins.
pub fn merge_toml_values(left: toml::Value, right: toml::Value, merge_depth: usize) -> toml::Value {
  use toml::Value;

  match (left, right) {
    (Value::Table(mut left_map), Value::Table(right_map)) if merge_depth > 0 => {
      for (key, rvalue) in right_map {
        let merged = match left_map.remove(&key) {
          Some(lvalue) => merge_toml_values(lvalue, rvalue, merge_depth - 1),
          None => rvalue,
        };
        left_map.insert(key, merged);
      }
      Value::Table(left_map)
    },
    (_, value) => value,
  }
}

fn current_working_dir() -> PathBuf {
  std::env::current_dir().unwrap_or_default()
}

/// Finds the workspace enclosing the working directory.
///
/// Returns the first ancestor holding `.git`, `.jj` or `.expander` and
/// `false`, or the working directory itself and `true` when none does.
pub fn find_workspace() -> (PathBuf, bool) {
  find_workspace_in(current_working_dir())
}

pub fn find_workspace_in(dir: impl AsRef<Path>) -> (PathBuf, bool) {
  let dir = dir.as_ref();
  for ancestor in dir.ancestors() {
    if [".git", ".jj", WORKSPACE_DIR]
      .iter()
      .any(|marker| ancestor.join(marker).exists())
    {
      return (ancestor.to_owned(), false);
    }
  }

  (dir.to_owned(), true)
}

fn ensure_parent_dir(path: &Path) {
  if let Some(parent) = path.parent()
    && !parent.exists()
  {
    std::fs::create_dir_all(parent).ok();
  }
}
