use std::{
  path::Path,
  str::from_utf8,
};

use eyre::{
  Context,
  Result,
};

/// Built-in `expander.toml`.
pub fn default_config() -> Result<toml::Value> {
  let default_config = include_bytes!("expander.toml");
  let config_str =
    from_utf8(default_config).context("built-in expander.toml contains invalid UTF-8")?;
  toml::from_str(config_str).context("failed to parse built-in expander.toml")
}

/// The user file and the workspace file merged onto the built-in defaults.
/// Missing files are skipped.
pub fn user_config() -> Result<toml::Value> {
  merged_config([crate::config_file(), crate::workspace_config_file()])
}

/// Merges every readable file in `files`, in order, onto the defaults.
pub fn merged_config(files: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<toml::Value> {
  let default = default_config()?;

  let layers = files
    .into_iter()
    .filter_map(|file| {
      let file = file.as_ref();
      std::fs::read_to_string(file)
        .ok()
        .map(|contents| {
          toml::from_str::<toml::Value>(&contents)
            .with_context(|| format!("failed to parse {}", file.display()))
        })
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(
    layers
      .into_iter()
      .fold(default, |merged, layer| crate::merge_toml_values(merged, layer, 3)),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_parse() {
    let config = default_config().unwrap();
    assert_eq!(
      config
        .get("pipeline")
        .and_then(|pipeline| pipeline.get("detect-debounce-ms"))
        .and_then(toml::Value::as_integer),
      Some(500)
    );
  }

  #[test]
  fn later_files_win() {
    let dir = tempfile::tempdir().unwrap();
    let user = dir.path().join("user.toml");
    let workspace = dir.path().join("workspace.toml");
    std::fs::write(&user, "[cache]\nttl-ms = 1000\n[matcher]\nmin-len = 4").unwrap();
    std::fs::write(&workspace, "[cache]\nttl-ms = 250").unwrap();

    let config = merged_config([user, workspace, dir.path().join("missing.toml")]).unwrap();
    let get = |table: &str, key: &str| {
      config
        .get(table)
        .and_then(|table| table.get(key))
        .and_then(toml::Value::as_integer)
    };
    assert_eq!(get("cache", "ttl-ms"), Some(250));
    assert_eq!(get("matcher", "min-len"), Some(4));
    assert_eq!(get("matcher", "max-suffix-len"), Some(20));
  }

  #[test]
  fn malformed_files_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "[cache\nttl-ms = ").unwrap();
    assert!(merged_config([bad]).is_err());
  }
}
