use std::{
  fs,
  path::Path,
  sync::Arc,
  time::Duration,
};

use anyhow::{
  Context,
  Result,
};
use parking_lot::Mutex;
use serde_json::Value;
use the_expander::{
  Collaborators,
  Outcome,
  Session,
  SharedPage,
  config::Config,
  session,
};
use the_lib::{
  position,
  store::{
    FileStore,
    MemoryStore,
    Store,
    keys,
  },
  surface::{
    FieldKind,
    Page,
    PlainField,
    RichSurface,
    SurfaceId,
    SurfaceIdentity,
  },
  tree::{
    Anchor,
    ContentTree,
    TreeRange,
  },
};
use tokio::sync::broadcast::error::TryRecvError;

use crate::cli::{
  CliOptions,
  SurfaceKind,
};

/// Slack after the last keystroke on top of the detection debounce.
const SETTLE: Duration = Duration::from_millis(200);

pub struct Report {
  pub text:     String,
  pub caret:    Option<usize>,
  pub outcomes: Vec<Outcome>,
}

fn build_page(kind: SurfaceKind) -> Result<(Page, SurfaceId)> {
  let mut page = Page::new();
  let identity = SurfaceIdentity::new(format!("body/{kind}[0]"));
  let id = match kind {
    SurfaceKind::Input => page.add(identity, PlainField::new(FieldKind::SingleLine, "")),
    SurfaceKind::Textarea => page.add(identity, PlainField::new(FieldKind::MultiLine, "")),
    SurfaceKind::Rich => {
      let mut tree = ContentTree::new("div");
      let paragraph = tree.append_element(tree.root(), "p")?;
      let mut surface = RichSurface::new(tree);
      surface.set_selection(Some(TreeRange::collapsed(Anchor::new(paragraph, 0))));
      page.add(identity, surface)
    },
  };
  page.focus(id);
  Ok((page, id))
}

/// The durable store at `store_file`, or a process-local one. Only a given
/// path touches the data directory.
pub fn open_store(store_file: Option<&Path>) -> Result<Arc<dyn Store>> {
  let Some(path) = store_file else {
    return Ok(Arc::new(MemoryStore::new()));
  };
  the_expander_loader::initialize_store_file(Some(path.to_path_buf()));
  let store =
    FileStore::open(path).with_context(|| format!("failed to open {}", path.display()))?;
  Ok(Arc::new(store))
}

pub fn load_library(store: &dyn Store, path: &Path) -> Result<()> {
  let contents =
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let library: Value = serde_json::from_str(&contents)
    .with_context(|| format!("{} is not valid JSON", path.display()))?;
  if !library.is_object() {
    anyhow::bail!("{} must hold a JSON object of shortcuts", path.display());
  }
  store.set(keys::LIBRARY, library)?;
  Ok(())
}

/// Types `options.text` into a fresh surface with a live session and reports
/// where the surface ended up.
pub async fn run(options: &CliOptions, config: Config, store: Arc<dyn Store>) -> Result<Report> {
  if let Some(library) = &options.library {
    load_library(store.as_ref(), library)?;
  }
  store.set(keys::SESSION, Value::Bool(true))?;

  let (page, surface) = build_page(options.surface)?;
  let page: SharedPage = Arc::new(Mutex::new(page));
  let settle = config.pipeline.detect_debounce() + SETTLE;
  let session = Arc::new(Mutex::new(Session::new(
    page.clone(),
    Collaborators::new(store.clone()),
    config,
  )));
  session.lock().sync();
  let watcher = session::watch(session.clone());

  let mut outcomes = session
    .lock()
    .orchestrator()
    .map(|orchestrator| orchestrator.subscribe())
    .context("session did not activate")?;

  for ch in options.text.chars() {
    {
      let mut page = page.lock();
      if let Some(live) = page.get_mut(surface) {
        live.type_text(ch.encode_utf8(&mut [0; 4]))?;
      }
    }
    session.lock().on_edit();
    tokio::time::sleep(options.key_delay).await;
  }
  tokio::time::sleep(settle).await;

  let mut seen = Vec::new();
  loop {
    match outcomes.try_recv() {
      Ok(outcome) => seen.push(outcome),
      Err(TryRecvError::Lagged(skipped)) => log::warn!("{skipped} outcomes were not reported"),
      Err(_) => break,
    }
  }

  session.lock().apply(false);
  watcher.abort();

  let page = page.lock();
  let live = page.get(surface).context("surface vanished")?;
  Ok(Report {
    text:     live.text(),
    caret:    position::capture(live).map(|snapshot| snapshot.start),
    outcomes: seen,
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn options(surface: SurfaceKind, text: &str) -> CliOptions {
    CliOptions {
      verbosity: 0,
      log_file: None,
      log_stderr: false,
      config_file: None,
      library: None,
      store_file: None,
      surface,
      text: text.into(),
      key_delay: Duration::from_millis(20),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn replays_into_each_surface_kind() {
    for kind in [SurfaceKind::Input, SurfaceKind::Textarea, SurfaceKind::Rich] {
      let store = Arc::new(MemoryStore::new());
      store
        .set(keys::LIBRARY, json!({ "/hi": { "body": "Hi there" } }))
        .unwrap();
      let report = run(&options(kind, "oh /hi"), Config::default(), store)
        .await
        .unwrap();
      assert_eq!(report.text, "oh Hi there", "{kind}");
      assert_eq!(report.caret, Some(11), "{kind}");
      assert!(matches!(report.outcomes.as_slice(), [Outcome::Inserted { .. }]));
    }
  }

  #[test]
  fn store_file_is_only_used_when_given() {
    let store = open_store(None).unwrap();
    store.set(keys::SESSION, json!(true)).unwrap();
    assert_eq!(store.get(keys::SESSION), Some(json!(true)));

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nested").join("store.json");
    let store = open_store(Some(&file)).unwrap();
    store.set(keys::SESSION, json!(true)).unwrap();
    assert!(file.exists());
  }

  #[test]
  fn library_must_be_an_object() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("library.json");
    fs::write(&file, "[1, 2]").unwrap();
    let store = MemoryStore::new();
    assert!(load_library(&store, &file).is_err());

    fs::write(&file, r#"{ "/sig": { "body": "Regards" } }"#).unwrap();
    load_library(&store, &file).unwrap();
    assert!(store.get(keys::LIBRARY).is_some());
  }
}
