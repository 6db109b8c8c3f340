//! Durable shared key-value store.
//!
//! The store is the only state shared with actors outside a pipeline pass:
//! the library snapshot written by the sync collaborator, the last caret
//! position, the pending replacement awaiting the popup, and the session
//! flag. Every operation is a single atomic key access; writers notify
//! subscribers through a broadcast channel.

use std::{
  collections::HashMap,
  fs,
  io,
  path::{
    Path,
    PathBuf,
  },
};

use parking_lot::RwLock;
use serde::{
  Serialize,
  de::DeserializeOwned,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// Well-known keys.
pub mod keys {
  /// Library snapshot: an object mapping shortcut names to resolved content.
  pub const LIBRARY: &str = "snippets";
  /// Last tracked caret position.
  pub const CARET: &str = "caretPosition";
  /// Replacement deferred to the structured-field popup.
  pub const PENDING: &str = "pendingShortcut";
  /// Whether the pipeline is allowed to run at all.
  pub const SESSION: &str = "isLoggedIn";
}

const CHANGE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to convert value for key `{key}`: {source}")]
  Serde {
    key:    String,
    #[source]
    source: serde_json::Error,
  },
  #[error(transparent)]
  Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
  pub key:       String,
  pub new_value: Option<Value>,
}

pub trait Store: Send + Sync {
  fn get(&self, key: &str) -> Option<Value>;

  /// The `field` member of the object under `key`, without copying the rest
  /// of the object.
  fn get_field(&self, key: &str, field: &str) -> Option<Value> {
    self.get(key)?.get(field).cloned()
  }

  fn set(&self, key: &str, value: Value) -> Result<()>;
  fn remove(&self, key: &str) -> Result<()>;
  fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

pub fn read<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
  store
    .get(key)
    .map(|value| {
      serde_json::from_value(value).map_err(|source| {
        StoreError::Serde {
          key: key.to_string(),
          source,
        }
      })
    })
    .transpose()
}

pub fn write<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) -> Result<()> {
  let value = serde_json::to_value(value).map_err(|source| {
    StoreError::Serde {
      key: key.to_string(),
      source,
    }
  })?;
  store.set(key, value)
}

fn notify(changes: &broadcast::Sender<StoreChange>, key: &str, new_value: Option<Value>) {
  // No subscriber is not an error.
  let _ = changes.send(StoreChange {
    key: key.to_string(),
    new_value,
  });
}

/// Process-local store.
#[derive(Debug)]
pub struct MemoryStore {
  values:  RwLock<HashMap<String, Value>>,
  changes: broadcast::Sender<StoreChange>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
    Self {
      values: RwLock::new(HashMap::new()),
      changes,
    }
  }
}

impl Store for MemoryStore {
  fn get(&self, key: &str) -> Option<Value> {
    self.values.read().get(key).cloned()
  }

  fn get_field(&self, key: &str, field: &str) -> Option<Value> {
    self.values.read().get(key)?.get(field).cloned()
  }

  fn set(&self, key: &str, value: Value) -> Result<()> {
    self.values.write().insert(key.to_string(), value.clone());
    notify(&self.changes, key, Some(value));
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    if self.values.write().remove(key).is_some() {
      notify(&self.changes, key, None);
    }
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
    self.changes.subscribe()
  }
}

/// Store persisted as a single JSON object on disk.
///
/// The whole object is rewritten on every change; the file is small and
/// changes are rare compared to reads.
#[derive(Debug)]
pub struct FileStore {
  path:    PathBuf,
  values:  RwLock<HashMap<String, Value>>,
  changes: broadcast::Sender<StoreChange>,
}

impl FileStore {
  /// Opens the store at `path`; a missing file is an empty store.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let values = match fs::read_to_string(&path) {
      Ok(contents) if !contents.trim().is_empty() => {
        serde_json::from_str(&contents).map_err(|source| {
          StoreError::Serde {
            key: path.display().to_string(),
            source,
          }
        })?
      },
      Ok(_) => HashMap::new(),
      Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
      Err(err) => return Err(err.into()),
    };
    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
    Ok(Self {
      path,
      values: RwLock::new(values),
      changes,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn flush(&self, values: &HashMap<String, Value>) -> Result<()> {
    let contents = serde_json::to_string_pretty(values).map_err(|source| {
      StoreError::Serde {
        key: self.path.display().to_string(),
        source,
      }
    })?;
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)?;
    }
    fs::write(&self.path, contents)?;
    Ok(())
  }
}

impl Store for FileStore {
  fn get(&self, key: &str) -> Option<Value> {
    self.values.read().get(key).cloned()
  }

  fn get_field(&self, key: &str, field: &str) -> Option<Value> {
    self.values.read().get(key)?.get(field).cloned()
  }

  fn set(&self, key: &str, value: Value) -> Result<()> {
    {
      let mut values = self.values.write();
      values.insert(key.to_string(), value.clone());
      self.flush(&values)?;
    }
    notify(&self.changes, key, Some(value));
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let removed = {
      let mut values = self.values.write();
      let removed = values.remove(key).is_some();
      if removed {
        self.flush(&values)?;
      }
      removed
    };
    if removed {
      notify(&self.changes, key, None);
    }
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
    self.changes.subscribe()
  }
}
