//! Caret tracking across editable surfaces.
//!
//! [`capture`] turns whichever surface holds focus into a [`CursorSnapshot`]:
//! linear selection offsets plus the text on either side of them. Snapshots
//! are immutable and superseded by the next capture.

use serde::{
  Deserialize,
  Serialize,
};

use crate::{
  store::{
    self,
    Store,
    keys,
  },
  surface::{
    EditableSurface,
    PlainField,
    RichSurface,
    SurfaceIdentity,
  },
};

/// Caret/selection state of a surface at one instant.
///
/// Invariants: `start <= end` and `text_before.chars().count() == start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorSnapshot {
  pub start:       usize,
  pub end:         usize,
  pub text_before: String,
  pub text_after:  String,
}

impl CursorSnapshot {
  /// Builds a snapshot over `text`, clamping and ordering the offsets.
  pub fn from_text(text: &str, start: usize, end: usize) -> Self {
    let len = text.chars().count();
    let (start, end) = (start.min(end).min(len), start.max(end).min(len));
    Self {
      start,
      end,
      text_before: text.chars().take(start).collect(),
      text_after: text.chars().skip(end).collect(),
    }
  }

  pub fn is_collapsed(&self) -> bool {
    self.start == self.end
  }

  /// Text between the last line break before the caret and the caret.
  pub fn current_line(&self) -> &str {
    match self.text_before.rfind('\n') {
      Some(idx) => &self.text_before[idx + 1..],
      None => &self.text_before,
    }
  }
}

pub fn capture(surface: &EditableSurface) -> Option<CursorSnapshot> {
  match surface {
    EditableSurface::PlainField(field) => Some(capture_field(field)),
    EditableSurface::RichSurface(surface) => capture_rich(surface),
  }
}

fn capture_field(field: &PlainField) -> CursorSnapshot {
  let (start, end) = field.selection();
  let value = field.value();
  CursorSnapshot {
    start,
    end,
    text_before: value.slice(..start).to_string(),
    text_after: value.slice(end..).to_string(),
  }
}

fn capture_rich(surface: &RichSurface) -> Option<CursorSnapshot> {
  let (start, end) = surface.selection_offsets()?;
  Some(CursorSnapshot::from_text(&surface.text(), start, end))
}

/// Last known caret span, kept in the shared store so that actors outliving
/// the pipeline pass can find the original span again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPosition {
  pub start:   usize,
  pub end:     usize,
  pub surface: SurfaceIdentity,
}

impl PersistedPosition {
  pub fn new(surface: SurfaceIdentity, start: usize, end: usize) -> Self {
    Self {
      start,
      end,
      surface,
    }
  }

  pub fn from_snapshot(surface: SurfaceIdentity, snapshot: &CursorSnapshot) -> Self {
    Self::new(surface, snapshot.start, snapshot.end)
  }

  /// Whether the stored offsets may be trusted against `surface`.
  pub fn matches(&self, surface: &SurfaceIdentity) -> bool {
    &self.surface == surface
  }
}

pub fn persist(store: &dyn Store, position: &PersistedPosition) -> store::Result<()> {
  store::write(store, keys::CARET, position)
}

pub fn load(store: &dyn Store) -> store::Result<Option<PersistedPosition>> {
  store::read(store, keys::CARET)
}
