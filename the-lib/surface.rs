//! Editable surfaces and the page that hosts them.
//!
//! A surface is either a [`PlainField`] (linear buffer with native selection
//! offsets) or a [`RichSurface`] (content tree with boundary-point selection).
//! Components that behave differently per kind match on [`EditableSurface`]
//! exactly once.

use std::fmt;

use ropey::Rope;
use serde::{
  Deserialize,
  Serialize,
};
use slotmap::{
  SlotMap,
  new_key_type,
};

use crate::{
  range::{
    self,
    NotFound,
  },
  tree::{
    ContentTree,
    TreeError,
    TreeRange,
  },
};

new_key_type! {
  pub struct SurfaceId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  /// `<input>`-like: line breaks are stripped from inserted text.
  SingleLine,
  /// `<textarea>`-like.
  MultiLine,
}

#[derive(Debug, Clone)]
pub struct PlainField {
  kind:            FieldKind,
  value:           Rope,
  selection_start: usize,
  selection_end:   usize,
}

impl PlainField {
  /// Creates a field holding `text` with the caret at its end.
  pub fn new(kind: FieldKind, text: &str) -> Self {
    let value = Rope::from(text);
    let len = value.len_chars();
    Self {
      kind,
      value,
      selection_start: len,
      selection_end: len,
    }
  }

  pub fn kind(&self) -> FieldKind {
    self.kind
  }

  pub fn value(&self) -> &Rope {
    &self.value
  }

  pub fn text(&self) -> String {
    self.value.to_string()
  }

  pub fn len_chars(&self) -> usize {
    self.value.len_chars()
  }

  /// Native selection offsets, ordered and clamped to the value.
  pub fn selection(&self) -> (usize, usize) {
    let len = self.len_chars();
    let start = self.selection_start.min(len);
    let end = self.selection_end.min(len);
    (start.min(end), start.max(end))
  }

  pub fn set_selection(&mut self, start: usize, end: usize) {
    self.selection_start = start;
    self.selection_end = end;
  }

  /// Replaces `start..end` with `text` and collapses the selection after it.
  ///
  /// Returns the new caret offset. Callers validate the offsets.
  pub fn replace_range(&mut self, start: usize, end: usize, text: &str) -> usize {
    let len = self.len_chars();
    let end = end.min(len);
    let start = start.min(end);
    self.value.remove(start..end);
    self.value.insert(start, text);
    let caret = start + text.chars().count();
    self.set_selection(caret, caret);
    caret
  }

  /// Types `text` over the current selection, as a keyboard would.
  pub fn type_text(&mut self, text: &str) {
    let (start, end) = self.selection();
    let text = match self.kind {
      FieldKind::SingleLine => strip_line_breaks(text),
      FieldKind::MultiLine => text.to_string(),
    };
    self.replace_range(start, end, &text);
  }
}

pub(crate) fn strip_line_breaks(text: &str) -> String {
  text.chars().filter(|ch| !matches!(ch, '\n' | '\r')).collect()
}

#[derive(Debug, Clone)]
pub struct RichSurface {
  tree:      ContentTree,
  selection: Option<TreeRange>,
}

impl RichSurface {
  pub fn new(tree: ContentTree) -> Self {
    Self {
      tree,
      selection: None,
    }
  }

  pub fn tree(&self) -> &ContentTree {
    &self.tree
  }

  pub fn tree_mut(&mut self) -> &mut ContentTree {
    &mut self.tree
  }

  pub fn text(&self) -> String {
    self.tree.text()
  }

  pub fn selection(&self) -> Option<TreeRange> {
    self.selection
  }

  pub fn set_selection(&mut self, range: Option<TreeRange>) {
    self.selection = range;
  }

  /// Places the selection over linear offsets `start..end`.
  pub fn select(&mut self, start: usize, end: usize) -> Result<(), NotFound> {
    let range = range::locate(&self.tree, start, end)?;
    self.selection = Some(range);
    Ok(())
  }

  /// Linear offsets of the live selection.
  pub fn selection_offsets(&self) -> Option<(usize, usize)> {
    let range = self.selection?;
    let start = self.tree.linear_offset(range.start)?;
    let end = self.tree.linear_offset(range.end)?;
    Some((start.min(end), start.max(end)))
  }

  /// Replaces the content addressed by `range`, leaving the selection
  /// collapsed after the new text.
  pub fn replace(&mut self, range: TreeRange, text: &str) -> Result<(), TreeError> {
    if !self.tree.is_editable(range.start.node) {
      return Err(TreeError::ReadOnly(range.start.node));
    }
    let at = self.tree.delete_contents(range)?;
    let after = self.tree.insert_text(at, text)?;
    self.selection = Some(TreeRange::collapsed(after));
    Ok(())
  }

  /// Replaces the live selection; this is what native typing and the
  /// platform's insert-text command do.
  pub fn replace_selection(&mut self, text: &str) -> Result<(), TreeError> {
    let range = self.selection.ok_or(TreeError::NoSelection)?;
    self.replace(range, text)
  }
}

#[derive(Debug, Clone)]
pub enum EditableSurface {
  PlainField(PlainField),
  RichSurface(RichSurface),
}

impl EditableSurface {
  pub fn text(&self) -> String {
    match self {
      Self::PlainField(field) => field.text(),
      Self::RichSurface(surface) => surface.text(),
    }
  }

  /// Simulates the user typing at the live caret.
  pub fn type_text(&mut self, text: &str) -> Result<(), TreeError> {
    match self {
      Self::PlainField(field) => {
        field.type_text(text);
        Ok(())
      },
      Self::RichSurface(surface) => surface.replace_selection(text),
    }
  }

  /// Moves the caret to `offset`, as a click would.
  pub fn place_caret(&mut self, offset: usize) -> Result<(), NotFound> {
    match self {
      Self::PlainField(field) => {
        if offset > field.len_chars() {
          return Err(NotFound {
            start: offset,
            end:   offset,
          });
        }
        field.set_selection(offset, offset);
        Ok(())
      },
      Self::RichSurface(surface) => surface.select(offset, offset),
    }
  }
}

impl From<PlainField> for EditableSurface {
  fn from(field: PlainField) -> Self {
    Self::PlainField(field)
  }
}

impl From<RichSurface> for EditableSurface {
  fn from(surface: RichSurface) -> Self {
    Self::RichSurface(surface)
  }
}

/// Structural path of a surface within its page, e.g. `body/form[0]/textarea[1]`.
///
/// Used to revalidate that a persisted span still refers to the surface that
/// currently holds focus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceIdentity(String);

impl SurfaceIdentity {
  pub fn new(path: impl Into<String>) -> Self {
    Self(path.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for SurfaceIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone)]
struct SurfaceEntry {
  identity: SurfaceIdentity,
  surface:  EditableSurface,
}

/// Every editable surface of a page plus the current focus.
#[derive(Debug, Default)]
pub struct Page {
  surfaces: SlotMap<SurfaceId, SurfaceEntry>,
  focused:  Option<SurfaceId>,
}

impl Page {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, identity: SurfaceIdentity, surface: impl Into<EditableSurface>) -> SurfaceId {
    self.surfaces.insert(SurfaceEntry {
      identity,
      surface: surface.into(),
    })
  }

  pub fn remove(&mut self, id: SurfaceId) -> Option<EditableSurface> {
    if self.focused == Some(id) {
      self.focused = None;
    }
    self.surfaces.remove(id).map(|entry| entry.surface)
  }

  pub fn focus(&mut self, id: SurfaceId) -> bool {
    if !self.surfaces.contains_key(id) {
      return false;
    }
    self.focused = Some(id);
    true
  }

  pub fn blur(&mut self) {
    self.focused = None;
  }

  pub fn focused(&self) -> Option<SurfaceId> {
    self.focused.filter(|id| self.surfaces.contains_key(*id))
  }

  pub fn get(&self, id: SurfaceId) -> Option<&EditableSurface> {
    self.surfaces.get(id).map(|entry| &entry.surface)
  }

  pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut EditableSurface> {
    self.surfaces.get_mut(id).map(|entry| &mut entry.surface)
  }

  pub fn identity(&self, id: SurfaceId) -> Option<&SurfaceIdentity> {
    self.surfaces.get(id).map(|entry| &entry.identity)
  }
}
