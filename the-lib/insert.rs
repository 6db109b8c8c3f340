//! Replacing a span of a surface with plain text.
//!
//! Plain fields use one atomic replace-range primitive. Rich surfaces try
//! three strategies in order, each only after the previous one failed:
//!
//! 1. [`Strategy::InputEvents`]: cancelable `beforeinput` on the nearest
//!    element, the replacement, then `input` so page frameworks observe it;
//! 2. [`Strategy::DirectMutation`]: the same tree replacement without events;
//! 3. [`Strategy::LegacyCommand`]: the platform's insert-text command over a
//!    native selection placed on the span.
//!
//! A failed call is never retried here; a partially mutated tree would risk
//! inserting twice.

use std::fmt;

use smallvec::SmallVec;
use thiserror::Error;
use tracing::{
  debug,
  warn,
};

use crate::{
  content::normalize_line_endings,
  host::{
    Disposition,
    EventTarget,
    HostPage,
    InputEvent,
  },
  range::{
    self,
    NotFound,
  },
  surface::{
    EditableSurface,
    FieldKind,
    Page,
    PlainField,
    RichSurface,
    SurfaceId,
    strip_line_breaks,
  },
  tree::{
    TreeError,
    TreeRange,
  },
};

/// Which part of the surface gets replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
  /// Explicit char offsets into the surface's linear text.
  Offsets { start: usize, end: usize },
  /// Whatever the live selection covers.
  Caret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionTarget {
  pub surface: SurfaceId,
  pub span:    Span,
}

impl InsertionTarget {
  pub fn offsets(surface: SurfaceId, start: usize, end: usize) -> Self {
    Self {
      surface,
      span: Span::Offsets { start, end },
    }
  }

  pub fn caret(surface: SurfaceId) -> Self {
    Self {
      surface,
      span: Span::Caret,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  ReplaceRange,
  InputEvents,
  DirectMutation,
  LegacyCommand,
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::ReplaceRange => "replace-range",
      Self::InputEvents => "input-events",
      Self::DirectMutation => "direct-mutation",
      Self::LegacyCommand => "legacy-command",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
  pub strategy:  Strategy,
  /// Caret offset right after the inserted content.
  pub new_caret: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageFailure {
  #[error("no element encloses the span")]
  NoElementAncestor,
  #[error("beforeinput was canceled")]
  Canceled,
  #[error(transparent)]
  Tree(#[from] TreeError),
  #[error("insert-text command was rejected")]
  CommandRejected,
}

pub type Failures = SmallVec<[(Strategy, StageFailure); 3]>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InsertError {
  #[error("surface is gone")]
  MissingSurface,
  #[error("surface has no caret")]
  NoCaret,
  #[error("span {start}..{end} is outside a value of {len} chars")]
  OutOfBounds { start: usize, end: usize, len: usize },
  #[error(transparent)]
  NotFound(#[from] NotFound),
  #[error("every insertion strategy failed: {}", describe(.failures))]
  Exhausted { failures: Failures },
}

fn describe(failures: &Failures) -> String {
  failures
    .iter()
    .map(|(strategy, failure)| format!("{strategy}: {failure}"))
    .collect::<Vec<_>>()
    .join("; ")
}

pub type Result<T> = std::result::Result<T, InsertError>;

/// Replaces the target span of a surface in `page` with `content`.
pub fn insert(
  page: &mut Page,
  target: &InsertionTarget,
  content: &str,
  host: &dyn HostPage,
) -> Result<Inserted> {
  let content = normalize_line_endings(content);
  let surface = page
    .get_mut(target.surface)
    .ok_or(InsertError::MissingSurface)?;
  match surface {
    EditableSurface::PlainField(field) => {
      insert_plain(target.surface, field, target.span, &content, host)
    },
    EditableSurface::RichSurface(rich) => {
      insert_rich(target.surface, rich, target.span, &content, host)
    },
  }
}

fn insert_plain(
  id: SurfaceId,
  field: &mut PlainField,
  span: Span,
  content: &str,
  host: &dyn HostPage,
) -> Result<Inserted> {
  let (start, end) = match span {
    Span::Caret => field.selection(),
    Span::Offsets { start, end } => {
      let len = field.len_chars();
      if start > end || end > len {
        return Err(InsertError::OutOfBounds { start, end, len });
      }
      (start, end)
    },
  };

  let stripped;
  let content = match field.kind() {
    FieldKind::SingleLine => {
      stripped = strip_line_breaks(content);
      stripped.as_str()
    },
    FieldKind::MultiLine => content,
  };

  let new_caret = field.replace_range(start, end, content);
  let target = EventTarget::Field(id);
  host.dispatch(target, &InputEvent::input(content));
  host.dispatch(target, &InputEvent::change());
  Ok(Inserted {
    strategy: Strategy::ReplaceRange,
    new_caret,
  })
}

fn insert_rich(
  id: SurfaceId,
  surface: &mut RichSurface,
  span: Span,
  content: &str,
  host: &dyn HostPage,
) -> Result<Inserted> {
  // The live caret is used as is; mapping it through offsets could move a
  // caret at the end of a block into the next one.
  let (range, start) = match span {
    Span::Caret => {
      let range = surface.selection().ok_or(InsertError::NoCaret)?;
      let start = surface
        .tree()
        .linear_offset(range.start)
        .ok_or(InsertError::NoCaret)?;
      (range, start)
    },
    Span::Offsets { start, end } => (range::locate(surface.tree(), start, end)?, start),
  };
  let caret = start + content.chars().filter(|ch| *ch != '\n').count();

  let mut failures = Failures::new();
  for strategy in [
    Strategy::InputEvents,
    Strategy::DirectMutation,
    Strategy::LegacyCommand,
  ] {
    let attempt = match strategy {
      Strategy::InputEvents => via_input_events(id, surface, range, content, host),
      Strategy::DirectMutation => surface.replace(range, content).map_err(StageFailure::from),
      _ => via_legacy_command(surface, range, content, host),
    };
    match attempt {
      Ok(()) => {
        collapse_caret(surface, caret);
        if !failures.is_empty() {
          debug!(%strategy, ?failures, "insertion fell back");
        }
        return Ok(Inserted {
          strategy,
          new_caret: caret,
        });
      },
      Err(failure) => {
        debug!(%strategy, %failure, "insertion strategy failed");
        failures.push((strategy, failure));
      },
    }
  }

  warn!(start, "insertion exhausted every strategy");
  Err(InsertError::Exhausted { failures })
}

/// Leaves the selection collapsed right after the inserted content. Hosts
/// running the legacy command may keep it on the replaced span.
fn collapse_caret(surface: &mut RichSurface, caret: usize) {
  if surface.selection_offsets() == Some((caret, caret)) {
    return;
  }
  match range::locate_caret(surface.tree(), caret) {
    Ok(anchor) => surface.set_selection(Some(TreeRange::collapsed(anchor))),
    Err(err) => debug!(%err, "could not collapse the selection after insertion"),
  }
}

fn via_input_events(
  id: SurfaceId,
  surface: &mut RichSurface,
  range: TreeRange,
  content: &str,
  host: &dyn HostPage,
) -> std::result::Result<(), StageFailure> {
  let element = surface
    .tree()
    .element_ancestor(range.start.node)
    .ok_or(StageFailure::NoElementAncestor)?;
  let target = EventTarget::Element {
    surface: id,
    node:    element,
  };
  if host.dispatch(target, &InputEvent::before_input(content)) == Disposition::Canceled {
    return Err(StageFailure::Canceled);
  }
  surface.replace(range, content)?;
  host.dispatch(target, &InputEvent::input(content));
  Ok(())
}

fn via_legacy_command(
  surface: &mut RichSurface,
  range: TreeRange,
  content: &str,
  host: &dyn HostPage,
) -> std::result::Result<(), StageFailure> {
  let previous = surface.selection();
  surface.set_selection(Some(range));
  if host.exec_insert_text(surface, content) {
    return Ok(());
  }
  surface.set_selection(previous);
  Err(StageFailure::CommandRejected)
}
