//! The platform behind editable surfaces: event dispatch to page listeners
//! and the legacy editing command.

use crate::{
  surface::{
    RichSurface,
    SurfaceId,
  },
  tree::NodeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEventKind {
  /// Cancelable notification sent before content is inserted.
  BeforeInput,
  /// Sent after the content changed.
  Input,
  /// Sent by plain fields once the change is committed.
  Change,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
  pub kind:       InputEventKind,
  pub input_type: &'static str,
  pub data:       Option<String>,
  pub cancelable: bool,
}

impl InputEvent {
  pub const INSERT_TEXT: &'static str = "insertText";

  pub fn before_input(data: &str) -> Self {
    Self {
      kind:       InputEventKind::BeforeInput,
      input_type: Self::INSERT_TEXT,
      data:       Some(data.to_string()),
      cancelable: true,
    }
  }

  pub fn input(data: &str) -> Self {
    Self {
      kind:       InputEventKind::Input,
      input_type: Self::INSERT_TEXT,
      data:       Some(data.to_string()),
      cancelable: false,
    }
  }

  pub fn change() -> Self {
    Self {
      kind:       InputEventKind::Change,
      input_type: Self::INSERT_TEXT,
      data:       None,
      cancelable: false,
    }
  }
}

/// Whether listeners let the default action happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  Proceed,
  Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
  /// An element inside a rich surface.
  Element { surface: SurfaceId, node: NodeId },
  Field(SurfaceId),
}

pub trait HostPage: Send + Sync {
  /// Delivers `event` to the listeners registered on `target`.
  ///
  /// Non-cancelable events always proceed, whatever this returns.
  fn dispatch(&self, _target: EventTarget, _event: &InputEvent) -> Disposition {
    Disposition::Proceed
  }

  /// The platform's generic insert-text command over the native selection.
  /// Returns `false` when the command is unsupported or refused.
  fn exec_insert_text(&self, surface: &mut RichSurface, text: &str) -> bool {
    surface.replace_selection(text).is_ok()
  }
}

/// A page without listeners and with a working insert-text command.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardHost;

impl HostPage for StandardHost {}
