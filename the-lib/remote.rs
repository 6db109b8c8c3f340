//! Interfaces of the collaborators reached over the extension transport.
//!
//! The core only defines what it calls; hosts provide the implementations.
//! Both collaborators may disappear at any time (extension reloaded), which
//! the core treats as a miss rather than an error.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::content::{
  ContentBody,
  ResolvedContent,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
  #[error("extension context is unavailable")]
  Unavailable,
  #[error("request timed out")]
  TimedOut,
  #[error("request failed: {0}")]
  Failed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Resolves a shortcut name that is missing from the local library snapshot.
#[async_trait]
pub trait ShortcutResolver: Send + Sync {
  /// Cheap check performed before every request.
  fn is_available(&self) -> bool {
    true
  }

  async fn fetch_shortcut(&self, name: &str) -> Result<Option<ResolvedContent>>;
}

/// Resolver for hosts without a remote library.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemote;

#[async_trait]
impl ShortcutResolver for NoRemote {
  async fn fetch_shortcut(&self, _name: &str) -> Result<Option<ResolvedContent>> {
    Ok(None)
  }
}

/// Payload of the "create window" request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupRequest {
  pub title:   String,
  pub content: ContentBody,
}

/// Structured-field popup. Finished text comes back through the
/// orchestrator's submit entry point, not through this trait.
#[async_trait]
pub trait PopupHost: Send + Sync {
  fn is_available(&self) -> bool {
    true
  }

  async fn open_window(&self, request: PopupRequest) -> Result<()>;
}

/// Popup host for surfaces without an extension UI; deferral is abandoned.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPopup;

#[async_trait]
impl PopupHost for NoPopup {
  fn is_available(&self) -> bool {
    false
  }

  async fn open_window(&self, _request: PopupRequest) -> Result<()> {
    Err(TransportError::Unavailable)
  }
}
