//! Activation of the pipeline from the session flag in the shared store.
//!
//! The whole pipeline is inert while the flag is false. A transition to true
//! starts a fresh [`Orchestrator`]; a transition to false shuts it down.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use the_lib::store::{
  StoreChange,
  keys,
};
use tokio::{
  sync::broadcast::error::RecvError,
  task::JoinHandle,
};

use crate::{
  config::Config,
  orchestrator::{
    Collaborators,
    Orchestrator,
    SharedPage,
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Uninitialized,
  Active,
  TornDown,
}

pub struct Session {
  page:         SharedPage,
  collab:       Collaborators,
  config:       Config,
  lifecycle:    Lifecycle,
  orchestrator: Option<Orchestrator>,
}

impl Session {
  pub fn new(page: SharedPage, collab: Collaborators, config: Config) -> Self {
    Self {
      page,
      collab,
      config,
      lifecycle: Lifecycle::Uninitialized,
      orchestrator: None,
    }
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.lifecycle
  }

  pub fn orchestrator(&self) -> Option<&Orchestrator> {
    self.orchestrator.as_ref()
  }

  /// Applies the flag currently in the store.
  pub fn sync(&mut self) {
    let logged_in = self
      .collab
      .store
      .get(keys::SESSION)
      .as_ref()
      .is_some_and(is_truthy);
    self.apply(logged_in);
  }

  pub fn apply(&mut self, logged_in: bool) {
    match (logged_in, self.orchestrator.is_some()) {
      (true, false) => {
        log::info!("session active, starting pipeline");
        self.orchestrator = Some(Orchestrator::start(
          self.page.clone(),
          self.collab.clone(),
          &self.config,
        ));
        self.lifecycle = Lifecycle::Active;
      },
      (false, true) => {
        log::info!("session ended, tearing pipeline down");
        if let Some(orchestrator) = self.orchestrator.take() {
          orchestrator.shutdown();
        }
        self.lifecycle = Lifecycle::TornDown;
      },
      _ => {},
    }
  }

  pub fn handle_change(&mut self, change: &StoreChange) {
    match change.key.as_str() {
      keys::SESSION => self.apply(change.new_value.as_ref().is_some_and(is_truthy)),
      keys::LIBRARY => {
        if let Some(orchestrator) = &self.orchestrator {
          log::debug!("library changed, dropping memoised resolutions");
          orchestrator.pipeline().cache().clear();
        }
      },
      _ => {},
    }
  }

  /// Forwards an edit to the active pipeline. Returns `false` while inert.
  pub fn on_edit(&self) -> bool {
    match &self.orchestrator {
      Some(orchestrator) => {
        orchestrator.on_edit();
        true
      },
      None => false,
    }
  }

  pub fn on_caret_move(&self) -> bool {
    match &self.orchestrator {
      Some(orchestrator) => {
        orchestrator.on_caret_move();
        true
      },
      None => false,
    }
  }
}

fn is_truthy(value: &Value) -> bool {
  value.as_bool().unwrap_or(false)
}

/// Keeps `session` in step with store change notifications until the store
/// goes away.
pub fn watch(session: Arc<Mutex<Session>>) -> JoinHandle<()> {
  let mut changes = session.lock().collab.store.subscribe();
  tokio::spawn(async move {
    loop {
      match changes.recv().await {
        Ok(change) => session.lock().handle_change(&change),
        Err(RecvError::Lagged(skipped)) => {
          log::debug!("missed {skipped} store changes, resyncing");
          session.lock().sync();
        },
        Err(RecvError::Closed) => break,
      }
    }
  })
}
