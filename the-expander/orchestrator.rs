//! The expansion pipeline.
//!
//! `Idle -> Tracking -> Matching -> Resolving -> Deciding -> Inserting |
//! Deferred -> Idle`. Tracking runs synchronously on every caret event and
//! persists the position behind a short debounce; matching and everything
//! after it run behind a longer one. Each detection pass reports an
//! [`Outcome`] on a broadcast channel.
//!
//! The page lock is only taken by synchronous helpers and never held across
//! an await.

use std::{
  fmt,
  sync::{
    Arc,
    atomic::{
      AtomicBool,
      Ordering,
    },
  },
};

use parking_lot::Mutex;
use serde::{
  Deserialize,
  Serialize,
};
use the_lib::{
  cache::ResolutionCache,
  candidate::{
    Candidate,
    MatcherConfig,
    match_candidates,
  },
  content::{
    ContentRenderer,
    PlainTextRenderer,
    ResolvedContent,
  },
  host::{
    HostPage,
    StandardHost,
  },
  insert::{
    self,
    InsertionTarget,
    Strategy,
  },
  position::{
    self,
    CursorSnapshot,
    PersistedPosition,
  },
  remote::{
    NoPopup,
    NoRemote,
    PopupHost,
    PopupRequest,
    ShortcutResolver,
  },
  store::{
    self,
    Store,
    keys,
  },
  surface::{
    Page,
    SurfaceId,
    SurfaceIdentity,
  },
};
use tokio::sync::broadcast;

use crate::{
  config::Config,
  handlers::Handlers,
};

pub type SharedPage = Arc<Mutex<Page>>;

const OUTCOME_CAPACITY: usize = 32;

/// Everything the pipeline talks to outside of the page model.
#[derive(Clone)]
pub struct Collaborators {
  pub store:    Arc<dyn Store>,
  pub resolver: Arc<dyn ShortcutResolver>,
  pub popup:    Arc<dyn PopupHost>,
  pub renderer: Arc<dyn ContentRenderer>,
  pub host:     Arc<dyn HostPage>,
}

impl Collaborators {
  /// A store with no remote library, no popup and a stock host page.
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self {
      store,
      resolver: Arc::new(NoRemote),
      popup: Arc::new(NoPopup),
      renderer: Arc::new(PlainTextRenderer),
      host: Arc::new(StandardHost),
    }
  }

  pub fn with_resolver(mut self, resolver: Arc<dyn ShortcutResolver>) -> Self {
    self.resolver = resolver;
    self
  }

  pub fn with_popup(mut self, popup: Arc<dyn PopupHost>) -> Self {
    self.popup = popup;
    self
  }

  pub fn with_renderer(mut self, renderer: Arc<dyn ContentRenderer>) -> Self {
    self.renderer = renderer;
    self
  }

  pub fn with_host(mut self, host: Arc<dyn HostPage>) -> Self {
    self.host = host;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
  #[default]
  Idle,
  Tracking,
  Matching,
  Resolving,
  Deciding,
  Inserting,
  Deferred,
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

/// How a detection pass or a popup submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Inserted {
    surface:   SurfaceId,
    shortcut:  String,
    strategy:  Strategy,
    new_caret: usize,
  },
  /// Handed to the popup; finished text comes back through
  /// [`Orchestrator::submit_popup`].
  Deferred { shortcut: String },
  NoMatch,
  /// The candidate was no longer at its offsets once resolved.
  Stale { shortcut: String },
  Failed { shortcut: String, reason: String },
  /// The pipeline was torn down while the pass was in flight.
  Inactive,
}

/// The input of one detection pass: a snapshot of the focused surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionPass {
  pub surface:  SurfaceId,
  pub identity: SurfaceIdentity,
  pub snapshot: CursorSnapshot,
}

/// Replacement waiting for the popup to return finished text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReplacement {
  pub shortcut: String,
  pub content:  ResolvedContent,
  /// Span of the shortcut when the popup was requested.
  pub position: Option<PersistedPosition>,
}

pub struct Pipeline {
  page:     SharedPage,
  collab:   Collaborators,
  cache:    ResolutionCache,
  matcher:  MatcherConfig,
  state:    Mutex<PipelineState>,
  active:   AtomicBool,
  outcomes: broadcast::Sender<Outcome>,
}

impl Pipeline {
  pub fn new(page: SharedPage, collab: Collaborators, config: &Config) -> Self {
    let cache = ResolutionCache::new(
      &config.cache,
      collab.store.clone(),
      collab.resolver.clone(),
    );
    let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
    Self {
      page,
      collab,
      cache,
      matcher: config.matcher.clone(),
      state: Mutex::new(PipelineState::Idle),
      active: AtomicBool::new(true),
      outcomes,
    }
  }

  pub fn page(&self) -> &SharedPage {
    &self.page
  }

  pub fn cache(&self) -> &ResolutionCache {
    &self.cache
  }

  pub fn state(&self) -> PipelineState {
    *self.state.lock()
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
    self.outcomes.subscribe()
  }

  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::Acquire)
  }

  /// Passes still in flight finish as [`Outcome::Inactive`].
  pub fn deactivate(&self) {
    self.active.store(false, Ordering::Release);
  }

  fn transition(&self, next: PipelineState) {
    let mut state = self.state.lock();
    log::trace!("pipeline {} -> {}", *state, next);
    *state = next;
  }

  fn report(&self, outcome: Outcome) -> Outcome {
    self.transition(PipelineState::Idle);
    // Nobody listening is fine.
    let _ = self.outcomes.send(outcome.clone());
    outcome
  }

  /// Snapshot of the focused surface, if it has a caret.
  pub fn capture_focused(&self) -> Option<DetectionPass> {
    let page = self.page.lock();
    let surface = page.focused()?;
    let snapshot = position::capture(page.get(surface)?)?;
    let identity = page.identity(surface)?.clone();
    Some(DetectionPass {
      surface,
      identity,
      snapshot,
    })
  }

  /// Persists the caret of `pass` for actors outliving this pass.
  pub fn track(&self, pass: &DetectionPass) {
    self.transition(PipelineState::Tracking);
    let position = PersistedPosition::from_snapshot(pass.identity.clone(), &pass.snapshot);
    if let Err(err) = position::persist(self.collab.store.as_ref(), &position) {
      log::warn!("failed to persist caret position: {err}");
    }
    self.transition(PipelineState::Idle);
  }

  /// Matches, resolves and acts on the first candidate that resolves.
  pub async fn detect(&self, pass: DetectionPass) -> Outcome {
    if !self.is_active() {
      return self.report(Outcome::Inactive);
    }

    self.transition(PipelineState::Matching);
    let candidates = match_candidates(&pass.snapshot, &self.matcher);
    if candidates.is_empty() {
      return self.report(Outcome::NoMatch);
    }

    self.transition(PipelineState::Resolving);
    let mut resolved = None;
    for candidate in candidates {
      if let Some(content) = self.cache.resolve(&candidate.text).await {
        resolved = Some((candidate, content));
        break;
      }
    }
    let Some((candidate, content)) = resolved else {
      return self.report(Outcome::NoMatch);
    };

    if !self.is_active() {
      return self.report(Outcome::Inactive);
    }

    self.transition(PipelineState::Deciding);
    log::debug!(
      "resolved {:?} at {}..{} ({:?})",
      candidate.text.as_str(),
      candidate.start,
      candidate.end,
      candidate.source
    );
    let outcome = if content.has_interactive_fields {
      self.defer(&pass, &candidate, content).await
    } else {
      let text = self.collab.renderer.to_plain_text(&content.body);
      self.expand(pass.surface, &candidate, &text)
    };
    self.report(outcome)
  }

  /// Replaces the candidate span with `text` after checking that the live
  /// surface still holds the candidate there.
  fn expand(&self, surface: SurfaceId, candidate: &Candidate, text: &str) -> Outcome {
    self.transition(PipelineState::Inserting);
    let shortcut = candidate.text.to_string();
    let mut page = self.page.lock();

    let still_there = page
      .get(surface)
      .is_some_and(|live| span_holds(&live.text(), candidate.start, candidate.end, &shortcut));
    if !still_there {
      log::debug!("{shortcut:?} moved or changed before it resolved, skipping");
      return Outcome::Stale { shortcut };
    }

    let target = InsertionTarget::offsets(surface, candidate.start, candidate.end);
    match insert::insert(&mut page, &target, text, self.collab.host.as_ref()) {
      Ok(inserted) => {
        if let Some(identity) = page.identity(surface).cloned() {
          self.persist_caret(identity, inserted.new_caret);
        }
        log::info!("expanded {shortcut:?} via {}", inserted.strategy);
        Outcome::Inserted {
          surface,
          shortcut,
          strategy: inserted.strategy,
          new_caret: inserted.new_caret,
        }
      },
      Err(err) => {
        log::warn!("failed to expand {shortcut:?}: {err}");
        Outcome::Failed {
          shortcut,
          reason: err.to_string(),
        }
      },
    }
  }

  async fn defer(
    &self,
    pass: &DetectionPass,
    candidate: &Candidate,
    content: ResolvedContent,
  ) -> Outcome {
    let shortcut = candidate.text.to_string();
    if !self.collab.popup.is_available() {
      log::debug!("popup unavailable, dropping {shortcut:?}");
      return Outcome::Failed {
        shortcut,
        reason: "popup unavailable".into(),
      };
    }

    self.transition(PipelineState::Deferred);
    let request = PopupRequest {
      title:   content.display_title().to_string(),
      content: content.body.clone(),
    };
    let pending = PendingReplacement {
      shortcut: shortcut.clone(),
      content,
      position: Some(PersistedPosition::new(
        pass.identity.clone(),
        candidate.start,
        candidate.end,
      )),
    };
    if let Err(err) = store::write(self.collab.store.as_ref(), keys::PENDING, &pending) {
      log::warn!("failed to persist pending replacement: {err}");
      return Outcome::Failed {
        shortcut,
        reason: err.to_string(),
      };
    }

    match self.collab.popup.open_window(request).await {
      Ok(()) => Outcome::Deferred { shortcut },
      Err(err) => {
        log::warn!("failed to open popup for {shortcut:?}: {err}");
        Outcome::Failed {
          shortcut,
          reason: err.to_string(),
        }
      },
    }
  }

  /// Inserts the text returned by the popup.
  ///
  /// The stored span is reused when the focused surface is the one the
  /// shortcut was typed in and the span still holds the shortcut; otherwise
  /// the text goes to the current caret.
  pub fn submit_popup(&self, text: &str) -> Outcome {
    let store = self.collab.store.as_ref();
    let pending: Option<PendingReplacement> = match store::read(store, keys::PENDING) {
      Ok(pending) => pending,
      Err(err) => {
        log::warn!("unreadable pending replacement: {err}");
        None
      },
    };
    if let Err(err) = store.remove(keys::PENDING) {
      log::warn!("failed to clear pending replacement: {err}");
    }
    let shortcut = pending
      .as_ref()
      .map(|pending| pending.shortcut.clone())
      .unwrap_or_default();

    self.transition(PipelineState::Inserting);
    let mut page = self.page.lock();
    let Some(surface) = page.focused() else {
      return self.report(Outcome::Failed {
        shortcut,
        reason: "no focused surface".into(),
      });
    };

    let identity = page.identity(surface).cloned();
    let live_text = page.get(surface).map(|live| live.text()).unwrap_or_default();
    let stored_span = pending
      .as_ref()
      .and_then(|pending| pending.position.as_ref())
      .filter(|position| identity.as_ref().is_some_and(|identity| position.matches(identity)))
      .filter(|position| span_holds(&live_text, position.start, position.end, &shortcut));
    let target = match stored_span {
      Some(position) => InsertionTarget::offsets(surface, position.start, position.end),
      None => InsertionTarget::caret(surface),
    };

    let outcome = match insert::insert(&mut page, &target, text, self.collab.host.as_ref()) {
      Ok(inserted) => {
        if let Some(identity) = identity {
          self.persist_caret(identity, inserted.new_caret);
        }
        Outcome::Inserted {
          surface,
          shortcut,
          strategy: inserted.strategy,
          new_caret: inserted.new_caret,
        }
      },
      Err(err) => {
        log::warn!("failed to insert popup text: {err}");
        Outcome::Failed {
          shortcut,
          reason: err.to_string(),
        }
      },
    };
    drop(page);
    self.report(outcome)
  }

  fn persist_caret(&self, identity: SurfaceIdentity, caret: usize) {
    let position = PersistedPosition::new(identity, caret, caret);
    if let Err(err) = position::persist(self.collab.store.as_ref(), &position) {
      log::warn!("failed to persist caret position: {err}");
    }
  }
}

/// Whether chars `start..end` of `text` are exactly `expected`.
fn span_holds(text: &str, start: usize, end: usize, expected: &str) -> bool {
  if start > end {
    return false;
  }
  let mut span = text.chars().skip(start);
  let matches = expected.chars().all(|ch| span.next() == Some(ch));
  matches && expected.chars().count() == end - start
}

/// One activation of the pipeline: the pipeline plus its debounce hooks.
pub struct Orchestrator {
  pipeline: Arc<Pipeline>,
  handlers: Handlers,
}

impl Orchestrator {
  /// Must be called inside a tokio runtime for the hooks to run.
  pub fn start(page: SharedPage, collab: Collaborators, config: &Config) -> Self {
    let pipeline = Arc::new(Pipeline::new(page, collab, config));
    let handlers = Handlers::spawn(pipeline.clone(), &config.pipeline);
    Self { pipeline, handlers }
  }

  pub fn pipeline(&self) -> &Arc<Pipeline> {
    &self.pipeline
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
    self.pipeline.subscribe()
  }

  /// Text changed in the focused surface.
  pub fn on_edit(&self) {
    if let Some(pass) = self.pipeline.capture_focused() {
      self.handlers.track(pass.clone());
      self.handlers.detect(pass);
    }
  }

  /// The caret moved without a text change (click, arrow keys).
  pub fn on_caret_move(&self) {
    if let Some(pass) = self.pipeline.capture_focused() {
      self.handlers.track(pass);
    }
  }

  pub fn submit_popup(&self, text: &str) -> Outcome {
    self.pipeline.submit_popup(text)
  }

  /// Stops the hooks; in-flight passes finish as [`Outcome::Inactive`].
  pub fn shutdown(self) {
    self.pipeline.deactivate();
    self.handlers.shutdown();
  }
}
