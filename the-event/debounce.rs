//! Debounced async hooks.
//!
//! A hook runs as a background tokio task that drains a channel of events.
//! Each event may move the hook's deadline; once the deadline passes with no
//! new event the hook is flushed. Sending a new event before the deadline is
//! how a pending flush gets canceled and restarted.

use std::time::Duration;

use futures_executor::block_on;
use tokio::{
  sync::mpsc::{
    self,
    Sender,
    error::TrySendError,
  },
  task::JoinHandle,
  time::Instant,
};

/// Upper bound for blocking a synchronous caller on a full channel. Dropping
/// an event is preferable to stalling the event source.
const SEND_TIMEOUT_MS: u64 = 2;

const CHANNEL_CAPACITY: usize = 128;

pub trait AsyncHook: Send + 'static + Sized {
  type Event: Send + 'static;

  /// Called for every event as soon as it arrives. Returns the deadline at
  /// which [`AsyncHook::finish_debounce`] should run, `None` to leave the
  /// hook idle. `deadline` is the currently pending one, if any.
  fn handle_event(&mut self, event: Self::Event, deadline: Option<Instant>) -> Option<Instant>;

  /// Called once the deadline passed without a newer event.
  fn finish_debounce(&mut self);

  /// Moves the hook onto a background task.
  ///
  /// Outside of a runtime no task is spawned and events are dropped, which
  /// keeps synchronous unit tests free of runtime setup.
  fn spawn(self) -> HookHandle<Self::Event> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::runtime::Handle::try_current()
      .ok()
      .map(|handle| handle.spawn(run(self, rx)));
    HookHandle { tx, task }
  }
}

/// Deadline `delay` from now, the usual return value of
/// [`AsyncHook::handle_event`] for a cancel-and-restart debounce.
pub fn restart(delay: Duration) -> Option<Instant> {
  Some(Instant::now() + delay)
}

async fn run<Hook: AsyncHook>(mut hook: Hook, mut rx: mpsc::Receiver<Hook::Event>) {
  let mut deadline = None;
  loop {
    let event = match deadline {
      Some(at) => {
        match tokio::time::timeout_at(at, rx.recv()).await {
          Ok(event) => event,
          Err(_) => {
            hook.finish_debounce();
            deadline = None;
            continue;
          },
        }
      },
      None => rx.recv().await,
    };
    let Some(event) = event else {
      // Every sender is gone; a pending flush still runs.
      if deadline.is_some() {
        hook.finish_debounce();
      }
      break;
    };
    deadline = hook.handle_event(event, deadline);
  }
}

/// Owner of a running hook. Dropping it stops the hook without flushing.
#[derive(Debug)]
pub struct HookHandle<E> {
  tx:   Sender<E>,
  task: Option<JoinHandle<()>>,
}

impl<E> HookHandle<E> {
  pub fn sender(&self) -> &Sender<E> {
    &self.tx
  }

  /// Sends from synchronous code, see [`send_blocking`].
  pub fn send(&self, event: E) {
    send_blocking(&self.tx, event);
  }

  pub fn is_running(&self) -> bool {
    self.task.as_ref().is_some_and(|task| !task.is_finished())
  }

  /// Stops the hook; a pending flush is discarded.
  pub fn shutdown(mut self) {
    self.abort();
  }

  fn abort(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl<E> Drop for HookHandle<E> {
  fn drop(&mut self) {
    self.abort();
  }
}

/// Sends `data` from synchronous code.
///
/// Tries a non-blocking send first; on a full channel blocks for at most
/// `SEND_TIMEOUT_MS` and then drops the event.
pub fn send_blocking<T>(tx: &Sender<T>, data: T) {
  match tx.try_send(data) {
    Ok(()) => {},
    Err(TrySendError::Full(data)) => {
      if block_on(tx.send_timeout(data, Duration::from_millis(SEND_TIMEOUT_MS))).is_err() {
        log::debug!("hook channel full, event dropped");
      }
    },
    Err(TrySendError::Closed(_)) => {
      log::warn!("attempted to send to a stopped hook");
    },
  }
}

/// Sends without blocking; `false` when the channel is full or closed.
pub fn try_send<T>(tx: &Sender<T>, data: T) -> bool {
  tx.try_send(data).is_ok()
}
