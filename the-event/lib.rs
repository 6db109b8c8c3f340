//! Debounced background hooks fed from synchronous event handlers.

mod debounce;

pub use debounce::{
  AsyncHook,
  HookHandle,
  restart,
  send_blocking,
  try_send,
};
