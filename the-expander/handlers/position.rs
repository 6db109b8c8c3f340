use std::{
  sync::Arc,
  time::Duration,
};

use the_expander_event::{
  AsyncHook,
  restart,
};
use tokio::time::Instant;

use crate::orchestrator::{
  DetectionPass,
  Pipeline,
};

/// Persists the most recent caret once typing pauses briefly.
pub struct PositionHandler {
  pipeline: Arc<Pipeline>,
  delay:    Duration,
  latest:   Option<DetectionPass>,
}

impl PositionHandler {
  pub fn new(pipeline: Arc<Pipeline>, delay: Duration) -> Self {
    Self {
      pipeline,
      delay,
      latest: None,
    }
  }
}

impl AsyncHook for PositionHandler {
  type Event = DetectionPass;

  fn handle_event(&mut self, pass: DetectionPass, _deadline: Option<Instant>) -> Option<Instant> {
    self.latest = Some(pass);
    restart(self.delay)
  }

  fn finish_debounce(&mut self) {
    if let Some(pass) = self.latest.take() {
      self.pipeline.track(&pass);
    }
  }
}
