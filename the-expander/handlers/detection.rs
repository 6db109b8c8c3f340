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

/// Runs a detection pass over the latest snapshot once typing pauses.
///
/// A pass already resolving is left alone when a newer one starts; it
/// revalidates its span before inserting anything.
pub struct DetectionHandler {
  pipeline: Arc<Pipeline>,
  delay:    Duration,
  latest:   Option<DetectionPass>,
}

impl DetectionHandler {
  pub fn new(pipeline: Arc<Pipeline>, delay: Duration) -> Self {
    Self {
      pipeline,
      delay,
      latest: None,
    }
  }
}

impl AsyncHook for DetectionHandler {
  type Event = DetectionPass;

  fn handle_event(&mut self, pass: DetectionPass, _deadline: Option<Instant>) -> Option<Instant> {
    self.latest = Some(pass);
    restart(self.delay)
  }

  fn finish_debounce(&mut self) {
    let Some(pass) = self.latest.take() else {
      return;
    };
    let pipeline = self.pipeline.clone();
    tokio::spawn(async move {
      let outcome = pipeline.detect(pass).await;
      log::debug!("detection finished: {outcome:?}");
    });
  }
}
