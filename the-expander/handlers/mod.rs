use std::sync::Arc;

use the_expander_event::{
  AsyncHook,
  HookHandle,
};

use crate::{
  config::PipelineConfig,
  orchestrator::{
    DetectionPass,
    Pipeline,
  },
};

pub mod detection;
pub mod position;

pub use detection::DetectionHandler;
pub use position::PositionHandler;

/// The two independent debounce hooks of one activation.
pub struct Handlers {
  position:  HookHandle<DetectionPass>,
  detection: HookHandle<DetectionPass>,
}

impl Handlers {
  pub fn spawn(pipeline: Arc<Pipeline>, config: &PipelineConfig) -> Self {
    Self {
      position:  PositionHandler::new(pipeline.clone(), config.track_debounce()).spawn(),
      detection: DetectionHandler::new(pipeline, config.detect_debounce()).spawn(),
    }
  }

  /// Restarts the short timer that persists the caret.
  pub fn track(&self, pass: DetectionPass) {
    self.position.send(pass);
  }

  /// Restarts the long timer that runs detection.
  pub fn detect(&self, pass: DetectionPass) {
    self.detection.send(pass);
  }

  pub fn shutdown(self) {
    self.position.shutdown();
    self.detection.shutdown();
  }
}
