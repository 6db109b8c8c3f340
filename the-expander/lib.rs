pub mod config;
pub mod handlers;
pub mod logging;
pub mod orchestrator;
pub mod session;

pub use orchestrator::{
  Collaborators,
  Orchestrator,
  Outcome,
  SharedPage,
};
pub use session::{
  Lifecycle,
  Session,
};
