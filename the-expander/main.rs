//! Command line driver: types text into a modelled surface with a live
//! expansion session and prints what the surface holds afterwards.

mod cli;
mod replay;

use anyhow::{
  Context,
  Result,
};
use the_expander::{
  Outcome,
  config::Config,
  logging::setup_logging,
};
use the_expander_loader as loader;

use crate::cli::CliOptions;

fn describe(outcome: &Outcome) -> String {
  match outcome {
    Outcome::Inserted {
      shortcut,
      strategy,
      new_caret,
      ..
    } => format!("expanded {shortcut} via {strategy}, caret at {new_caret}"),
    Outcome::Deferred { shortcut } => format!("{shortcut} needs input, popup opened"),
    Outcome::NoMatch => "no shortcut matched".into(),
    Outcome::Stale { shortcut } => format!("{shortcut} went stale before insertion"),
    Outcome::Failed { shortcut, reason } => format!("{shortcut} failed: {reason}"),
    Outcome::Inactive => "pipeline inactive".into(),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let options = CliOptions::parse()?;

  loader::initialize_config_file(options.config_file.clone());
  loader::initialize_log_file(options.log_file.clone());

  setup_logging(options.verbosity, &loader::log_file(), options.log_stderr)
    .context("failed to set up logging")?;

  let config = Config::load_default().context("failed to load configuration")?;
  log::debug!("loaded configuration: {config:?}");

  let store = replay::open_store(options.store_file.as_deref())?;

  let report = replay::run(&options, config, store).await?;

  for outcome in &report.outcomes {
    eprintln!("{}", describe(outcome));
  }
  println!("{}", report.text);
  match report.caret {
    Some(caret) => println!("caret: {caret}"),
    None => println!("caret: none"),
  }
  Ok(())
}
