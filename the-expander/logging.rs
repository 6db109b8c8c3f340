use std::path::Path;

use anyhow::Result;

fn level(verbosity: u8) -> log::LevelFilter {
  match verbosity {
    0 => log::LevelFilter::Warn,
    1 => log::LevelFilter::Info,
    2 => log::LevelFilter::Debug,
    _ => log::LevelFilter::Trace,
  }
}

/// Installs the global logger: timestamped lines to `log_file`, and to stderr
/// as well when `stderr` is set.
pub fn setup_logging(verbosity: u8, log_file: &Path, stderr: bool) -> Result<()> {
  let mut dispatch = fern::Dispatch::new()
    .level(level(verbosity))
    .format(|out, message, record| {
      out.finish(format_args!(
        "{} {} [{}] {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.target(),
        record.level(),
        message
      ))
    })
    .chain(fern::log_file(log_file)?);

  if stderr {
    dispatch = dispatch.chain(std::io::stderr());
  }

  dispatch.apply()?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn verbosity_maps_to_levels() {
    assert_eq!(level(0), log::LevelFilter::Warn);
    assert_eq!(level(2), log::LevelFilter::Debug);
    assert_eq!(level(9), log::LevelFilter::Trace);
  }
}
