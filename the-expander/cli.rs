use std::{
  fmt,
  path::PathBuf,
  time::Duration,
};

use anyhow::{
  Result,
  bail,
};
use clap::{
  ArgAction,
  Parser,
};

#[derive(Clone, Debug)]
pub struct CliOptions {
  pub verbosity:   u8,
  pub log_file:    Option<PathBuf>,
  pub log_stderr:  bool,
  pub config_file: Option<PathBuf>,
  pub library:     Option<PathBuf>,
  pub store_file:  Option<PathBuf>,
  pub surface:     SurfaceKind,
  pub text:        String,
  pub key_delay:   Duration,
}

impl CliOptions {
  pub fn parse() -> Result<Self> {
    let raw = RawCli::parse();
    raw.try_into()
  }
}

#[derive(Parser, Debug)]
#[command(
  name = "expander",
  about = "Types text into a modelled editable surface and expands shortcuts",
  long_about = None,
  version
)]
struct RawCli {
  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count)]
  verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE", value_parser = parse_pathbuf)]
  log_file: Option<PathBuf>,

  /// Mirror logs to stderr
  #[arg(long = "log-stderr")]
  log_stderr: bool,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE", value_parser = parse_pathbuf)]
  config_file: Option<PathBuf>,

  /// JSON object mapping shortcut names to their content
  #[arg(short = 'l', long = "library", value_name = "FILE", value_parser = parse_pathbuf)]
  library: Option<PathBuf>,

  /// Keep the shared store in a JSON file instead of memory
  #[arg(long = "store", value_name = "FILE", value_parser = parse_pathbuf)]
  store_file: Option<PathBuf>,

  /// Type into a rich (tree-structured) surface
  #[arg(long = "rich", conflicts_with = "multiline")]
  rich: bool,

  /// Type into a multi-line field instead of a single-line one
  #[arg(long = "multiline")]
  multiline: bool,

  /// Pause between simulated keystrokes, in milliseconds
  #[arg(long = "key-delay", value_name = "MS", default_value_t = 40)]
  key_delay_ms: u64,

  /// Text to type, `\n` included
  #[arg(short = 't', long = "text", value_name = "TEXT")]
  text: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SurfaceKind {
  Input,
  Textarea,
  Rich,
}

impl fmt::Display for SurfaceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Input => write!(f, "input"),
      Self::Textarea => write!(f, "textarea"),
      Self::Rich => write!(f, "div"),
    }
  }
}

impl TryFrom<RawCli> for CliOptions {
  type Error = anyhow::Error;

  fn try_from(raw: RawCli) -> Result<Self> {
    if raw.text.is_empty() {
      bail!("nothing to type, pass some text with --text");
    }

    let surface = if raw.rich {
      SurfaceKind::Rich
    } else if raw.multiline {
      SurfaceKind::Textarea
    } else {
      SurfaceKind::Input
    };

    Ok(Self {
      verbosity: raw.verbosity,
      log_file: raw.log_file,
      log_stderr: raw.log_stderr,
      config_file: raw.config_file,
      library: raw.library,
      store_file: raw.store_file,
      surface,
      text: raw.text.replace("\\n", "\n"),
      key_delay: Duration::from_millis(raw.key_delay_ms),
    })
  }
}

fn parse_pathbuf(value: &str) -> std::result::Result<PathBuf, String> {
  let path = the_expander_loader::expand_tilde(std::path::Path::new(value));
  Ok(std::path::absolute(&path).unwrap_or(path))
}
