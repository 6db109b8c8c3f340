//! Shortcut candidates proposed from the text right before the caret.
//!
//! Generation is synchronous and does no I/O; resolving a candidate is the
//! cache's job.

use serde::Deserialize;
use smallvec::SmallVec;

use crate::{
  Tendril,
  position::CursorSnapshot,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MatcherConfig {
  /// Candidates shorter than this are never looked up.
  pub min_len:        usize,
  /// Longest trailing substring tried by the suffix strategy.
  pub max_suffix_len: usize,
}

impl Default for MatcherConfig {
  fn default() -> Self {
    Self {
      min_len:        2,
      max_suffix_len: 20,
    }
  }
}

/// Strategy that produced a candidate, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CandidateSource {
  /// One trigger character followed by word characters, e.g. `/sig`.
  PrefixedToken,
  /// Last whitespace-delimited token of the current line.
  LastWord,
  /// A trailing substring of the current line.
  Suffix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
  pub text:   Tendril,
  /// Char offset of the first candidate char in the surface text.
  pub start:  usize,
  /// Always the caret offset of the snapshot.
  pub end:    usize,
  pub source: CandidateSource,
}

fn is_word_char(ch: char) -> bool {
  ch.is_alphanumeric() || ch == '_'
}

fn is_trigger_char(ch: char) -> bool {
  !is_word_char(ch) && !ch.is_whitespace()
}

/// Proposes candidates ending at the caret, in lookup order.
///
/// A selection is matched against the text before its start.
pub fn match_candidates(snapshot: &CursorSnapshot, config: &MatcherConfig) -> Vec<Candidate> {
  let line: SmallVec<[char; 64]> = snapshot.current_line().chars().collect();
  let min_len = config.min_len.max(1);
  let mut candidates: Vec<Candidate> = Vec::new();

  let mut push = |len: usize, source: CandidateSource| {
    if len < min_len || len > line.len() {
      return;
    }
    let text: Tendril = line[line.len() - len..].iter().copied().collect();
    if candidates.iter().any(|candidate| candidate.text == text) {
      return;
    }
    candidates.push(Candidate {
      text,
      start: snapshot.start - len,
      end: snapshot.start,
      source,
    });
  };

  let word_run = line.iter().rev().take_while(|ch| is_word_char(**ch)).count();
  if word_run > 0
    && line
      .len()
      .checked_sub(word_run + 1)
      .is_some_and(|idx| is_trigger_char(line[idx]))
  {
    push(word_run + 1, CandidateSource::PrefixedToken);
  }

  let last_word = line.iter().rev().take_while(|ch| !ch.is_whitespace()).count();
  if last_word > 0 {
    push(last_word, CandidateSource::LastWord);
  }

  let longest = config.max_suffix_len.min(line.len());
  for len in (min_len..=longest).rev() {
    push(len, CandidateSource::Suffix);
  }

  candidates
}
