//! Maps linear character offsets onto live anchors of a [`ContentTree`].
//!
//! This is the inverse of [`ContentTree::linear_offset`]: the tree is walked in
//! document order, text lengths are accumulated and the walk stops at the
//! requested offsets. The result is an addressable span usable for
//! programmatic replacement.

use thiserror::Error;

use crate::tree::{
  Anchor,
  ContentTree,
  Segment,
  TreeRange,
};

/// The requested offsets do not fit the current shape of the tree.
///
/// This is expected whenever the page mutates a surface between detection and
/// insertion; callers abandon the attempt instead of propagating it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("offsets {start}..{end} do not map onto the content tree")]
pub struct NotFound {
  pub start: usize,
  pub end:   usize,
}

pub type Result<T> = std::result::Result<T, NotFound>;

#[derive(Clone, Copy)]
enum Bias {
  /// Prefer the segment that starts at the offset.
  Forward,
  /// Prefer the segment that ends at the offset.
  Backward,
}

pub fn locate(tree: &ContentTree, start: usize, end: usize) -> Result<TreeRange> {
  let not_found = NotFound { start, end };
  if start > end {
    return Err(not_found);
  }

  let segments = text_segments(tree);
  let total = segments.last().map_or(0, Segment::end);
  if end > total {
    return Err(not_found);
  }

  if segments.is_empty() {
    let root = Anchor::new(tree.root(), 0);
    return Ok(TreeRange::collapsed(root));
  }

  let start_anchor = point(&segments, start, Bias::Forward).ok_or(not_found)?;
  if start == end {
    return Ok(TreeRange::collapsed(start_anchor));
  }
  let end_anchor = point(&segments, end, Bias::Backward).ok_or(not_found)?;
  Ok(TreeRange::new(start_anchor, end_anchor))
}

/// Anchor for a collapsed caret at `offset`. On a boundary between two text
/// nodes the caret stays at the end of the earlier one, where typing would
/// continue.
pub fn locate_caret(tree: &ContentTree, offset: usize) -> Result<Anchor> {
  let not_found = NotFound {
    start: offset,
    end:   offset,
  };
  let segments = text_segments(tree);
  if segments.is_empty() {
    return if offset == 0 {
      Ok(Anchor::new(tree.root(), 0))
    } else {
      Err(not_found)
    };
  }
  point(&segments, offset, Bias::Backward).ok_or(not_found)
}

// Empty formatting wrappers leave zero-length text nodes behind; they can
// never hold a boundary that a non-empty neighbour could hold instead.
fn text_segments(tree: &ContentTree) -> Vec<Segment> {
  tree
    .segments()
    .into_iter()
    .filter(|segment| segment.len > 0)
    .collect()
}

fn point(segments: &[Segment], offset: usize, bias: Bias) -> Option<Anchor> {
  let inside = |segment: &&Segment| {
    match bias {
      Bias::Forward => segment.start <= offset && offset < segment.end(),
      Bias::Backward => segment.start < offset && offset <= segment.end(),
    }
  };

  if let Some(segment) = segments.iter().find(inside) {
    return Some(Anchor::new(segment.node, offset - segment.start));
  }

  // Only the two extremities are left: the end of the last segment for a
  // forward lookup, the start of the first one for a backward lookup.
  match bias {
    Bias::Forward => {
      segments
        .last()
        .filter(|segment| segment.end() == offset)
        .map(|segment| Anchor::new(segment.node, segment.len))
    },
    Bias::Backward => {
      segments
        .first()
        .filter(|segment| segment.start == offset)
        .map(|segment| Anchor::new(segment.node, 0))
    },
  }
}
