//! Arena-backed content tree for rich editable surfaces.
//!
//! The tree models the part of a document that text expansion cares about:
//! elements, text nodes and explicit line breaks. Linear offsets are defined
//! over the concatenation of every text node in document order; elements and
//! line breaks contribute nothing to them.
//!
//! Boundary points are expressed as [`Anchor`]s. Inside a text node the anchor
//! offset counts `char`s, on an element it is a child index.
//!
//! # Example
//!
//! ```no_run
//! use the_lib::tree::ContentTree;
//!
//! let mut tree = ContentTree::new("div");
//! let p = tree.append_element(tree.root(), "p").unwrap();
//! tree.append_text(p, "hello").unwrap();
//! tree.append_line_break(p).unwrap();
//! tree.append_text(p, "world").unwrap();
//!
//! assert_eq!(tree.text(), "helloworld");
//! ```

use slotmap::{
  SlotMap,
  new_key_type,
};
use thiserror::Error;

use crate::Tendril;

new_key_type! {
  pub struct NodeId;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
  Element { tag: Tendril, editable: bool },
  Text(String),
  LineBreak,
}

#[derive(Debug, Clone)]
pub struct Node {
  kind:     NodeKind,
  parent:   Option<NodeId>,
  children: Vec<NodeId>,
}

impl Node {
  pub fn kind(&self) -> &NodeKind {
    &self.kind
  }

  pub fn parent(&self) -> Option<NodeId> {
    self.parent
  }

  pub fn children(&self) -> &[NodeId] {
    &self.children
  }

  pub fn is_element(&self) -> bool {
    matches!(self.kind, NodeKind::Element { .. })
  }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TreeError {
  #[error("node {0:?} is not part of the tree")]
  MissingNode(NodeId),
  #[error("node {0:?} is not editable")]
  ReadOnly(NodeId),
  #[error("node {0:?} cannot hold children")]
  NotAnElement(NodeId),
  #[error("anchor offset {offset} is out of bounds for node {node:?}")]
  InvalidAnchor { node: NodeId, offset: usize },
  #[error("range end precedes its start")]
  InvertedRange,
  #[error("the root node cannot be removed")]
  RootRemoval,
  #[error("surface has no selection")]
  NoSelection,
}

pub type Result<T> = std::result::Result<T, TreeError>;

/// A boundary point inside the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
  pub node:   NodeId,
  pub offset: usize,
}

impl Anchor {
  pub const fn new(node: NodeId, offset: usize) -> Self {
    Self { node, offset }
  }
}

/// An addressable span: a start/end pair of boundary points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRange {
  pub start: Anchor,
  pub end:   Anchor,
}

impl TreeRange {
  pub const fn new(start: Anchor, end: Anchor) -> Self {
    Self { start, end }
  }

  pub const fn collapsed(at: Anchor) -> Self {
    Self { start: at, end: at }
  }

  pub fn is_collapsed(&self) -> bool {
    self.start == self.end
  }
}

/// Placement of one text node within the linear text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
  pub node:  NodeId,
  pub start: usize,
  pub len:   usize,
}

impl Segment {
  pub fn end(&self) -> usize {
    self.start + self.len
  }
}

#[derive(Debug, Clone)]
pub struct ContentTree {
  nodes: SlotMap<NodeId, Node>,
  root:  NodeId,
}

impl ContentTree {
  pub fn new(tag: &str) -> Self {
    let mut nodes = SlotMap::with_key();
    let root = nodes.insert(Node {
      kind:     NodeKind::Element {
        tag:      tag.into(),
        editable: true,
      },
      parent:   None,
      children: Vec::new(),
    });
    Self { nodes, root }
  }

  pub fn root(&self) -> NodeId {
    self.root
  }

  pub fn get(&self, id: NodeId) -> Option<&Node> {
    self.nodes.get(id)
  }

  /// Whether `id` exists and is still attached below the root.
  pub fn contains(&self, id: NodeId) -> bool {
    let mut current = Some(id);
    while let Some(node_id) = current {
      if node_id == self.root {
        return true;
      }
      current = match self.nodes.get(node_id) {
        Some(node) => node.parent,
        None => return false,
      };
    }
    false
  }

  pub fn append_element(&mut self, parent: NodeId, tag: &str) -> Result<NodeId> {
    self.insert_child(parent, usize::MAX, NodeKind::Element {
      tag:      tag.into(),
      editable: true,
    })
  }

  pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId> {
    self.insert_child(parent, usize::MAX, NodeKind::Text(text.to_string()))
  }

  pub fn append_line_break(&mut self, parent: NodeId) -> Result<NodeId> {
    self.insert_child(parent, usize::MAX, NodeKind::LineBreak)
  }

  pub fn set_editable(&mut self, id: NodeId, value: bool) -> Result<()> {
    match self.nodes.get_mut(id).map(|node| &mut node.kind) {
      Some(NodeKind::Element { editable, .. }) => {
        *editable = value;
        Ok(())
      },
      Some(_) => Err(TreeError::NotAnElement(id)),
      None => Err(TreeError::MissingNode(id)),
    }
  }

  /// Inserts a new node as child `index` of `parent`, clamping the index to the
  /// current child count.
  fn insert_child(&mut self, parent: NodeId, index: usize, kind: NodeKind) -> Result<NodeId> {
    let len = match self.nodes.get(parent) {
      Some(node) if node.is_element() => node.children.len(),
      Some(_) => return Err(TreeError::NotAnElement(parent)),
      None => return Err(TreeError::MissingNode(parent)),
    };
    let id = self.nodes.insert(Node {
      kind,
      parent: Some(parent),
      children: Vec::new(),
    });
    self.nodes[parent].children.insert(index.min(len), id);
    Ok(id)
  }

  /// Detaches `id` and frees its whole subtree.
  pub fn remove(&mut self, id: NodeId) -> Result<()> {
    if id == self.root {
      return Err(TreeError::RootRemoval);
    }
    let parent = self.nodes.get(id).ok_or(TreeError::MissingNode(id))?.parent;
    if let Some(parent) = parent
      && let Some(node) = self.nodes.get_mut(parent)
    {
      node.children.retain(|child| *child != id);
    }

    let mut stack = vec![id];
    while let Some(node_id) = stack.pop() {
      if let Some(removed) = self.nodes.remove(node_id) {
        stack.extend(removed.children);
      }
    }
    Ok(())
  }

  /// Document-order traversal of the whole tree.
  pub fn preorder(&self) -> Preorder<'_> {
    self.preorder_from(self.root)
  }

  /// Document-order traversal of the subtree rooted at `id`.
  pub fn preorder_from(&self, id: NodeId) -> Preorder<'_> {
    Preorder {
      tree:  self,
      stack: vec![id],
    }
  }

  pub fn segments(&self) -> Vec<Segment> {
    let mut acc = 0;
    self
      .preorder()
      .filter_map(|id| {
        match &self.nodes[id].kind {
          NodeKind::Text(text) => {
            let len = text.chars().count();
            let segment = Segment {
              node: id,
              start: acc,
              len,
            };
            acc += len;
            Some(segment)
          },
          _ => None,
        }
      })
      .collect()
  }

  /// The linear text: every text node concatenated in document order.
  pub fn text(&self) -> String {
    self
      .preorder()
      .filter_map(|id| {
        match &self.nodes[id].kind {
          NodeKind::Text(text) => Some(text.as_str()),
          _ => None,
        }
      })
      .collect()
  }

  pub fn len_chars(&self) -> usize {
    self.text_within(self.root)
  }

  fn text_within(&self, id: NodeId) -> usize {
    self
      .preorder_from(id)
      .map(|node_id| {
        match &self.nodes[node_id].kind {
          NodeKind::Text(text) => text.chars().count(),
          _ => 0,
        }
      })
      .sum()
  }

  /// Number of chars held by text nodes that precede `id` in document order.
  fn text_before(&self, id: NodeId) -> Option<usize> {
    let mut acc = 0;
    for node_id in self.preorder() {
      if node_id == id {
        return Some(acc);
      }
      if let NodeKind::Text(text) = &self.nodes[node_id].kind {
        acc += text.chars().count();
      }
    }
    None
  }

  /// Converts a boundary point into a linear offset.
  ///
  /// Returns `None` for detached nodes and offsets past the node's extent.
  pub fn linear_offset(&self, anchor: Anchor) -> Option<usize> {
    let node = self.nodes.get(anchor.node)?;
    match &node.kind {
      NodeKind::Text(text) => {
        if anchor.offset > text.chars().count() {
          return None;
        }
        Some(self.text_before(anchor.node)? + anchor.offset)
      },
      NodeKind::Element { .. } => {
        match node.children.get(anchor.offset) {
          Some(&child) => self.text_before(child),
          None if anchor.offset == node.children.len() => {
            Some(self.text_before(anchor.node)? + self.text_within(anchor.node))
          },
          None => None,
        }
      },
      NodeKind::LineBreak => {
        if anchor.offset != 0 {
          return None;
        }
        self.text_before(anchor.node)
      },
    }
  }

  /// Reads back the text addressed by `range`.
  pub fn text_in(&self, range: TreeRange) -> Option<String> {
    let start = self.linear_offset(range.start)?;
    let end = self.linear_offset(range.end)?;
    if end < start {
      return None;
    }
    Some(self.text().chars().skip(start).take(end - start).collect())
  }

  /// Nearest element that is `id` itself or one of its ancestors.
  pub fn element_ancestor(&self, id: NodeId) -> Option<NodeId> {
    if !self.contains(id) {
      return None;
    }
    let mut current = Some(id);
    while let Some(node_id) = current {
      let node = self.nodes.get(node_id)?;
      if node.is_element() {
        return Some(node_id);
      }
      current = node.parent;
    }
    None
  }

  /// A node is editable when it is attached and no element on its ancestor
  /// chain opts out.
  pub fn is_editable(&self, id: NodeId) -> bool {
    if !self.contains(id) {
      return false;
    }
    let mut current = Some(id);
    while let Some(node_id) = current {
      let Some(node) = self.nodes.get(node_id) else {
        return false;
      };
      if let NodeKind::Element {
        editable: false, ..
      } = node.kind
      {
        return false;
      }
      current = node.parent;
    }
    true
  }

  fn child_index(&self, parent: NodeId, child: NodeId) -> Result<usize> {
    self
      .nodes
      .get(parent)
      .ok_or(TreeError::MissingNode(parent))?
      .children
      .iter()
      .position(|id| *id == child)
      .ok_or(TreeError::MissingNode(child))
  }

  /// Orders boundary points against nodes of a preorder listing.
  ///
  /// Node `k` of the listing occupies rank `2k + 1`; a boundary right before
  /// it has rank `2k`. Anchors inside a text node share that node's rank.
  fn rank(&self, anchor: Anchor, order: &[NodeId]) -> Result<usize> {
    let index_of = |id: NodeId| {
      order
        .iter()
        .position(|node_id| *node_id == id)
        .ok_or(TreeError::MissingNode(id))
    };
    let invalid = TreeError::InvalidAnchor {
      node:   anchor.node,
      offset: anchor.offset,
    };
    let node = self
      .nodes
      .get(anchor.node)
      .ok_or(TreeError::MissingNode(anchor.node))?;
    match &node.kind {
      NodeKind::Text(text) => {
        if anchor.offset > text.chars().count() {
          return Err(invalid);
        }
        Ok(2 * index_of(anchor.node)? + 1)
      },
      NodeKind::Element { .. } => {
        match node.children.get(anchor.offset) {
          Some(&child) => Ok(2 * index_of(child)?),
          None if anchor.offset == node.children.len() => {
            let subtree = self.preorder_from(anchor.node).count();
            Ok(2 * (index_of(anchor.node)? + subtree))
          },
          None => Err(invalid),
        }
      },
      NodeKind::LineBreak if anchor.offset == 0 => Ok(2 * index_of(anchor.node)?),
      NodeKind::LineBreak => Err(invalid),
    }
  }

  fn text_mut(&mut self, id: NodeId) -> Result<&mut String> {
    match self.nodes.get_mut(id).map(|node| &mut node.kind) {
      Some(NodeKind::Text(text)) => Ok(text),
      Some(_) => {
        Err(TreeError::InvalidAnchor {
          node:   id,
          offset: 0,
        })
      },
      None => Err(TreeError::MissingNode(id)),
    }
  }

  /// Removes everything addressed by `range` and returns the collapsed point
  /// where the removed content used to start.
  ///
  /// Text nodes cut by the range boundaries are trimmed; text nodes and line
  /// breaks entirely inside it are detached. Elements are kept, possibly
  /// empty. Nothing is mutated when any affected node is read-only.
  pub fn delete_contents(&mut self, range: TreeRange) -> Result<Anchor> {
    let order: Vec<NodeId> = self.preorder().collect();
    let start_rank = self.rank(range.start, &order)?;
    let end_rank = self.rank(range.end, &order)?;
    if end_rank < start_rank
      || (range.start.node == range.end.node && range.end.offset < range.start.offset)
    {
      return Err(TreeError::InvertedRange);
    }
    if !self.is_editable(range.start.node) {
      return Err(TreeError::ReadOnly(range.start.node));
    }
    if range.is_collapsed() {
      return Ok(range.start);
    }
    if !self.is_editable(range.end.node) {
      return Err(TreeError::ReadOnly(range.end.node));
    }

    let mut removals = Vec::new();
    for (index, &id) in order.iter().enumerate() {
      let rank = 2 * index + 1;
      if rank <= start_rank || rank >= end_rank {
        continue;
      }
      if matches!(self.nodes[id].kind, NodeKind::Element { .. }) {
        continue;
      }
      if !self.is_editable(id) {
        return Err(TreeError::ReadOnly(id));
      }
      removals.push(id);
    }

    let TreeRange { start, end } = range;
    if start.node == end.node {
      if let Ok(text) = self.text_mut(start.node) {
        let from = byte_index(text, start.offset);
        let to = byte_index(text, end.offset);
        text.replace_range(from..to, "");
      }
    } else {
      if let Ok(text) = self.text_mut(start.node) {
        let from = byte_index(text, start.offset);
        text.truncate(from);
      }
      if let Ok(text) = self.text_mut(end.node) {
        let to = byte_index(text, end.offset);
        text.replace_range(..to, "");
      }
    }

    for id in removals {
      self.remove(id)?;
    }
    Ok(start)
  }

  /// Inserts `text` at `at`, turning every `\n` into a line break node.
  ///
  /// Returns the point right after the inserted content.
  pub fn insert_text(&mut self, at: Anchor, text: &str) -> Result<Anchor> {
    if !self.contains(at.node) {
      return Err(TreeError::MissingNode(at.node));
    }
    if !self.is_editable(at.node) {
      return Err(TreeError::ReadOnly(at.node));
    }

    let mut lines = text.split('\n');
    let first = lines.next().unwrap_or_default();
    let rest: Vec<&str> = lines.collect();

    match self.nodes[at.node].kind {
      NodeKind::Text(_) => {
        let current = self.text_mut(at.node)?;
        if at.offset > current.chars().count() {
          return Err(TreeError::InvalidAnchor {
            node:   at.node,
            offset: at.offset,
          });
        }
        let split = byte_index(current, at.offset);
        let tail = current.split_off(split);
        current.push_str(first);
        if rest.is_empty() {
          current.push_str(&tail);
          return Ok(Anchor::new(at.node, at.offset + first.chars().count()));
        }

        let parent = self.nodes[at.node]
          .parent
          .ok_or(TreeError::MissingNode(at.node))?;
        let index = self.child_index(parent, at.node)? + 1;
        self.insert_lines(parent, index, &rest, &tail)
      },
      NodeKind::Element { .. } => {
        if at.offset > self.nodes[at.node].children.len() {
          return Err(TreeError::InvalidAnchor {
            node:   at.node,
            offset: at.offset,
          });
        }
        self.insert_at_child(at.node, at.offset, first, &rest)
      },
      NodeKind::LineBreak => {
        let parent = self.nodes[at.node]
          .parent
          .ok_or(TreeError::MissingNode(at.node))?;
        let index = self.child_index(parent, at.node)?;
        self.insert_at_child(parent, index, first, &rest)
      },
    }
  }

  fn insert_at_child(
    &mut self,
    parent: NodeId,
    mut index: usize,
    first: &str,
    rest: &[&str],
  ) -> Result<Anchor> {
    if !first.is_empty() {
      let id = self.insert_child(parent, index, NodeKind::Text(first.to_string()))?;
      if rest.is_empty() {
        return Ok(Anchor::new(id, first.chars().count()));
      }
      index += 1;
    }
    if rest.is_empty() {
      return Ok(Anchor::new(parent, index));
    }
    self.insert_lines(parent, index, rest, "")
  }

  /// Emits `<br>` + line for every entry of `lines`; the last line also
  /// receives `tail`, the text that followed the insertion point.
  fn insert_lines(
    &mut self,
    parent: NodeId,
    mut index: usize,
    lines: &[&str],
    tail: &str,
  ) -> Result<Anchor> {
    for (i, line) in lines.iter().enumerate() {
      self.insert_child(parent, index, NodeKind::LineBreak)?;
      index += 1;

      if i + 1 == lines.len() {
        let content = format!("{line}{tail}");
        if content.is_empty() {
          return Ok(Anchor::new(parent, index));
        }
        let id = self.insert_child(parent, index, NodeKind::Text(content))?;
        return Ok(Anchor::new(id, line.chars().count()));
      }

      if !line.is_empty() {
        self.insert_child(parent, index, NodeKind::Text(line.to_string()))?;
        index += 1;
      }
    }
    Ok(Anchor::new(parent, index))
  }
}

pub struct Preorder<'a> {
  tree:  &'a ContentTree,
  stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
  type Item = NodeId;

  fn next(&mut self) -> Option<NodeId> {
    let id = self.stack.pop()?;
    if let Some(node) = self.tree.nodes.get(id) {
      self.stack.extend(node.children.iter().rev().copied());
    }
    Some(id)
  }
}

/// Byte index of the `char_idx`-th char, clamped to the string length.
pub(crate) fn byte_index(text: &str, char_idx: usize) -> usize {
  text
    .char_indices()
    .nth(char_idx)
    .map_or(text.len(), |(idx, _)| idx)
}
