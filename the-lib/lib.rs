use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod cache;
pub mod candidate;
pub mod content;
pub mod host;
pub mod insert;
pub mod position;
pub mod range;
pub mod remote;
pub mod store;
pub mod surface;
pub mod tree;

pub type Tendril = SmartString<LazyCompact>;
