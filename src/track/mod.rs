//! Change-tracking containers.
//!
//! A tracked collection records which elements were added and removed
//! since the last checkpoint, so the session can turn a multi-valued
//! attribute's edits into a minimal set of directory modifications
//! instead of rewriting the whole attribute.

mod list;
mod set;

pub use list::TrackedList;
pub use set::{ChangeStrategy, TrackedSet};
