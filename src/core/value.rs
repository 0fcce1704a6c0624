use serde::Serialize;

use crate::session::lazy::LazyRef;
use crate::track::TrackedSet;

/// The value exchanged through a mapped property's accessors.
///
/// All directory values are strings; multiplicity and the reference flag
/// decide which variant a property carries. Multi-valued variants hold
/// change-tracking containers so the session can diff them on update.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Single-valued plain attribute.
    Text(String),
    /// Multi-valued plain attribute.
    TextSet(TrackedSet<String>),
    /// Single-valued link to another mapped entry.
    Ref(LazyRef),
    /// Multi-valued link to other mapped entries.
    RefSet(TrackedSet<LazyRef>),
}

impl PropertyValue {
    pub fn text(value: impl Into<String>) -> Option<Self> {
        Some(PropertyValue::Text(value.into()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_text_set(&self) -> Option<&TrackedSet<String>> {
        match self {
            PropertyValue::TextSet(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_value(&self) -> Option<&LazyRef> {
        match self {
            PropertyValue::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_ref_set(&self) -> Option<&TrackedSet<LazyRef>> {
        match self {
            PropertyValue::RefSet(s) => Some(s),
            _ => None,
        }
    }
}

/// A raw attribute value as returned by the projection reads
/// (`read_attributes`, `search_attributes`, `search_raw`).
///
/// Serializes untagged, so a projected entry renders as plain JSON:
/// strings for single-valued attributes, arrays for multi-valued ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    Multi(Vec<String>),
}

impl AttributeValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_multi(&self) -> Option<&[String]> {
        match self {
            AttributeValue::Multi(v) => Some(v),
            _ => None,
        }
    }
}
