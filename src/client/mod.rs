//! Directory wire surface: the operations a session needs from a server,
//! behind a trait so tests and embedded use run against the in-memory
//! backend.

pub mod config;
pub mod memory;

use std::collections::HashMap;

use crate::core::error::DirectoryError;

pub use config::{AuthMode, ConnectionConfig};
pub use memory::{DirectoryOp, MemoryDirectory};

pub type ClientResult<T> = std::result::Result<T, DirectoryError>;

/// Raw attribute map as a server reports it: attribute name to its
/// value list.
pub type Attributes = HashMap<String, Vec<String>>;

/// One entry returned by a lookup or search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchEntry {
    pub dn: String,
    pub attrs: Attributes,
}

/// Directory modify operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Replace,
    Remove,
}

/// One attribute-level change inside a modify request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modification {
    pub op: ModOp,
    pub attr: String,
    pub values: Vec<String>,
}

impl Modification {
    pub fn add(attr: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ModOp::Add,
            attr: attr.into(),
            values,
        }
    }

    pub fn replace(attr: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ModOp::Replace,
            attr: attr.into(),
            values,
        }
    }

    pub fn remove_values(attr: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ModOp::Remove,
            attr: attr.into(),
            values,
        }
    }

    /// Remove the attribute wholesale.
    pub fn remove_attr(attr: impl Into<String>) -> Self {
        Self {
            op: ModOp::Remove,
            attr: attr.into(),
            values: Vec::new(),
        }
    }
}

/// The directory operations the mapping layer is written against.
///
/// `lookup` and `search` take an optional attribute projection; `None`
/// fetches every attribute of the entry.
pub trait DirectoryClient {
    fn add(&mut self, dn: &str, attrs: Attributes) -> ClientResult<()>;

    fn modify(&mut self, dn: &str, mods: &[Modification]) -> ClientResult<()>;

    fn delete(&mut self, dn: &str) -> ClientResult<()>;

    fn lookup(&mut self, dn: &str, attrs: Option<&[String]>) -> ClientResult<SearchEntry>;

    /// Subtree search under `base` with an LDAP-style filter.
    fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: Option<&[String]>,
    ) -> ClientResult<Vec<SearchEntry>>;
}

/// Hands out connections to a session factory.
///
/// There is no explicit release call: the session owns the boxed client
/// and drops it on [`close`](crate::session::Session::close), so a
/// pooling provider returns the connection from the client's `Drop`.
pub trait ConnectionProvider {
    fn acquire(&self) -> ClientResult<Box<dyn DirectoryClient>>;
}
