use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use log::debug;

use crate::client::{
    Attributes, ClientResult, ConnectionProvider, DirectoryClient, ModOp, Modification,
    SearchEntry,
};
use crate::core::dn;
use crate::core::error::DirectoryError;

/// One recorded server-side operation, kept so callers can assert what a
/// session actually sent over the wire. Reads are recorded as well, so
/// cache-hit paths can be shown to cost nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryOp {
    Add { dn: String },
    Modify { dn: String, mods: Vec<Modification> },
    Delete { dn: String },
    Lookup { dn: String },
    Search { base: String, filter: String },
}

#[derive(Clone, Debug)]
struct Entry {
    dn: String,
    // canonical attribute names as first written, values in insertion order
    attrs: IndexMap<String, Vec<String>>,
}

#[derive(Default)]
struct Inner {
    // keyed by lowercased DN, ordered for deterministic search results
    entries: BTreeMap<String, Entry>,
    ops: Vec<DirectoryOp>,
}

/// In-memory directory backend.
///
/// Clones share the same store, so one instance can serve as both the
/// connection provider handed to a factory and the handle a test uses to
/// seed entries and inspect the operation log.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry directly, bypassing the operation log.
    pub fn seed(&self, dn: &str, attrs: &[(&str, &[&str])]) {
        let mut inner = self.inner.lock().expect("directory store poisoned");
        let mut map = IndexMap::new();
        for (attr, values) in attrs {
            map.insert(
                attr.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
        inner.entries.insert(
            dn.to_ascii_lowercase(),
            Entry {
                dn: dn.to_string(),
                attrs: map,
            },
        );
    }

    pub fn contains(&self, dn: &str) -> bool {
        let inner = self.inner.lock().expect("directory store poisoned");
        inner.entries.contains_key(&dn.to_ascii_lowercase())
    }

    /// Values of one attribute of one entry, if both exist.
    pub fn attribute(&self, dn: &str, attr: &str) -> Option<Vec<String>> {
        let inner = self.inner.lock().expect("directory store poisoned");
        let entry = inner.entries.get(&dn.to_ascii_lowercase())?;
        find_attr(&entry.attrs, attr).map(|(_, values)| values.clone())
    }

    /// Every operation recorded since the last `clear_ops`.
    pub fn ops(&self) -> Vec<DirectoryOp> {
        let inner = self.inner.lock().expect("directory store poisoned");
        inner.ops.clone()
    }

    pub fn clear_ops(&self) {
        let mut inner = self.inner.lock().expect("directory store poisoned");
        inner.ops.clear();
    }

    /// Modify operations recorded against one DN.
    pub fn modify_ops_for(&self, dn: &str) -> Vec<Vec<Modification>> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                DirectoryOp::Modify { dn: d, mods } if d.eq_ignore_ascii_case(dn) => Some(mods),
                _ => None,
            })
            .collect()
    }
}

impl MemoryDirectory {
    fn locked(&self) -> ClientResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| DirectoryError::Protocol("directory store lock poisoned".to_string()))
    }
}

impl DirectoryClient for MemoryDirectory {
    fn add(&mut self, dn: &str, attrs: Attributes) -> ClientResult<()> {
        let mut inner = self.locked()?;
        let key = dn.to_ascii_lowercase();
        if inner.entries.contains_key(&key) {
            return Err(DirectoryError::AlreadyBound(dn.to_string()));
        }
        debug!("add {dn}");
        let mut map = IndexMap::new();
        for (attr, values) in attrs {
            map.insert(attr, values);
        }
        inner.entries.insert(
            key,
            Entry {
                dn: dn.to_string(),
                attrs: map,
            },
        );
        inner.ops.push(DirectoryOp::Add { dn: dn.to_string() });
        Ok(())
    }

    fn modify(&mut self, dn: &str, mods: &[Modification]) -> ClientResult<()> {
        let mut inner = self.locked()?;
        let key = dn.to_ascii_lowercase();
        let Some(entry) = inner.entries.get_mut(&key) else {
            return Err(DirectoryError::NotFound(dn.to_string()));
        };
        debug!("modify {dn}: {} changes", mods.len());
        for m in mods {
            apply_modification(&mut entry.attrs, m);
        }
        inner.ops.push(DirectoryOp::Modify {
            dn: dn.to_string(),
            mods: mods.to_vec(),
        });
        Ok(())
    }

    fn delete(&mut self, dn: &str) -> ClientResult<()> {
        let mut inner = self.locked()?;
        let key = dn.to_ascii_lowercase();
        if inner.entries.remove(&key).is_none() {
            return Err(DirectoryError::NotFound(dn.to_string()));
        }
        debug!("delete {dn}");
        inner.ops.push(DirectoryOp::Delete { dn: dn.to_string() });
        Ok(())
    }

    fn lookup(&mut self, dn: &str, attrs: Option<&[String]>) -> ClientResult<SearchEntry> {
        let mut inner = self.locked()?;
        inner.ops.push(DirectoryOp::Lookup { dn: dn.to_string() });
        let entry = inner
            .entries
            .get(&dn.to_ascii_lowercase())
            .ok_or_else(|| DirectoryError::NotFound(dn.to_string()))?;
        Ok(project(entry, attrs))
    }

    fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: Option<&[String]>,
    ) -> ClientResult<Vec<SearchEntry>> {
        let parsed = Filter::parse(filter)?;
        let mut inner = self.locked()?;
        inner.ops.push(DirectoryOp::Search {
            base: base.to_string(),
            filter: filter.to_string(),
        });
        let mut results = Vec::new();
        for entry in inner.entries.values() {
            let in_scope = dn::equal(&entry.dn, base) || dn::within_context(&entry.dn, base);
            if in_scope && parsed.matches(&entry.attrs) {
                results.push(project(entry, attrs));
            }
        }
        debug!("search base={base} filter={filter}: {} hits", results.len());
        Ok(results)
    }
}

impl ConnectionProvider for MemoryDirectory {
    fn acquire(&self) -> ClientResult<Box<dyn DirectoryClient>> {
        Ok(Box::new(self.clone()))
    }
}

fn find_attr<'a>(
    attrs: &'a IndexMap<String, Vec<String>>,
    name: &str,
) -> Option<(&'a str, &'a Vec<String>)> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(k, v)| (k.as_str(), v))
}

fn apply_modification(attrs: &mut IndexMap<String, Vec<String>>, m: &Modification) {
    let existing = attrs
        .keys()
        .find(|k| k.eq_ignore_ascii_case(&m.attr))
        .cloned();
    match m.op {
        ModOp::Add => {
            let key = existing.unwrap_or_else(|| m.attr.clone());
            let values = attrs.entry(key).or_default();
            for v in &m.values {
                if !values.iter().any(|have| have.eq_ignore_ascii_case(v)) {
                    values.push(v.clone());
                }
            }
        }
        ModOp::Replace => {
            if let Some(key) = existing {
                attrs.shift_remove(&key);
            }
            if !m.values.is_empty() {
                attrs.insert(m.attr.clone(), m.values.clone());
            }
        }
        ModOp::Remove => {
            let Some(key) = existing else { return };
            if m.values.is_empty() {
                attrs.shift_remove(&key);
                return;
            }
            if let Some(values) = attrs.get_mut(&key) {
                values.retain(|have| !m.values.iter().any(|v| v.eq_ignore_ascii_case(have)));
                if values.is_empty() {
                    attrs.shift_remove(&key);
                }
            }
        }
    }
}

fn project(entry: &Entry, attrs: Option<&[String]>) -> SearchEntry {
    let attrs = match attrs {
        None => entry
            .attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Some(wanted) => wanted
            .iter()
            .filter_map(|name| {
                find_attr(&entry.attrs, name).map(|(k, v)| (k.to_string(), v.clone()))
            })
            .collect(),
    };
    SearchEntry {
        dn: entry.dn.clone(),
        attrs,
    }
}

/// Minimal LDAP filter evaluator: equality, presence, `&`, `|` and `!`.
#[derive(Debug)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equals(String, String),
}

impl Filter {
    fn parse(input: &str) -> ClientResult<Self> {
        let (filter, rest) = Self::parse_one(input.trim())
            .ok_or_else(|| DirectoryError::InvalidFilter(input.to_string()))?;
        if rest.is_empty() {
            Ok(filter)
        } else {
            Err(DirectoryError::InvalidFilter(input.to_string()))
        }
    }

    fn parse_one(input: &str) -> Option<(Self, &str)> {
        let rest = input.strip_prefix('(')?;
        match rest.chars().next()? {
            '&' | '|' => {
                let or = rest.starts_with('|');
                let mut rest = &rest[1..];
                let mut children = Vec::new();
                while rest.starts_with('(') {
                    let (child, tail) = Self::parse_one(rest)?;
                    children.push(child);
                    rest = tail;
                }
                let rest = rest.strip_prefix(')')?;
                if children.is_empty() {
                    return None;
                }
                let filter = if or {
                    Filter::Or(children)
                } else {
                    Filter::And(children)
                };
                Some((filter, rest))
            }
            '!' => {
                let (child, rest) = Self::parse_one(&rest[1..])?;
                let rest = rest.strip_prefix(')')?;
                Some((Filter::Not(Box::new(child)), rest))
            }
            _ => {
                let close = rest.find(')')?;
                let body = &rest[..close];
                let eq = body.find('=')?;
                let attr = body[..eq].trim();
                let value = &body[eq + 1..];
                if attr.is_empty() {
                    return None;
                }
                let filter = if value == "*" {
                    Filter::Present(attr.to_string())
                } else {
                    Filter::Equals(attr.to_string(), value.to_string())
                };
                Some((filter, &rest[close + 1..]))
            }
        }
    }

    fn matches(&self, attrs: &IndexMap<String, Vec<String>>) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|c| c.matches(attrs)),
            Filter::Or(children) => children.iter().any(|c| c.matches(attrs)),
            Filter::Not(child) => !child.matches(attrs),
            Filter::Present(attr) => {
                find_attr(attrs, attr).is_some_and(|(_, values)| !values.is_empty())
            }
            Filter::Equals(attr, wanted) => find_attr(attrs, attr)
                .is_some_and(|(_, values)| values.iter().any(|v| v.eq_ignore_ascii_case(wanted))),
        }
    }
}
