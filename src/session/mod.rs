//! The unit of work: one session per connection, an identity cache per
//! session, minimal-diff persistence.

pub mod factory;
pub mod indirect;
pub mod lazy;
pub mod persistent;

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use crate::client::{Attributes, DirectoryClient, Modification, SearchEntry};
use crate::core::error::{DirectoryError, OdmError, Result};
use crate::core::value::{AttributeValue, PropertyValue};
use crate::schema::entity::{Entity, EntitySchema};
use crate::schema::SchemaRegistry;
use crate::track::TrackedSet;

pub use factory::SessionFactory;
pub use indirect::Indirection;
pub use lazy::LazyRef;
pub use persistent::{EntityHandle, Persistent};

/// Attribute projection: attribute name to its value, in requested order.
pub type AttributeMap = IndexMap<String, AttributeValue>;

const OBJECT_CLASS: &str = "objectClass";

pub(crate) struct SessionState {
    id: u64,
    registry: Arc<SchemaRegistry>,
    // None once the session is closed
    client: Option<Box<dyn DirectoryClient>>,
    // lowercased DN -> EntityHandle<T> erased to Any
    cache: HashMap<String, Rc<dyn Any>>,
}

impl SessionState {
    fn ensure_open(&self) -> Result<()> {
        if self.client.is_some() {
            Ok(())
        } else {
            Err(OdmError::Session(format!("session {} is closed", self.id)))
        }
    }

    fn client(&mut self) -> Result<&mut Box<dyn DirectoryClient>> {
        let id = self.id;
        self.client
            .as_mut()
            .ok_or_else(|| OdmError::Session(format!("session {id} is closed")))
    }

    fn cached<T: Entity>(&self, dn: &str) -> Result<Option<EntityHandle<T>>> {
        match self.cache.get(&dn.to_ascii_lowercase()) {
            None => Ok(None),
            Some(erased) => Rc::clone(erased)
                .downcast::<RefCell<Persistent<T>>>()
                .map(Some)
                .map_err(|_| {
                    OdmError::Session(format!("{dn} is cached as a different entity type"))
                }),
        }
    }

    fn cache_put<T: Entity>(&mut self, dn: &str, handle: &EntityHandle<T>) {
        self.cache
            .insert(dn.to_ascii_lowercase(), Rc::clone(handle) as Rc<dyn Any>);
    }

    fn evict(&mut self, dn: &str) {
        self.cache.remove(&dn.to_ascii_lowercase());
    }
}

/// A single-threaded unit of work over one directory connection.
///
/// Within a session every DN maps to at most one entity instance: reads
/// and searches hand out the same handle for the same entry. Clones
/// share state, so a session can be passed around a call tree freely.
/// Once closed, every further operation fails with a session error.
#[derive(Clone)]
pub struct Session {
    state: Rc<RefCell<SessionState>>,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        registry: Arc<SchemaRegistry>,
        client: Box<dyn DirectoryClient>,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(SessionState {
                id,
                registry,
                client: Some(client),
                cache: HashMap::new(),
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.state.borrow().id
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().client.is_none()
    }

    pub fn registry(&self) -> Arc<SchemaRegistry> {
        Arc::clone(&self.state.borrow().registry)
    }

    /// Persist a new entry and return its DN.
    ///
    /// The identity property must carry a value. The new entry is not
    /// cached: callers wanting the directory-side state read it back.
    pub fn create<T: Entity>(&self, entity: &T) -> Result<String> {
        self.state.borrow().ensure_open()?;
        let schema = self.state.borrow().registry.entity::<T>()?;

        let id_value = schema
            .id()
            .get(entity)
            .as_ref()
            .and_then(PropertyValue::as_text)
            .map(|v| schema.id().codec().encode(v))
            .ok_or_else(|| {
                OdmError::Session(format!(
                    "{}: an identity value is required to create",
                    schema.type_name()
                ))
            })?;
        let dn = schema.dn_for(&id_value);

        let mut attrs = Attributes::new();
        if !schema.object_classes().is_empty() {
            attrs.insert(OBJECT_CLASS.to_string(), schema.object_classes().to_vec());
        }
        for p in schema.properties() {
            let values = match p.get(entity) {
                None => continue,
                Some(PropertyValue::Text(s)) => vec![p.codec().encode(&s)],
                Some(PropertyValue::Ref(r)) => vec![r.dn().to_string()],
                Some(PropertyValue::TextSet(set)) => set
                    .elements()
                    .iter()
                    .map(|v| p.codec().encode(v))
                    .collect(),
                Some(PropertyValue::RefSet(set)) => set
                    .elements()
                    .iter()
                    .map(|r| r.dn().to_string())
                    .collect(),
            };
            if !values.is_empty() {
                attrs.insert(p.attr().to_string(), values);
            }
        }

        debug!("create {dn}");
        self.state.borrow_mut().client()?.add(&dn, attrs)?;
        Ok(dn)
    }

    /// Load the entry at `dn`, or `Ok(None)` when it does not exist.
    ///
    /// A cache hit returns the same instance without touching the
    /// directory.
    pub fn read<T: Entity>(&self, dn: &str) -> Result<Option<EntityHandle<T>>> {
        read_by_dn::<T>(&self.state, dn)
    }

    /// A projection of the entry at `dn` as a plain attribute map.
    ///
    /// Served from the cached entity when one is present; reference
    /// values project to their target DNs either way.
    pub fn read_attributes<T: Entity>(
        &self,
        dn: &str,
        names: &[&str],
    ) -> Result<Option<AttributeMap>> {
        self.state.borrow().ensure_open()?;
        let schema = self.state.borrow().registry.entity::<T>()?;

        if let Some(handle) = self.state.borrow().cached::<T>(dn)? {
            debug!("read_attributes {dn}: serving from cache");
            return Ok(Some(project_entity(&handle.borrow(), names)));
        }

        let wanted: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let entry = {
            let mut state = self.state.borrow_mut();
            match state.client()?.lookup(dn, Some(&wanted)) {
                Ok(entry) => entry,
                Err(DirectoryError::NotFound(_)) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        };
        Ok(Some(project_entry(&schema, &entry, names)))
    }

    /// Subtree search under the type's context. Within one call (and
    /// while cached), equal DNs yield the same instance.
    pub fn search<T: Entity>(&self, filter: &str) -> Result<Vec<EntityHandle<T>>> {
        self.state.borrow().ensure_open()?;
        let schema = self.state.borrow().registry.entity::<T>()?;

        let entries = {
            let mut state = self.state.borrow_mut();
            state
                .client()?
                .search(schema.context(), filter, Some(schema.attr_names()))?
        };
        debug!(
            "search {} filter={filter}: {} entries",
            schema.context(),
            entries.len()
        );

        let mut handles = Vec::with_capacity(entries.len());
        for entry in &entries {
            if let Some(cached) = self.state.borrow().cached::<T>(&entry.dn)? {
                handles.push(cached);
                continue;
            }
            let handle = populate(&self.state, &schema, entry);
            self.state.borrow_mut().cache_put(&entry.dn, &handle);
            handles.push(handle);
        }
        Ok(handles)
    }

    /// First match of [`search`](Session::search), or `None`.
    pub fn unique_search<T: Entity>(&self, filter: &str) -> Result<Option<EntityHandle<T>>> {
        Ok(self.search::<T>(filter)?.into_iter().next())
    }

    /// Subtree search returning plain projections, uncached.
    pub fn search_attributes<T: Entity>(
        &self,
        filter: &str,
        names: &[&str],
    ) -> Result<Vec<(String, AttributeMap)>> {
        self.state.borrow().ensure_open()?;
        let schema = self.state.borrow().registry.entity::<T>()?;
        let wanted: Vec<String> = names.iter().map(|n| n.to_string()).collect();

        let entries = {
            let mut state = self.state.borrow_mut();
            state
                .client()?
                .search(schema.context(), filter, Some(&wanted))?
        };
        Ok(entries
            .into_iter()
            .map(|entry| {
                let map = project_entry(&schema, &entry, names);
                (entry.dn, map)
            })
            .collect())
    }

    /// First match of [`search_attributes`](Session::search_attributes),
    /// or `None`.
    pub fn unique_search_attributes<T: Entity>(
        &self,
        filter: &str,
        names: &[&str],
    ) -> Result<Option<(String, AttributeMap)>> {
        Ok(self
            .search_attributes::<T>(filter, names)?
            .into_iter()
            .next())
    }

    /// Subtree search returning matching DNs only.
    pub fn lookup(&self, context: &str, filter: &str) -> Result<Vec<String>> {
        self.state.borrow().ensure_open()?;
        let no_attrs: &[String] = &[];
        let entries = {
            let mut state = self.state.borrow_mut();
            state.client()?.search(context, filter, Some(no_attrs))?
        };
        Ok(entries.into_iter().map(|entry| entry.dn).collect())
    }

    /// Schema-less subtree search: raw entries, no codec applied.
    pub fn search_raw(
        &self,
        context: &str,
        filter: &str,
        names: Option<&[&str]>,
    ) -> Result<Vec<SearchEntry>> {
        self.state.borrow().ensure_open()?;
        let wanted: Option<Vec<String>> =
            names.map(|ns| ns.iter().map(|n| n.to_string()).collect());
        let mut state = self.state.borrow_mut();
        Ok(state.client()?.search(context, filter, wanted.as_deref())?)
    }

    /// Persist the changes recorded on a managed entity.
    ///
    /// The modification set is minimal: touched single-valued properties
    /// and per-container deltas. Nothing changed means no directory
    /// call. On success all change records are reset, so a repeated
    /// update is a no-op.
    pub fn update<T: Entity>(&self, handle: &EntityHandle<T>) -> Result<()> {
        self.state.borrow().ensure_open()?;
        let mut persistent = handle.borrow_mut();
        let schema = Arc::clone(persistent.schema());

        let mut mods = Vec::new();
        let mut containers = Vec::new();
        for p in schema.properties() {
            if p.is_id() || p.is_readonly() {
                continue;
            }
            let value = p.get(persistent.value());
            if p.is_multiple() {
                match value {
                    Some(PropertyValue::TextSet(set)) => {
                        if set.is_tracking() {
                            let added: Vec<String> = set
                                .added_elements()
                                .iter()
                                .map(|v| p.codec().encode(v))
                                .collect();
                            let removed: Vec<String> = set
                                .removed_elements()
                                .iter()
                                .map(|v| p.codec().encode(v))
                                .collect();
                            if !added.is_empty() {
                                mods.push(Modification::add(p.attr(), added));
                            }
                            if !removed.is_empty() {
                                mods.push(Modification::remove_values(p.attr(), removed));
                            }
                        } else {
                            // plain substituted collection: wholesale replace
                            let all: Vec<String> = set
                                .elements()
                                .iter()
                                .map(|v| p.codec().encode(v))
                                .collect();
                            mods.push(Modification::replace(p.attr(), all));
                        }
                        containers.push(PropertyValue::TextSet(set));
                    }
                    Some(PropertyValue::RefSet(set)) => {
                        if set.is_tracking() {
                            let added: Vec<String> = set
                                .added_elements()
                                .iter()
                                .map(|r| r.dn().to_string())
                                .collect();
                            let removed: Vec<String> = set
                                .removed_elements()
                                .iter()
                                .map(|r| r.dn().to_string())
                                .collect();
                            if !added.is_empty() {
                                mods.push(Modification::add(p.attr(), added));
                            }
                            if !removed.is_empty() {
                                mods.push(Modification::remove_values(p.attr(), removed));
                            }
                        } else {
                            let all: Vec<String> = set
                                .elements()
                                .iter()
                                .map(|r| r.dn().to_string())
                                .collect();
                            mods.push(Modification::replace(p.attr(), all));
                        }
                        containers.push(PropertyValue::RefSet(set));
                    }
                    _ => {
                        if persistent.is_touched(p.name()) {
                            mods.push(Modification::remove_attr(p.attr()));
                        }
                    }
                }
            } else if persistent.is_touched(p.name()) {
                match value {
                    Some(PropertyValue::Text(s)) => {
                        mods.push(Modification::replace(p.attr(), vec![p.codec().encode(&s)]));
                    }
                    Some(PropertyValue::Ref(r)) => {
                        mods.push(Modification::replace(p.attr(), vec![r.dn().to_string()]));
                    }
                    _ => mods.push(Modification::remove_attr(p.attr())),
                }
            }
        }

        if mods.is_empty() {
            debug!("update {}: nothing changed", persistent.dn());
            return Ok(());
        }

        debug!("update {}: {} modifications", persistent.dn(), mods.len());
        {
            let dn = persistent.dn().to_string();
            let mut state = self.state.borrow_mut();
            state.client()?.modify(&dn, &mods)?;
        }

        persistent.clear_touched();
        for container in &mut containers {
            match container {
                PropertyValue::TextSet(set) => reset_container(set),
                PropertyValue::RefSet(set) => reset_container(set),
                _ => {}
            }
        }
        Ok(())
    }

    /// Remove the entry at `dn`. Missing entries delete as a no-op.
    pub fn delete(&self, dn: &str) -> Result<()> {
        self.state.borrow().ensure_open()?;
        let outcome = {
            let mut state = self.state.borrow_mut();
            state.client()?.delete(dn)
        };
        match outcome {
            Ok(()) | Err(DirectoryError::NotFound(_)) => {
                self.state.borrow_mut().evict(dn);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn delete_entity<T: Entity>(&self, handle: &EntityHandle<T>) -> Result<()> {
        let dn = handle.borrow().dn().to_string();
        self.delete(&dn)
    }

    /// Drop the cache and release the connection. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.borrow_mut();
        if state.client.is_some() {
            debug!("session {} closed", state.id);
        }
        state.cache.clear();
        state.client = None;
    }
}

/// Shared read path for `Session::read` and lazy-reference resolution.
pub(crate) fn read_by_dn<T: Entity>(
    state: &Rc<RefCell<SessionState>>,
    dn: &str,
) -> Result<Option<EntityHandle<T>>> {
    state.borrow().ensure_open()?;
    if let Some(cached) = state.borrow().cached::<T>(dn)? {
        return Ok(Some(cached));
    }

    let schema = state.borrow().registry.entity::<T>()?;
    let entry = {
        let mut s = state.borrow_mut();
        match s.client()?.lookup(dn, Some(schema.attr_names())) {
            Ok(entry) => entry,
            Err(DirectoryError::NotFound(_)) => {
                debug!("read {dn}: not found");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }
    };

    let handle = populate(state, &schema, &entry);
    state.borrow_mut().cache_put(&entry.dn, &handle);
    Ok(Some(handle))
}

/// Build a managed entity from a raw entry: singles decoded through
/// their codec, references wired as session-bound lazy handles, absent
/// multi-valued properties seeded with empty tracked containers.
fn populate<T: Entity>(
    state: &Rc<RefCell<SessionState>>,
    schema: &Arc<EntitySchema<T>>,
    entry: &SearchEntry,
) -> EntityHandle<T> {
    let mut value = T::default();
    for p in schema.properties() {
        let values = attr_values(&entry.attrs, p.attr());
        let property_value = if p.is_multiple() {
            if p.is_reference() {
                let refs = values
                    .iter()
                    .flat_map(|vs| vs.iter())
                    .map(|dn| LazyRef::attached(dn.as_str(), state));
                Some(PropertyValue::RefSet(TrackedSet::tracked(refs)))
            } else {
                let texts = values
                    .iter()
                    .flat_map(|vs| vs.iter())
                    .map(|v| p.codec().decode(v));
                Some(PropertyValue::TextSet(TrackedSet::tracked(texts)))
            }
        } else {
            match values.and_then(|vs| vs.first()) {
                None => None,
                Some(v) if p.is_reference() => {
                    Some(PropertyValue::Ref(LazyRef::attached(v.as_str(), state)))
                }
                Some(v) => Some(PropertyValue::Text(p.codec().decode(v))),
            }
        };
        p.set(&mut value, property_value);
    }

    let mut persistent = Persistent::new(Arc::clone(schema), entry.dn.clone(), value);
    persistent.enable_tracking();
    Rc::new(RefCell::new(persistent))
}

fn attr_values<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a Vec<String>> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Project a cached entity onto a plain attribute map, in requested
/// order. References render as their target DNs without resolving.
fn project_entity<T: Entity>(persistent: &Persistent<T>, names: &[&str]) -> AttributeMap {
    let schema = persistent.schema();
    let mut map = AttributeMap::new();
    for &name in names {
        let Some(p) = schema.property(name) else { continue };
        let value = match p.get(persistent.value()) {
            None => continue,
            Some(PropertyValue::Text(s)) => AttributeValue::Single(s),
            Some(PropertyValue::Ref(r)) => AttributeValue::Single(r.dn().to_string()),
            Some(PropertyValue::TextSet(set)) => AttributeValue::Multi(set.elements()),
            Some(PropertyValue::RefSet(set)) => AttributeValue::Multi(
                set.elements().iter().map(|r| r.dn().to_string()).collect(),
            ),
        };
        map.insert(p.attr().to_string(), value);
    }
    map
}

/// Project a raw entry onto a plain attribute map. Known attributes are
/// decoded through their codec and shaped by declared multiplicity;
/// unknown ones keep the server's shape.
fn project_entry<T: Entity>(
    schema: &EntitySchema<T>,
    entry: &SearchEntry,
    names: &[&str],
) -> AttributeMap {
    let mut map = AttributeMap::new();
    for &name in names {
        let Some(values) = attr_values(&entry.attrs, name) else {
            continue;
        };
        let value = match schema.property(name) {
            Some(p) => {
                let decoded: Vec<String> = values.iter().map(|v| p.codec().decode(v)).collect();
                if p.is_multiple() {
                    AttributeValue::Multi(decoded)
                } else {
                    match decoded.into_iter().next() {
                        Some(first) => AttributeValue::Single(first),
                        None => continue,
                    }
                }
            }
            None if values.len() > 1 => AttributeValue::Multi(values.clone()),
            None => match values.first() {
                Some(first) => AttributeValue::Single(first.clone()),
                None => continue,
            },
        };
        map.insert(name.to_string(), value);
    }
    map
}

fn reset_container<E: std::hash::Hash + Eq + Clone>(set: &mut TrackedSet<E>) {
    if set.is_tracking() {
        set.clear_changes();
    } else {
        set.enable_tracking();
    }
}
