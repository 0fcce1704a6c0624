//! Relation synchronization: keeping the two back-pointer attributes of
//! an indirection consistent, with the minimal set of modifies.

use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexSet;
use log::{debug, warn};

use crate::client::Modification;
use crate::core::error::Result;
use crate::schema::relation::{Relation, RelationSchema};
use crate::session::{attr_values, Session};
use crate::track::TrackedSet;

/// The persisted state of an indirection, captured when it was loaded or
/// last synchronized. Delete and the one-side-changed update path work
/// from this, not from the possibly-mutated in-memory value.
#[derive(Clone)]
struct Snapshot {
    one: Option<String>,
    many: IndexSet<String>,
}

/// A runtime view of one relation instance: the one-side identity value
/// and the member DNs.
///
/// Values built by hand are *transient*; values returned by
/// [`Session::search_indirections`] are *persistent* and carry the
/// loaded state as a snapshot, which is what the delta computation on
/// update diffs against.
pub struct Indirection<R: Relation> {
    one: Option<String>,
    many: TrackedSet<String>,
    snapshot: Option<Snapshot>,
    _marker: PhantomData<R>,
}

impl<R: Relation> Indirection<R> {
    /// A transient, empty indirection.
    pub fn new() -> Self {
        Self {
            one: None,
            many: TrackedSet::new(),
            snapshot: None,
            _marker: PhantomData,
        }
    }

    pub fn with_one(one: impl Into<String>) -> Self {
        let mut ind = Self::new();
        ind.one = Some(one.into());
        ind
    }

    pub fn one(&self) -> Option<&str> {
        self.one.as_deref()
    }

    pub fn set_one(&mut self, one: Option<String>) {
        self.one = one;
    }

    /// The member-DN container. Clones share state, so mutating the
    /// returned handle mutates this indirection.
    pub fn many(&self) -> TrackedSet<String> {
        self.many.clone()
    }

    /// Substitute the member container wholesale.
    pub fn set_many(&mut self, many: TrackedSet<String>) {
        self.many = many;
    }

    pub fn is_persistent(&self) -> bool {
        self.snapshot.is_some()
    }

    fn refresh(&mut self) {
        self.snapshot = Some(Snapshot {
            one: self.one.clone(),
            many: self.many.elements().into_iter().collect(),
        });
        if self.many.is_tracking() {
            self.many.clear_changes();
        } else {
            self.many.enable_tracking();
        }
    }
}

impl<R: Relation> Default for Indirection<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Relation> fmt::Debug for Indirection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "one={:?} | many={:?} | persistent={}",
            self.one,
            self.many,
            self.is_persistent()
        )
    }
}

impl Session {
    /// Establish the links of a transient indirection. A persistent
    /// value delegates to [`update_indirection`](Session::update_indirection).
    ///
    /// With no one side the call is a logged no-op and the value stays
    /// transient.
    pub fn create_indirection<R: Relation>(&self, ind: &mut Indirection<R>) -> Result<()> {
        self.state.borrow().ensure_open()?;
        if ind.is_persistent() {
            return self.update_indirection(ind);
        }
        let schema = self.state.borrow().registry.relation::<R>()?;

        let Some(one) = ind.one.clone() else {
            debug!("{}: no one side, nothing to connect", schema.name());
            return Ok(());
        };
        let one_dn = schema.one_dn_for(&one);
        let members = ind.many.elements();
        if members.is_empty() {
            debug!("{}: no members, nothing to connect", schema.name());
        } else {
            self.connect_pair(&schema, &one_dn, &members)?;
        }
        ind.refresh();
        Ok(())
    }

    /// Synchronize a persistent indirection with the directory.
    ///
    /// The one side unchanged means only member deltas are written;
    /// untouched members never see a modify. A changed one side moves
    /// the whole relation: full disconnect of the snapshot pair, full
    /// connect of the current pair. An emptied value tears the snapshot
    /// pair down. Afterwards the snapshot is the current state and the
    /// deltas are clear.
    pub fn update_indirection<R: Relation>(&self, ind: &mut Indirection<R>) -> Result<()> {
        self.state.borrow().ensure_open()?;
        let Some(snapshot) = ind.snapshot.clone() else {
            return self.create_indirection(ind);
        };
        let schema = self.state.borrow().registry.relation::<R>()?;

        let current_many = ind.many.elements();
        if ind.one.is_none() || current_many.is_empty() {
            match &snapshot.one {
                Some(snap_one) if !snapshot.many.is_empty() => {
                    let one_dn = schema.one_dn_for(snap_one);
                    let members: Vec<String> = snapshot.many.iter().cloned().collect();
                    self.disconnect_pair(&schema, &one_dn, &members)?;
                }
                _ => debug!("{}: nothing to disconnect", schema.name()),
            }
        } else if ind.one == snapshot.one {
            // same owner: write only the membership deltas
            let one = ind.one.as_deref().unwrap_or_default();
            let one_dn = schema.one_dn_for(one);
            let (added, removed) = if ind.many.is_tracking() {
                (ind.many.added_elements(), ind.many.removed_elements())
            } else {
                // plain substituted container: diff against the snapshot
                let added = current_many
                    .iter()
                    .filter(|dn| !snapshot.many.contains(*dn))
                    .cloned()
                    .collect();
                let removed = snapshot
                    .many
                    .iter()
                    .filter(|dn| !ind.many.contains(*dn))
                    .cloned()
                    .collect();
                (added, removed)
            };
            self.disconnect_pair(&schema, &one_dn, &removed)?;
            self.connect_pair(&schema, &one_dn, &added)?;
        } else {
            // owner changed: move the relation wholesale
            if let Some(snap_one) = &snapshot.one {
                if !snapshot.many.is_empty() {
                    let old_dn = schema.one_dn_for(snap_one);
                    let members: Vec<String> = snapshot.many.iter().cloned().collect();
                    self.disconnect_pair(&schema, &old_dn, &members)?;
                }
            }
            let one = ind.one.as_deref().unwrap_or_default();
            let one_dn = schema.one_dn_for(one);
            self.connect_pair(&schema, &one_dn, &current_many)?;
        }

        ind.refresh();
        Ok(())
    }

    /// Tear down an indirection's links.
    ///
    /// Persistent values disconnect their snapshot (the in-memory value
    /// may already be mutated); transient values disconnect what they
    /// currently hold.
    pub fn delete_indirection<R: Relation>(&self, ind: &Indirection<R>) -> Result<()> {
        self.state.borrow().ensure_open()?;
        let schema = self.state.borrow().registry.relation::<R>()?;

        let (one, members) = match &ind.snapshot {
            Some(snapshot) => (
                snapshot.one.clone(),
                snapshot.many.iter().cloned().collect::<Vec<_>>(),
            ),
            None => (ind.one.clone(), ind.many.elements()),
        };
        match one {
            Some(one) if !members.is_empty() => {
                let one_dn = schema.one_dn_for(&one);
                self.disconnect_pair(&schema, &one_dn, &members)
            }
            _ => {
                debug!("{}: nothing to disconnect", schema.name());
                Ok(())
            }
        }
    }

    /// Search the one side's sub-tree and return persistent indirection
    /// values, snapshot initialized from the loaded state.
    pub fn search_indirections<R: Relation>(&self, filter: &str) -> Result<Vec<Indirection<R>>> {
        self.state.borrow().ensure_open()?;
        let schema = self.state.borrow().registry.relation::<R>()?;
        let one_end = schema.one();
        let wanted = vec![one_end.id_attr.clone(), one_end.link_attr.clone()];

        let entries = {
            let mut state = self.state.borrow_mut();
            state
                .client()?
                .search(&one_end.context, filter, Some(&wanted))?
        };
        debug!(
            "search indirections {} filter={filter}: {} entries",
            schema.name(),
            entries.len()
        );

        Ok(entries
            .into_iter()
            .map(|entry| {
                let one = attr_values(&entry.attrs, &one_end.id_attr)
                    .and_then(|vs| vs.first())
                    .cloned();
                let members: Vec<String> = attr_values(&entry.attrs, &one_end.link_attr)
                    .map(|vs| vs.clone())
                    .unwrap_or_default();
                Indirection {
                    one: one.clone(),
                    many: TrackedSet::tracked(members.iter().cloned()),
                    snapshot: Some(Snapshot {
                        one,
                        many: members.into_iter().collect(),
                    }),
                    _marker: PhantomData,
                }
            })
            .collect())
    }

    /// First match of
    /// [`search_indirections`](Session::search_indirections), or `None`.
    pub fn unique_search_indirection<R: Relation>(
        &self,
        filter: &str,
    ) -> Result<Option<Indirection<R>>> {
        Ok(self.search_indirections::<R>(filter)?.into_iter().next())
    }

    /// One modify on the one side adding every member DN, then one
    /// modify per member adding the back pointer. A member matching no
    /// descriptor is skipped with a warning.
    fn connect_pair(
        &self,
        schema: &RelationSchema,
        one_dn: &str,
        members: &[String],
    ) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        debug!("connect {one_dn}: {} members", members.len());
        {
            let mut state = self.state.borrow_mut();
            state.client()?.modify(
                one_dn,
                &[Modification::add(
                    schema.one().link_attr.clone(),
                    members.to_vec(),
                )],
            )?;
        }
        for member in members {
            let Some(attr) = schema.link_attr_for(member) else {
                warn!("{}: no descriptor matches {member}, skipping", schema.name());
                continue;
            };
            let mut state = self.state.borrow_mut();
            state
                .client()?
                .modify(member, &[Modification::add(attr, vec![one_dn.to_string()])])?;
        }
        Ok(())
    }

    /// Mirror of [`connect_pair`](Session::connect_pair) removing the
    /// link values on both sides.
    fn disconnect_pair(
        &self,
        schema: &RelationSchema,
        one_dn: &str,
        members: &[String],
    ) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        debug!("disconnect {one_dn}: {} members", members.len());
        {
            let mut state = self.state.borrow_mut();
            state.client()?.modify(
                one_dn,
                &[Modification::remove_values(
                    schema.one().link_attr.clone(),
                    members.to_vec(),
                )],
            )?;
        }
        for member in members {
            let Some(attr) = schema.link_attr_for(member) else {
                warn!("{}: no descriptor matches {member}, skipping", schema.name());
                continue;
            };
            let mut state = self.state.borrow_mut();
            state.client()?.modify(
                member,
                &[Modification::remove_values(attr, vec![one_dn.to_string()])],
            )?;
        }
        Ok(())
    }
}
