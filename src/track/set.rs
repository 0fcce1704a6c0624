use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexSet;

/// How a [`TrackedSet`] computes its deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeStrategy {
    /// Update `added`/`removed` on every mutation, O(1) amortized.
    /// Mandatory for collections expected to grow beyond a few hundred
    /// elements: repeated diff queries against a snapshot degrade
    /// super-linearly there, while this stays near-constant per mutation.
    #[default]
    Incremental,
    /// Keep the baseline membership and diff against it on demand.
    SnapshotDiff,
}

enum ChangeLog<E> {
    Incremental {
        added: IndexSet<E>,
        removed: IndexSet<E>,
    },
    SnapshotDiff {
        baseline: IndexSet<E>,
    },
}

struct Inner<E> {
    elements: IndexSet<E>,
    log: ChangeLog<E>,
    tracking: bool,
}

/// An insertion-ordered set that records element additions and removals.
///
/// Clones share state (handle semantics): a clone observes and performs
/// the same mutations as the original. This mirrors how entity fields
/// and the session exchange the same underlying collection.
///
/// A set built through [`TrackedSet::new`] or `collect()` starts
/// *untracked*: mutations are not recorded and the session treats the
/// collection as a wholesale replacement on update. Sets handed out by
/// the session are tracking, with the loaded membership as baseline.
pub struct TrackedSet<E: Hash + Eq + Clone> {
    inner: Rc<RefCell<Inner<E>>>,
}

impl<E: Hash + Eq + Clone> TrackedSet<E> {
    /// An empty, untracked set.
    pub fn new() -> Self {
        Self::build(IndexSet::new(), ChangeStrategy::Incremental, false)
    }

    /// A tracking set whose current membership is the baseline.
    pub fn tracked(elements: impl IntoIterator<Item = E>) -> Self {
        Self::with_strategy(elements, ChangeStrategy::Incremental)
    }

    /// A tracking set with an explicit delta strategy.
    pub fn with_strategy(
        elements: impl IntoIterator<Item = E>,
        strategy: ChangeStrategy,
    ) -> Self {
        Self::build(elements.into_iter().collect(), strategy, true)
    }

    fn build(elements: IndexSet<E>, strategy: ChangeStrategy, tracking: bool) -> Self {
        let log = match strategy {
            ChangeStrategy::Incremental => ChangeLog::Incremental {
                added: IndexSet::new(),
                removed: IndexSet::new(),
            },
            ChangeStrategy::SnapshotDiff => ChangeLog::SnapshotDiff {
                baseline: elements.clone(),
            },
        };
        Self {
            inner: Rc::new(RefCell::new(Inner {
                elements,
                log,
                tracking,
            })),
        }
    }

    /// Add an element. Returns false when it was already a member.
    pub fn insert(&mut self, element: E) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.elements.insert(element.clone()) {
            return false;
        }
        if inner.tracking {
            if let ChangeLog::Incremental { added, removed } = &mut inner.log {
                // re-adding a previously-removed element cancels the removal
                if !removed.shift_remove(&element) {
                    added.insert(element);
                }
            }
        }
        true
    }

    /// Remove an element. Returns false when it was not a member.
    pub fn remove(&mut self, element: &E) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.elements.shift_remove(element) {
            return false;
        }
        if inner.tracking {
            if let ChangeLog::Incremental { added, removed } = &mut inner.log {
                // removing a pending addition cancels it
                if !added.shift_remove(element) {
                    removed.insert(element.clone());
                }
            }
        }
        true
    }

    pub fn insert_all(&mut self, elements: impl IntoIterator<Item = E>) {
        for e in elements {
            self.insert(e);
        }
    }

    pub fn contains(&self, element: &E) -> bool {
        self.inner.borrow().elements.contains(element)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().elements.is_empty()
    }

    /// Current membership, in insertion order.
    pub fn elements(&self) -> Vec<E> {
        self.inner.borrow().elements.iter().cloned().collect()
    }

    /// Elements added since the last checkpoint. Empty when untracked.
    pub fn added_elements(&self) -> Vec<E> {
        let inner = self.inner.borrow();
        if !inner.tracking {
            return Vec::new();
        }
        match &inner.log {
            ChangeLog::Incremental { added, .. } => added.iter().cloned().collect(),
            ChangeLog::SnapshotDiff { baseline } => inner
                .elements
                .iter()
                .filter(|e| !baseline.contains(*e))
                .cloned()
                .collect(),
        }
    }

    /// Elements removed since the last checkpoint. Empty when untracked.
    pub fn removed_elements(&self) -> Vec<E> {
        let inner = self.inner.borrow();
        if !inner.tracking {
            return Vec::new();
        }
        match &inner.log {
            ChangeLog::Incremental { removed, .. } => removed.iter().cloned().collect(),
            ChangeLog::SnapshotDiff { baseline } => baseline
                .iter()
                .filter(|e| !inner.elements.contains(*e))
                .cloned()
                .collect(),
        }
    }

    /// Reset the deltas and make current membership the new baseline.
    ///
    /// Called exactly once per successful persistence of the owning
    /// entity; if not called, the old changes would be gathered again on
    /// the next update.
    pub fn clear_changes(&mut self) {
        let mut inner = self.inner.borrow_mut();
        let current = inner.elements.clone();
        match &mut inner.log {
            ChangeLog::Incremental { added, removed } => {
                added.clear();
                removed.clear();
            }
            ChangeLog::SnapshotDiff { baseline } => *baseline = current,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.borrow().tracking
    }

    /// Start recording changes, with current membership as the baseline.
    pub fn enable_tracking(&mut self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.tracking = true;
        }
        self.clear_changes();
    }
}

impl<E: Hash + Eq + Clone> Clone for TrackedSet<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Hash + Eq + Clone> Default for TrackedSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Hash + Eq + Clone> FromIterator<E> for TrackedSet<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::build(iter.into_iter().collect(), ChangeStrategy::Incremental, false)
    }
}

impl<E: Hash + Eq + Clone + fmt::Debug> fmt::Debug for TrackedSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_set().entries(inner.elements.iter()).finish()
    }
}

impl<E: Hash + Eq + Clone> PartialEq for TrackedSet<E> {
    /// Membership equality; delta state is not compared.
    fn eq(&self, other: &Self) -> bool {
        let a = self.inner.borrow();
        let b = other.inner.borrow();
        a.elements == b.elements
    }
}

impl<E: Hash + Eq + Clone> Eq for TrackedSet<E> {}
