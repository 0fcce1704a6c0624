use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::ChangeStrategy;

struct Inner<E> {
    elements: Vec<E>,
    // Incremental keeps live deltas; SnapshotDiff keeps the baseline and
    // diffs on demand. Both are multisets: duplicates count.
    added: Vec<E>,
    removed: Vec<E>,
    baseline: Vec<E>,
    strategy: ChangeStrategy,
    tracking: bool,
}

/// An ordered collection (duplicates allowed) that records element
/// additions and removals, with the same contract and handle semantics
/// as [`TrackedSet`](super::TrackedSet).
///
/// A standalone utility: mapped properties carry [`TrackedSet`]
/// containers, since directory attribute values are unordered and
/// unique on the wire. Use this for application-side state that needs
/// occurrence counting with the same delta contract.
pub struct TrackedList<E: PartialEq + Clone> {
    inner: Rc<RefCell<Inner<E>>>,
}

impl<E: PartialEq + Clone> TrackedList<E> {
    /// An empty, untracked list.
    pub fn new() -> Self {
        Self::build(Vec::new(), ChangeStrategy::Incremental, false)
    }

    /// A tracking list whose current content is the baseline.
    pub fn tracked(elements: impl IntoIterator<Item = E>) -> Self {
        Self::with_strategy(elements, ChangeStrategy::Incremental)
    }

    /// A tracking list with an explicit delta strategy.
    pub fn with_strategy(
        elements: impl IntoIterator<Item = E>,
        strategy: ChangeStrategy,
    ) -> Self {
        Self::build(elements.into_iter().collect(), strategy, true)
    }

    fn build(elements: Vec<E>, strategy: ChangeStrategy, tracking: bool) -> Self {
        let baseline = match strategy {
            ChangeStrategy::SnapshotDiff => elements.clone(),
            ChangeStrategy::Incremental => Vec::new(),
        };
        Self {
            inner: Rc::new(RefCell::new(Inner {
                elements,
                added: Vec::new(),
                removed: Vec::new(),
                baseline,
                strategy,
                tracking,
            })),
        }
    }

    /// Append an element.
    pub fn push(&mut self, element: E) {
        let mut inner = self.inner.borrow_mut();
        inner.elements.push(element.clone());
        if inner.tracking && inner.strategy == ChangeStrategy::Incremental {
            // appending a previously-removed occurrence cancels the removal
            if !remove_one(&mut inner.removed, &element) {
                inner.added.push(element);
            }
        }
    }

    /// Remove the first occurrence. Returns false when absent.
    pub fn remove(&mut self, element: &E) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !remove_one(&mut inner.elements, element) {
            return false;
        }
        if inner.tracking && inner.strategy == ChangeStrategy::Incremental {
            if !remove_one(&mut inner.added, element) {
                inner.removed.push(element.clone());
            }
        }
        true
    }

    pub fn extend(&mut self, elements: impl IntoIterator<Item = E>) {
        for e in elements {
            self.push(e);
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

    pub fn elements(&self) -> Vec<E> {
        self.inner.borrow().elements.clone()
    }

    /// Occurrences added since the last checkpoint. Empty when untracked.
    pub fn added_elements(&self) -> Vec<E> {
        let inner = self.inner.borrow();
        if !inner.tracking {
            return Vec::new();
        }
        match inner.strategy {
            ChangeStrategy::Incremental => inner.added.clone(),
            ChangeStrategy::SnapshotDiff => multiset_diff(&inner.elements, &inner.baseline),
        }
    }

    /// Occurrences removed since the last checkpoint. Empty when untracked.
    pub fn removed_elements(&self) -> Vec<E> {
        let inner = self.inner.borrow();
        if !inner.tracking {
            return Vec::new();
        }
        match inner.strategy {
            ChangeStrategy::Incremental => inner.removed.clone(),
            ChangeStrategy::SnapshotDiff => multiset_diff(&inner.baseline, &inner.elements),
        }
    }

    /// Reset the deltas and make current content the new baseline.
    pub fn clear_changes(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.added.clear();
        inner.removed.clear();
        if inner.strategy == ChangeStrategy::SnapshotDiff {
            inner.baseline = inner.elements.clone();
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.borrow().tracking
    }

    /// Start recording changes, with current content as the baseline.
    pub fn enable_tracking(&mut self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.tracking = true;
        }
        self.clear_changes();
    }
}

/// Remove one occurrence of `element`, right to left (so a cancel undoes
/// the most recent recording first).
fn remove_one<E: PartialEq>(v: &mut Vec<E>, element: &E) -> bool {
    match v.iter().rposition(|e| e == element) {
        Some(i) => {
            v.remove(i);
            true
        }
        None => false,
    }
}

/// Occurrences of `a` left after cancelling one matching occurrence from
/// `b` for each.
fn multiset_diff<E: PartialEq + Clone>(a: &[E], b: &[E]) -> Vec<E> {
    let mut rest: Vec<&E> = b.iter().collect();
    let mut out = Vec::new();
    for e in a {
        match rest.iter().position(|r| *r == e) {
            Some(i) => {
                rest.remove(i);
            }
            None => out.push(e.clone()),
        }
    }
    out
}

impl<E: PartialEq + Clone> Clone for TrackedList<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: PartialEq + Clone> Default for TrackedList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PartialEq + Clone> FromIterator<E> for TrackedList<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::build(iter.into_iter().collect(), ChangeStrategy::Incremental, false)
    }
}

impl<E: PartialEq + Clone + fmt::Debug> fmt::Debug for TrackedList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_list().entries(inner.elements.iter()).finish()
    }
}

impl<E: PartialEq + Clone> PartialEq for TrackedList<E> {
    fn eq(&self, other: &Self) -> bool {
        let a = self.inner.borrow();
        let b = other.inner.borrow();
        a.elements == b.elements
    }
}
