use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::core::error::{OdmError, Result};
use crate::schema::entity::Entity;
use crate::session::persistent::{EntityHandle, Persistent};
use crate::session::SessionState;

enum RefState {
    /// Not bound to any session; only the DN is usable.
    Detached,
    /// Bound to a session, target not loaded yet.
    Unresolved(Weak<RefCell<SessionState>>),
    /// Loaded once; later resolves return the memo without I/O.
    Resolved(Rc<dyn Any>),
}

/// A reference-valued attribute: the target DN now, the target entity on
/// demand.
///
/// Clones share the memo, so resolving any copy resolves them all.
/// Identity, equality and hashing go by DN alone; [`dn`](LazyRef::dn)
/// never touches the directory, which is what DN construction and
/// relation synchronization rely on.
#[derive(Clone)]
pub struct LazyRef {
    dn: String,
    state: Rc<RefCell<RefState>>,
}

impl LazyRef {
    /// A reference carrying only a DN, for wiring entities before they
    /// are persisted. Resolving it is an error.
    pub fn detached(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            state: Rc::new(RefCell::new(RefState::Detached)),
        }
    }

    pub(crate) fn attached(dn: impl Into<String>, session: &Rc<RefCell<SessionState>>) -> Self {
        Self {
            dn: dn.into(),
            state: Rc::new(RefCell::new(RefState::Unresolved(Rc::downgrade(session)))),
        }
    }

    /// The target DN. Never forces resolution.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.borrow(), RefState::Resolved(_))
    }

    /// Load the target through the owning session, memoizing the result.
    ///
    /// `Ok(None)` means the entry no longer exists; the reference stays
    /// unresolved so a later call can retry after the target reappears.
    pub fn resolve<T: Entity>(&self) -> Result<Option<EntityHandle<T>>> {
        let session = {
            let state = self.state.borrow();
            match &*state {
                RefState::Resolved(memo) => return Ok(Some(downcast::<T>(memo, &self.dn)?)),
                RefState::Detached => {
                    return Err(OdmError::Session(format!(
                        "cannot resolve detached reference {}",
                        self.dn
                    )));
                }
                RefState::Unresolved(weak) => weak.upgrade().ok_or_else(|| {
                    OdmError::Session(format!(
                        "cannot resolve {}: the owning session is gone",
                        self.dn
                    ))
                })?,
            }
        };

        let Some(handle) = crate::session::read_by_dn::<T>(&session, &self.dn)? else {
            return Ok(None);
        };
        *self.state.borrow_mut() = RefState::Resolved(Rc::clone(&handle) as Rc<dyn Any>);
        Ok(Some(handle))
    }
}

fn downcast<T: Entity>(memo: &Rc<dyn Any>, dn: &str) -> Result<EntityHandle<T>> {
    Rc::clone(memo)
        .downcast::<RefCell<Persistent<T>>>()
        .map_err(|_| OdmError::Session(format!("{dn} was resolved as a different entity type")))
}

impl PartialEq for LazyRef {
    fn eq(&self, other: &Self) -> bool {
        self.dn == other.dn
    }
}

impl Eq for LazyRef {}

impl Hash for LazyRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dn.hash(state);
    }
}

impl fmt::Debug for LazyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{} (resolved={})", self.dn, self.is_resolved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;

    #[test]
    fn test_equality_and_hash_by_dn() {
        let a = LazyRef::detached("uid=u1,ou=people,o=example");
        let b = LazyRef::detached("uid=u1,ou=people,o=example");
        let c = LazyRef::detached("uid=u2,ou=people,o=example");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: IndexSet<LazyRef> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_detached_reference_does_not_resolve() {
        #[derive(Default)]
        struct Person;
        impl Entity for Person {
            fn declare() -> crate::schema::EntityDeclaration<Self> {
                crate::schema::EntityDeclaration::new("Person", "ou=people,o=example").property(
                    crate::schema::PropertyDeclaration::id("uid")
                        .get(|_: &Person| None)
                        .set(|_, _| {}),
                )
            }
        }

        let r = LazyRef::detached("uid=u1,ou=people,o=example");
        assert_eq!(r.dn(), "uid=u1,ou=people,o=example");
        assert!(!r.is_resolved());
        let err = r.resolve::<Person>().unwrap_err();
        assert!(err.to_string().contains("detached"));
    }
}
