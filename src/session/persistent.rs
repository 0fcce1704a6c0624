use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::core::error::{OdmError, Result};
use crate::core::value::PropertyValue;
use crate::schema::entity::{Entity, EntitySchema};

/// A session-managed entity: shared, interior-mutable, one instance per
/// DN within a session.
pub type EntityHandle<T> = Rc<RefCell<Persistent<T>>>;

/// An entity bound to a directory entry, together with the set of
/// property names written since the last persistence point.
///
/// Mutation goes through [`set`](Persistent::set) so the write is
/// recorded; multi-valued containers track their own membership deltas
/// and are diffed separately by the session. Reads never mark anything.
pub struct Persistent<T: Entity> {
    schema: Arc<EntitySchema<T>>,
    dn: String,
    value: T,
    touched: IndexSet<String>,
    tracking: bool,
}

impl<T: Entity> Persistent<T> {
    pub(crate) fn new(schema: Arc<EntitySchema<T>>, dn: String, value: T) -> Self {
        Self {
            schema,
            dn,
            value,
            touched: IndexSet::new(),
            tracking: false,
        }
    }

    pub(crate) fn schema(&self) -> &Arc<EntitySchema<T>> {
        &self.schema
    }

    pub(crate) fn enable_tracking(&mut self) {
        self.tracking = true;
        self.touched.clear();
    }

    pub(crate) fn clear_touched(&mut self) {
        self.touched.clear();
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Read access to the wrapped value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Current value of a property, by declared name.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.schema
            .property_by_name(name)
            .and_then(|p| p.get(&self.value))
    }

    /// Write a property, by declared name, and record the touch.
    pub fn set(&mut self, name: &str, value: Option<PropertyValue>) -> Result<()> {
        let property = self.schema.property_by_name(name).ok_or_else(|| {
            OdmError::Session(format!(
                "{}: unknown property '{name}'",
                self.schema.type_name()
            ))
        })?;
        property.set(&mut self.value, value);
        if self.tracking {
            self.touched.insert(name.to_string());
        }
        Ok(())
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.set(name, Some(PropertyValue::Text(value.into())))
    }

    /// Unset a property; the next update removes its attribute.
    pub fn clear(&mut self, name: &str) -> Result<()> {
        self.set(name, None)
    }

    /// Property names written since the last persistence point.
    pub fn touched(&self) -> impl Iterator<Item = &str> {
        self.touched.iter().map(String::as_str)
    }

    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.contains(name)
    }
}

impl<T: Entity> fmt::Debug for Persistent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dn={} | type={} | touched={:?}",
            self.dn,
            self.schema.type_name(),
            self.touched
        )
    }
}
