use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::core::error::Result;
use crate::schema::entity::{Entity, EntitySchema};
use crate::schema::relation::{Relation, RelationSchema};

/// Process-wide mapping metadata, shared by every session.
///
/// Constructed once at startup and passed by reference (no global
/// statics). The first caller asking for a type's schema pays the
/// validation cost; afterwards the cached instance is returned. The maps
/// are the only structures in the crate that are read from several
/// threads, so population is double-checked: a racing builder re-checks
/// under the write lock and discards its own result, which guarantees a
/// single schema instance per type.
#[derive(Default)]
pub struct SchemaRegistry {
    entities: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    relations: RwLock<HashMap<TypeId, Arc<RelationSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The validated mapping for entity type `T`.
    pub fn entity<T: Entity>(&self) -> Result<Arc<EntitySchema<T>>> {
        let key = TypeId::of::<T>();
        {
            let entities = self.entities.read()?;
            if let Some(cached) = entities.get(&key) {
                return Ok(downcast_entity::<T>(cached));
            }
        }

        debug!("extracting mapping metadata for {}", std::any::type_name::<T>());
        let built: Arc<dyn Any + Send + Sync> =
            Arc::new(EntitySchema::validate(T::declare())?);

        let mut entities = self.entities.write()?;
        let stored = entities.entry(key).or_insert(built);
        Ok(downcast_entity::<T>(stored))
    }

    /// The validated mapping for relation type `R`.
    pub fn relation<R: Relation>(&self) -> Result<Arc<RelationSchema>> {
        let key = TypeId::of::<R>();
        {
            let relations = self.relations.read()?;
            if let Some(cached) = relations.get(&key) {
                return Ok(Arc::clone(cached));
            }
        }

        debug!(
            "extracting relation metadata for {}",
            std::any::type_name::<R>()
        );
        let built = Arc::new(RelationSchema::validate(R::declare())?);

        let mut relations = self.relations.write()?;
        let stored = relations.entry(key).or_insert(built);
        Ok(Arc::clone(stored))
    }

    /// Convenience: the DN an entry of type `T` with this identity value
    /// has.
    pub fn dn_for<T: Entity>(&self, id_value: &str) -> Result<String> {
        Ok(self.entity::<T>()?.dn_for(id_value))
    }
}

fn downcast_entity<T: Entity>(stored: &Arc<dyn Any + Send + Sync>) -> Arc<EntitySchema<T>> {
    Arc::clone(stored)
        .downcast::<EntitySchema<T>>()
        .expect("registry entry stored under the wrong TypeId")
}
