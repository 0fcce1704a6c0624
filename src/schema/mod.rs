//! Mapping metadata: how a type maps onto directory entries.
//!
//! Mappings are declared explicitly with builders ([`EntityDeclaration`],
//! [`RelationDeclaration`]) and validated into immutable schemas by the
//! [`SchemaRegistry`] on first use.

pub mod codec;
pub mod entity;
pub mod registry;
pub mod relation;

pub use codec::ValueCodec;
pub use entity::{Entity, EntityDeclaration, EntitySchema, PropertyDeclaration, PropertySchema};
pub use registry::SchemaRegistry;
pub use relation::{Relation, RelationDeclaration, RelationEnd, RelationSchema};
