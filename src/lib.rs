// ============================================================================
// DirODM Library
// ============================================================================

pub mod client;
pub mod core;
pub mod schema;
pub mod session;
pub mod track;

// Re-export main types for convenience
pub use crate::core::{AttributeValue, DirectoryError, OdmError, PropertyValue, Result};
pub use schema::{
    Entity, EntityDeclaration, PropertyDeclaration, Relation, RelationDeclaration,
    SchemaRegistry, ValueCodec,
};
pub use session::{
    AttributeMap, EntityHandle, Indirection, LazyRef, Persistent, Session, SessionFactory,
};
pub use track::{ChangeStrategy, TrackedList, TrackedSet};

// Re-export client API
pub use client::{
    AuthMode, ConnectionConfig, ConnectionProvider, DirectoryClient, MemoryDirectory, ModOp,
    Modification, SearchEntry,
};
