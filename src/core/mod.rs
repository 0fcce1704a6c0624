pub mod dn;
pub mod error;
pub mod value;

pub use error::{DirectoryError, OdmError, Result};
pub use value::{AttributeValue, PropertyValue};
