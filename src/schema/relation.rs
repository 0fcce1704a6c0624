use std::fmt;

use crate::core::dn;
use crate::core::error::{OdmError, Result};

/// One endpoint of an indirection: the sub-tree its entries live in, the
/// attribute their DNs are keyed by, and the attribute holding the
/// back-pointer DNs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationEnd {
    pub context: String,
    pub id_attr: String,
    pub link_attr: String,
}

impl RelationEnd {
    pub fn new(
        context: impl Into<String>,
        id_attr: impl Into<String>,
        link_attr: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            id_attr: id_attr.into(),
            link_attr: link_attr.into(),
        }
    }
}

/// A relation expressed purely through two independent back-pointer
/// attributes, no junction entry in between.
///
/// The one side holds the set of linked DNs in its own link attribute;
/// every linked entry points back through whichever many-side descriptor
/// matches its sub-tree. Heterogeneous targets are expected: a member DN
/// matching none of the descriptors is skipped, not an error.
pub trait Relation: 'static {
    fn declare() -> RelationDeclaration;
}

/// Builder for a relation's mapping declaration.
pub struct RelationDeclaration {
    name: &'static str,
    one: Option<RelationEnd>,
    many: Vec<RelationEnd>,
}

impl RelationDeclaration {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            one: None,
            many: Vec::new(),
        }
    }

    pub fn one(
        mut self,
        context: impl Into<String>,
        id_attr: impl Into<String>,
        link_attr: impl Into<String>,
    ) -> Self {
        self.one = Some(RelationEnd::new(context, id_attr, link_attr));
        self
    }

    /// Add a many-side descriptor. May be called several times; the DN
    /// suffix decides which descriptor applies to a given member.
    pub fn many(
        mut self,
        context: impl Into<String>,
        id_attr: impl Into<String>,
        link_attr: impl Into<String>,
    ) -> Self {
        self.many.push(RelationEnd::new(context, id_attr, link_attr));
        self
    }
}

/// Validated, immutable metadata for one relation type.
pub struct RelationSchema {
    name: &'static str,
    one: RelationEnd,
    many: Vec<RelationEnd>,
}

impl RelationSchema {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn one(&self) -> &RelationEnd {
        &self.one
    }

    pub fn many(&self) -> &[RelationEnd] {
        &self.many
    }

    /// The link attribute to update on a many-side member, picked by
    /// matching the member's DN against the descriptors' sub-trees.
    pub fn link_attr_for(&self, member_dn: &str) -> Option<&str> {
        if member_dn.is_empty() {
            return None;
        }
        self.many
            .iter()
            .find(|end| dn::within_context(member_dn, &end.context))
            .map(|end| end.link_attr.as_str())
    }

    /// The DN of a one-side entry with the given identity value.
    pub fn one_dn_for(&self, id_value: &str) -> String {
        dn::build(&self.one.id_attr, id_value, &self.one.context)
    }

    pub(crate) fn validate(decl: RelationDeclaration) -> Result<Self> {
        let name = decl.name;
        let one = decl.one.ok_or_else(|| {
            OdmError::Metadata(format!("{name}: relation must declare its one side"))
        })?;
        if decl.many.is_empty() {
            return Err(OdmError::Metadata(format!(
                "{name}: relation must declare at least one many-side descriptor"
            )));
        }
        Ok(Self {
            name,
            one,
            many: decl.many,
        })
    }
}

impl fmt::Debug for RelationSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "relation={} | one=[{:?}] | many={:?}",
            self.name, self.one, self.many
        )
    }
}
