use std::collections::HashMap;
use std::fmt;

use crate::core::error::{OdmError, Result};
use crate::core::value::PropertyValue;
use crate::core::dn;
use crate::schema::codec::ValueCodec;

/// Reads a property off an entity. `None` means the property is unset.
pub type Getter<T> = fn(&T) -> Option<PropertyValue>;

/// Writes a property onto an entity. `None` clears it.
pub type Setter<T> = fn(&mut T, Option<PropertyValue>);

/// A type that maps onto directory entries.
///
/// The mapping is declared explicitly through [`Entity::declare`] and
/// turned into a validated, immutable [`EntitySchema`] by the
/// [`SchemaRegistry`](crate::schema::SchemaRegistry) on first use.
/// Accessors the declaration does not mention are transient: they never
/// touch the directory.
pub trait Entity: Default + 'static {
    fn declare() -> EntityDeclaration<Self>;
}

/// Builder for a type's mapping declaration.
pub struct EntityDeclaration<T> {
    type_name: &'static str,
    context: String,
    object_classes: Vec<String>,
    properties: Vec<PropertyDeclaration<T>>,
}

impl<T> EntityDeclaration<T> {
    pub fn new(type_name: &'static str, context: impl Into<String>) -> Self {
        Self {
            type_name,
            context: context.into(),
            object_classes: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Fixed object-class markers written on create.
    pub fn object_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn property(mut self, property: PropertyDeclaration<T>) -> Self {
        self.properties.push(property);
        self
    }
}

/// Builder for a single mapped property.
pub struct PropertyDeclaration<T> {
    name: String,
    attr: Option<String>,
    multiple: bool,
    reference: bool,
    readonly: bool,
    is_id: bool,
    codec: ValueCodec,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
}

impl<T> PropertyDeclaration<T> {
    fn base(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attr: None,
            multiple: false,
            reference: false,
            readonly: false,
            is_id: false,
            codec: ValueCodec::Identity,
            getter: None,
            setter: None,
        }
    }

    /// The identity property. Its value builds the entry's DN together
    /// with the type's context.
    pub fn id(name: impl Into<String>) -> Self {
        let mut p = Self::base(name);
        p.is_id = true;
        p
    }

    /// A single-valued plain attribute.
    pub fn single(name: impl Into<String>) -> Self {
        Self::base(name)
    }

    /// A multi-valued plain attribute.
    pub fn multi(name: impl Into<String>) -> Self {
        let mut p = Self::base(name);
        p.multiple = true;
        p
    }

    /// A single-valued link to another mapped type, stored as its DN.
    pub fn single_ref(name: impl Into<String>) -> Self {
        let mut p = Self::base(name);
        p.reference = true;
        p
    }

    /// A multi-valued link to other mapped types.
    pub fn multi_ref(name: impl Into<String>) -> Self {
        let mut p = Self::base(name);
        p.multiple = true;
        p.reference = true;
        p
    }

    /// Override the directory attribute name; defaults to the property
    /// name.
    pub fn attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = Some(attr.into());
        self
    }

    /// Exclude from update diffs; still written on create.
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn codec(mut self, codec: ValueCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn get(mut self, getter: Getter<T>) -> Self {
        self.getter = Some(getter);
        self
    }

    pub fn set(mut self, setter: Setter<T>) -> Self {
        self.setter = Some(setter);
        self
    }
}

/// Immutable, validated mapping metadata for one property.
pub struct PropertySchema<T> {
    pub(crate) name: String,
    pub(crate) attr: String,
    pub(crate) multiple: bool,
    pub(crate) reference: bool,
    pub(crate) readonly: bool,
    pub(crate) is_id: bool,
    pub(crate) codec: ValueCodec,
    pub(crate) getter: Getter<T>,
    pub(crate) setter: Setter<T>,
}

impl<T> PropertySchema<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_id(&self) -> bool {
        self.is_id
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn get(&self, entity: &T) -> Option<PropertyValue> {
        (self.getter)(entity)
    }

    pub fn set(&self, entity: &mut T, value: Option<PropertyValue>) {
        (self.setter)(entity, value)
    }
}

impl<T> fmt::Debug for PropertySchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attr={} | name={} | codec={} | id={} | multiple={} | reference={} | readonly={}",
            self.attr,
            self.name,
            self.codec.name(),
            self.is_id,
            self.multiple,
            self.reference,
            self.readonly
        )
    }
}

/// The validated mapping for one entity type: context, object classes,
/// identity property and the ordered property list. Computed once per
/// type and immutable thereafter.
pub struct EntitySchema<T> {
    type_name: &'static str,
    context: String,
    object_classes: Vec<String>,
    properties: Vec<PropertySchema<T>>,
    id_index: usize,
    by_attr: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    // cached so every read/search reuses the same buffer
    attr_names: Vec<String>,
}

impl<T> EntitySchema<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    pub fn id(&self) -> &PropertySchema<T> {
        &self.properties[self.id_index]
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertySchema<T>> {
        self.properties.iter()
    }

    /// Look up by directory attribute name (case-insensitive, the way
    /// servers report attributes back).
    pub fn property(&self, attr: &str) -> Option<&PropertySchema<T>> {
        self.by_attr
            .get(&attr.to_ascii_lowercase())
            .map(|&i| &self.properties[i])
    }

    /// Look up by declared property name.
    pub fn property_by_name(&self, name: &str) -> Option<&PropertySchema<T>> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    /// Every mapped directory attribute name.
    pub fn attr_names(&self) -> &[String] {
        &self.attr_names
    }

    /// The DN an entry of this type with the given identity value has.
    pub fn dn_for(&self, id_value: &str) -> String {
        dn::build(&self.id().attr, id_value, &self.context)
    }

    /// Validate a declaration into an immutable schema.
    pub(crate) fn validate(decl: EntityDeclaration<T>) -> Result<Self> {
        let type_name = decl.type_name;
        let mut properties = Vec::with_capacity(decl.properties.len());
        let mut by_attr = HashMap::new();
        let mut by_name = HashMap::new();
        let mut attr_names = Vec::new();
        let mut id_index = None;

        for p in decl.properties {
            let attr = p.attr.unwrap_or_else(|| p.name.clone());
            let getter = p.getter.ok_or_else(|| {
                OdmError::Metadata(format!(
                    "{type_name}: property '{}' has no getter",
                    p.name
                ))
            })?;
            let setter = p.setter.ok_or_else(|| {
                OdmError::Metadata(format!(
                    "{type_name}: property '{}' has a getter but no setter counterpart",
                    p.name
                ))
            })?;
            if p.is_id {
                if id_index.is_some() {
                    return Err(OdmError::Metadata(format!(
                        "{type_name}: only one identity property may be declared"
                    )));
                }
                if p.multiple || p.reference {
                    return Err(OdmError::Metadata(format!(
                        "{type_name}: identity property '{}' must be a single-valued string",
                        p.name
                    )));
                }
                id_index = Some(properties.len());
            }

            let index = properties.len();
            if by_attr
                .insert(attr.to_ascii_lowercase(), index)
                .is_some()
            {
                return Err(OdmError::Metadata(format!(
                    "{type_name}: attribute '{attr}' is mapped twice"
                )));
            }
            if by_name.insert(p.name.clone(), index).is_some() {
                return Err(OdmError::Metadata(format!(
                    "{type_name}: property '{}' is declared twice",
                    p.name
                )));
            }
            attr_names.push(attr.clone());
            properties.push(PropertySchema {
                name: p.name,
                attr,
                multiple: p.multiple,
                reference: p.reference,
                readonly: p.readonly,
                is_id: p.is_id,
                codec: p.codec,
                getter,
                setter,
            });
        }

        let id_index = id_index.ok_or_else(|| {
            OdmError::Metadata(format!(
                "{type_name}: an identity property must be declared"
            ))
        })?;

        Ok(Self {
            type_name,
            context: decl.context,
            object_classes: decl.object_classes,
            properties,
            id_index,
            by_attr,
            by_name,
            attr_names,
        })
    }
}

impl<T> fmt::Debug for EntitySchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "type={} | context={} | objectClasses={:?} | id={}",
            self.type_name,
            self.context,
            self.object_classes,
            self.id().attr
        )?;
        for p in &self.properties {
            writeln!(f, "  {p:?}")?;
        }
        Ok(())
    }
}
