//! Schema registration and component values.
//!
//! A schema describes the shape of one component and how it is stored:
//! binary schemas live in fixed-width numeric buffers, native schemas in
//! ordinary growable vectors. Each registry owns its own id counter.

use std::{collections::BTreeMap, fmt};

use crate::{
    error::{EcsError, EcsResult},
    format::Format,
};

/// Unique identifier for a schema.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u32);

impl SchemaId {
    /// Create a schema ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaId({})", self.0)
    }
}

/// A (possibly nested) native shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    Scalar(Format),
    Record(BTreeMap<String, Shape>),
}

impl Shape {
    /// Build a record shape from `(name, shape)` pairs.
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Shape)>) -> Self {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The zero value of this shape.
    #[must_use]
    pub fn zero(&self) -> Value {
        match self {
            Self::Scalar(_) => Value::Number(0.0),
            Self::Record(fields) => Value::Record(
                fields
                    .iter()
                    .map(|(name, shape)| (name.clone(), shape.zero()))
                    .collect(),
            ),
        }
    }

    /// Complete a partial value against this shape, zero-filling what is missing.
    fn fill(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (Self::Scalar(_), value @ Value::Number(_)) => Some(value),
            (Self::Record(fields), Value::Record(mut given)) => {
                let mut out = BTreeMap::new();
                for (name, shape) in fields {
                    let filled = match given.remove(name) {
                        Some(v) => shape.fill(v)?,
                        None => shape.zero(),
                    };
                    out.insert(name.clone(), filled);
                }
                // Leftover fields are not part of the shape.
                given.is_empty().then_some(Value::Record(out))
            }
            _ => None,
        }
    }
}

/// Storage kind of a schema, carrying its shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    /// One number per entity in a fixed-width buffer.
    BinaryScalar(Format),
    /// A flat record of numbers, one fixed-width buffer per field.
    BinaryStruct(BTreeMap<String, Format>),
    /// One number per entity in a growable vector.
    NativeScalar(Format),
    /// A nested record per entity in a growable vector.
    NativeObject(BTreeMap<String, Shape>),
    /// A marker with no data.
    Tag,
}

impl SchemaKind {
    /// Build a binary struct kind from `(field, format)` pairs.
    pub fn binary_struct<K: Into<String>>(fields: impl IntoIterator<Item = (K, Format)>) -> Self {
        Self::BinaryStruct(fields.into_iter().map(|(k, f)| (k.into(), f)).collect())
    }

    /// Build a native object kind from `(field, shape)` pairs.
    pub fn native_object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Shape)>) -> Self {
        Self::NativeObject(fields.into_iter().map(|(k, s)| (k.into(), s)).collect())
    }

    /// Check if values of this kind live in fixed-width buffers.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::BinaryScalar(_) | Self::BinaryStruct(_))
    }
}

/// A registered schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    id: SchemaId,
    kind: SchemaKind,
}

impl Schema {
    /// Get the schema ID.
    #[must_use]
    pub const fn id(&self) -> SchemaId {
        self.id
    }

    /// Get the storage kind.
    #[must_use]
    pub const fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    /// The zero value of this schema, `None` for tags.
    #[must_use]
    pub fn default_value(&self) -> Option<Value> {
        match &self.kind {
            SchemaKind::BinaryScalar(_) | SchemaKind::NativeScalar(_) => Some(Value::Number(0.0)),
            SchemaKind::BinaryStruct(fields) => Some(Value::Record(
                fields
                    .keys()
                    .map(|name| (name.clone(), Value::Number(0.0)))
                    .collect(),
            )),
            SchemaKind::NativeObject(fields) => Some(Shape::Record(fields.clone()).zero()),
            SchemaKind::Tag => None,
        }
    }

    /// Turn optional, possibly partial data into a complete value for this schema.
    ///
    /// `None` yields the default value. Records are completed with zeros.
    pub fn resolve(&self, value: Option<Value>) -> EcsResult<Option<Value>> {
        let Some(value) = value else {
            return Ok(self.default_value());
        };

        let resolved = match &self.kind {
            SchemaKind::Tag => None,
            SchemaKind::BinaryScalar(format) | SchemaKind::NativeScalar(format) => {
                Shape::Scalar(*format).fill(value)
            }
            SchemaKind::BinaryStruct(fields) => Shape::Record(
                fields
                    .iter()
                    .map(|(name, format)| (name.clone(), Shape::Scalar(*format)))
                    .collect(),
            )
            .fill(value),
            SchemaKind::NativeObject(fields) => Shape::Record(fields.clone()).fill(value),
        };

        match resolved {
            Some(value) => Ok(Some(value)),
            None => Err(EcsError::ShapeMismatch { schema: self.id }),
        }
    }
}

/// A dynamically shaped component value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Build a record from `(name, value)` pairs.
    pub fn record<K: Into<String>, V: Into<Value>>(fields: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// The number, if this is a scalar value.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Record(_) => None,
        }
    }

    /// A field of a record value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Record(fields) => fields.get(name),
            Self::Number(_) => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

/// Registry of schemas owned by one world.
///
/// Sparse: explicit ids may sit anywhere in the `u32` range.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<SchemaId, Schema>,
    /// Next candidate id for automatic registration.
    next_id: u32,
}

impl SchemaRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under the next free id.
    ///
    /// Candidates wrap around past `u32::MAX`, skipping ids that were taken
    /// explicitly.
    pub fn register(&mut self, kind: SchemaKind) -> SchemaId {
        while self.contains(SchemaId(self.next_id)) {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let id = SchemaId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.insert(id, kind);
        id
    }

    /// Register a schema under an explicitly requested id.
    pub fn register_with_id(&mut self, id: SchemaId, kind: SchemaKind) -> EcsResult<SchemaId> {
        if self.contains(id) {
            return Err(EcsError::SchemaCollision(id));
        }
        self.insert(id, kind);
        Ok(id)
    }

    fn insert(&mut self, id: SchemaId, kind: SchemaKind) {
        tracing::debug!(?id, ?kind, "registered schema");
        self.schemas.insert(id, Schema { id, kind });
    }

    /// Check if a schema is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: SchemaId) -> bool {
        self.schemas.contains_key(&id)
    }

    /// Get a schema by ID.
    #[must_use]
    pub fn get(&self, id: SchemaId) -> Option<&Schema> {
        self.schemas.get(&id)
    }

    /// Get a schema by ID, failing if it is not registered.
    pub fn require(&self, id: SchemaId) -> EcsResult<&Schema> {
        self.get(id).ok_or(EcsError::SchemaNotFound(id))
    }

    /// Get the number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Iterate over all registered schemas in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.schemas.iter().map(|(id, schema)| (id, schema.kind())))
            .finish()
    }
}
