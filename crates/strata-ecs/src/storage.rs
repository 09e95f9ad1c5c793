//! Column storage - one column per schema in a table.
//!
//! Binary columns are fixed-size numeric buffers allocated up front for the
//! world's entity capacity. Native columns are plain vectors that grow with
//! the table. Every row operation is matched over the column kind.

use crate::{
    format::{NumericBuffer, Scalar},
    schema::{SchemaKind, Value},
};

/// Storage for one schema's values, indexed by table row.
#[derive(Debug, Clone)]
pub enum Column {
    BinaryScalar(NumericBuffer),
    /// One buffer per field, sorted by field name.
    BinaryStruct(Vec<(String, NumericBuffer)>),
    NativeScalar(Vec<f64>),
    NativeObject(Vec<Value>),
    Tag,
}

impl Column {
    /// Create an empty column for a schema kind.
    ///
    /// Binary columns are sized to `capacity`; native columns start empty.
    #[must_use]
    pub fn new(kind: &SchemaKind, capacity: usize) -> Self {
        match kind {
            SchemaKind::BinaryScalar(format) => Self::BinaryScalar(format.buffer(capacity)),
            SchemaKind::BinaryStruct(fields) => Self::BinaryStruct(
                fields
                    .iter()
                    .map(|(name, format)| (name.clone(), format.buffer(capacity)))
                    .collect(),
            ),
            SchemaKind::NativeScalar(_) => Self::NativeScalar(Vec::new()),
            SchemaKind::NativeObject(_) => Self::NativeObject(Vec::new()),
            SchemaKind::Tag => Self::Tag,
        }
    }

    /// Read the value at `row`. Tags have no value.
    #[must_use]
    pub fn read(&self, row: usize) -> Option<Value> {
        match self {
            Self::BinaryScalar(buffer) => Some(Value::Number(buffer.get(row))),
            Self::BinaryStruct(fields) => Some(Value::Record(
                fields
                    .iter()
                    .map(|(name, buffer)| (name.clone(), Value::Number(buffer.get(row))))
                    .collect(),
            )),
            Self::NativeScalar(values) => values.get(row).copied().map(Value::Number),
            Self::NativeObject(values) => values.get(row).cloned(),
            Self::Tag => None,
        }
    }

    /// Overwrite the value at an occupied `row`.
    ///
    /// The value must already be resolved against the column's schema;
    /// `None` zeroes numeric storage.
    pub fn write(&mut self, row: usize, value: Option<Value>) {
        match (self, value) {
            (Self::BinaryScalar(buffer), Some(Value::Number(n))) => buffer.set(row, n),
            (Self::BinaryScalar(buffer), None) => buffer.zero(row),
            (Self::BinaryStruct(fields), None) => {
                for (_, buffer) in fields.iter_mut() {
                    buffer.zero(row);
                }
            }
            (Self::NativeScalar(values), None) => values[row] = 0.0,
            (Self::BinaryStruct(fields), Some(Value::Record(record))) => {
                for (name, buffer) in fields.iter_mut() {
                    if let Some(n) = record.get(name).and_then(Value::as_number) {
                        buffer.set(row, n);
                    }
                }
            }
            (Self::NativeScalar(values), Some(Value::Number(n))) => values[row] = n,
            (Self::NativeObject(values), Some(value)) => values[row] = value,
            (Self::Tag, _) => {}
            (column, value) => {
                debug_assert!(false, "unresolved value {value:?} written to {column:?}");
            }
        }
    }

    /// Write the value of a new tail row.
    ///
    /// `row` must equal the table length before the insert.
    pub(crate) fn push(&mut self, row: usize, value: Option<Value>) {
        match self {
            Self::NativeScalar(values) => {
                debug_assert_eq!(values.len(), row);
                values.push(value.as_ref().and_then(Value::as_number).unwrap_or(0.0));
            }
            Self::NativeObject(values) => {
                debug_assert_eq!(values.len(), row);
                values.push(value.unwrap_or(Value::Number(0.0)));
            }
            binary => binary.write(row, value),
        }
    }

    /// Append row `src_row` of `src` as the new tail row `row` of this column.
    ///
    /// Both columns must belong to the same schema.
    pub(crate) fn push_from(&mut self, row: usize, src: &Self, src_row: usize) {
        match (self, src) {
            (Self::BinaryScalar(dst), Self::BinaryScalar(src)) => dst.copy_from(row, src, src_row),
            (Self::BinaryStruct(dst), Self::BinaryStruct(src)) => {
                for ((_, dst), (_, src)) in dst.iter_mut().zip(src) {
                    dst.copy_from(row, src, src_row);
                }
            }
            (Self::NativeScalar(dst), Self::NativeScalar(src)) => {
                debug_assert_eq!(dst.len(), row);
                dst.push(src[src_row]);
            }
            (Self::NativeObject(dst), Self::NativeObject(src)) => {
                debug_assert_eq!(dst.len(), row);
                dst.push(src[src_row].clone());
            }
            (Self::Tag, Self::Tag) => {}
            (dst, src) => panic!("column kind mismatch: {dst:?} <- {src:?}"),
        }
    }

    /// Remove `row` by moving the `last` row over it, then clearing `last`.
    ///
    /// Binary storage is zeroed so nothing stale can be read past the end.
    pub(crate) fn swap_remove(&mut self, row: usize, last: usize) {
        match self {
            Self::BinaryScalar(buffer) => {
                if row != last {
                    buffer.copy_within(last, row);
                }
                buffer.zero(last);
            }
            Self::BinaryStruct(fields) => {
                for (_, buffer) in fields {
                    if row != last {
                        buffer.copy_within(last, row);
                    }
                    buffer.zero(last);
                }
            }
            Self::NativeScalar(values) => {
                values.swap_remove(row);
            }
            Self::NativeObject(values) => {
                values.swap_remove(row);
            }
            Self::Tag => {}
        }
    }

    /// Typed view of a binary scalar column.
    ///
    /// The slice spans the full capacity; rows past the table length are zero.
    #[must_use]
    pub fn scalars<T: Scalar>(&self) -> Option<&[T]> {
        match self {
            Self::BinaryScalar(buffer) => buffer.as_slice(),
            _ => None,
        }
    }

    /// Mutable typed view of a binary scalar column.
    #[must_use]
    pub fn scalars_mut<T: Scalar>(&mut self) -> Option<&mut [T]> {
        match self {
            Self::BinaryScalar(buffer) => buffer.as_mut_slice(),
            _ => None,
        }
    }

    /// Typed view of one field of a binary struct column.
    #[must_use]
    pub fn field<T: Scalar>(&self, name: &str) -> Option<&[T]> {
        match self {
            Self::BinaryStruct(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .and_then(|(_, buffer)| buffer.as_slice()),
            _ => None,
        }
    }

    /// Mutable typed view of one field of a binary struct column.
    #[must_use]
    pub fn field_mut<T: Scalar>(&mut self, name: &str) -> Option<&mut [T]> {
        match self {
            Self::BinaryStruct(fields) => fields
                .iter_mut()
                .find(|(field, _)| field == name)
                .and_then(|(_, buffer)| buffer.as_mut_slice()),
            _ => None,
        }
    }

    /// Values of a native scalar column.
    #[must_use]
    pub fn numbers(&self) -> Option<&[f64]> {
        match self {
            Self::NativeScalar(values) => Some(values),
            _ => None,
        }
    }

    /// Mutable values of a native scalar column.
    #[must_use]
    pub fn numbers_mut(&mut self) -> Option<&mut [f64]> {
        match self {
            Self::NativeScalar(values) => Some(values),
            _ => None,
        }
    }

    /// Values of a native object column.
    #[must_use]
    pub fn objects(&self) -> Option<&[Value]> {
        match self {
            Self::NativeObject(values) => Some(values),
            _ => None,
        }
    }

    /// Mutable values of a native object column.
    #[must_use]
    pub fn objects_mut(&mut self) -> Option<&mut [Value]> {
        match self {
            Self::NativeObject(values) => Some(values),
            _ => None,
        }
    }

    /// Check if the column lives in fixed-width buffers.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::BinaryScalar(_) | Self::BinaryStruct(_))
    }
}
