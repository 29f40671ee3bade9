//! Decoded values and the ordered field map produced for mapping decodes.

use std::sync::Arc;

use indexmap::IndexSet;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::schema::ScalarRepr;

/// Field names of one record in declaration order, shared by every
/// [`FieldMap`] decoded with the same plan.
pub(crate) type KeyIndex = IndexSet<String>;

/// A decoded fixed-width scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Pointer(u64),
}

impl Scalar {
    pub fn repr(&self) -> ScalarRepr {
        match self {
            Scalar::U8(_) => ScalarRepr::U8,
            Scalar::I8(_) => ScalarRepr::I8,
            Scalar::U16(_) => ScalarRepr::U16,
            Scalar::I16(_) => ScalarRepr::I16,
            Scalar::U32(_) => ScalarRepr::U32,
            Scalar::I32(_) => ScalarRepr::I32,
            Scalar::U64(_) => ScalarRepr::U64,
            Scalar::I64(_) => ScalarRepr::I64,
            Scalar::F32(_) => ScalarRepr::F32,
            Scalar::F64(_) => ScalarRepr::F64,
            Scalar::Pointer(_) => ScalarRepr::Pointer,
        }
    }

    /// The integer value, or `None` for floats.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Scalar::U8(v) => v.into(),
            Scalar::I8(v) => v.into(),
            Scalar::U16(v) => v.into(),
            Scalar::I16(v) => v.into(),
            Scalar::U32(v) => v.into(),
            Scalar::I32(v) => v.into(),
            Scalar::U64(v) | Scalar::Pointer(v) => v.into(),
            Scalar::I64(v) => v.into(),
            Scalar::F32(_) | Scalar::F64(_) => return None,
        })
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Scalar::F32(v) => Some(v.into()),
            Scalar::F64(v) => Some(v),
            _ => None,
        }
    }
}

/// A scalar could not be converted into the requested Rust type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {found} into {expected}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: String,
}

impl ConversionError {
    pub(crate) fn new(expected: &'static str, found: impl std::fmt::Debug) -> Self {
        Self {
            expected,
            found: format!("{found:?}"),
        }
    }
}

/// A decoded field value as stored in a [`FieldMap`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(Scalar),
    Array(Vec<Value>),
    Record(FieldMap),
}

impl Value {
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_scalar().and_then(|s| s.as_u64())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(|s| s.as_i64())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(|s| s.as_f64())
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&FieldMap> {
        match self {
            Value::Record(map) => Some(map),
            _ => None,
        }
    }

    /// Convert every element of an array value.
    pub fn to_vec<'a, T>(&'a self) -> Result<Vec<T>, ConversionError>
    where
        T: TryFrom<&'a Value, Error = ConversionError>,
    {
        match self {
            Value::Array(items) => items.iter().map(T::try_from).collect(),
            other => Err(ConversionError::new("array", other)),
        }
    }

    /// Collect an array of `u8` (or `i8`) values into raw bytes.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        self.as_array()?
            .iter()
            .map(|v| match v {
                Value::Scalar(Scalar::U8(b)) => Some(*b),
                Value::Scalar(Scalar::I8(b)) => Some(*b as u8),
                _ => None,
            })
            .collect()
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Value::Scalar(value)
    }
}

macro_rules! integer_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant(value)
                }
            }

            impl TryFrom<Scalar> for $ty {
                type Error = ConversionError;

                fn try_from(value: Scalar) -> Result<Self, Self::Error> {
                    value
                        .as_i128()
                        .and_then(|v| <$ty>::try_from(v).ok())
                        .ok_or_else(|| ConversionError::new(stringify!($ty), value))
                }
            }

            impl TryFrom<&Value> for $ty {
                type Error = ConversionError;

                fn try_from(value: &Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::Scalar(s) => <$ty>::try_from(*s),
                        other => Err(ConversionError::new(stringify!($ty), other)),
                    }
                }
            }
        )*
    };
}

integer_conversions! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
}

impl From<f32> for Scalar {
    fn from(value: f32) -> Self {
        Scalar::F32(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::F64(value)
    }
}

impl TryFrom<Scalar> for f32 {
    type Error = ConversionError;

    fn try_from(value: Scalar) -> Result<Self, Self::Error> {
        match value {
            Scalar::F32(v) => Ok(v),
            other => Err(ConversionError::new("f32", other)),
        }
    }
}

impl TryFrom<Scalar> for f64 {
    type Error = ConversionError;

    fn try_from(value: Scalar) -> Result<Self, Self::Error> {
        value
            .as_f64()
            .ok_or_else(|| ConversionError::new("f64", value))
    }
}

impl TryFrom<&Value> for f32 {
    type Error = ConversionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Scalar(s) => f32::try_from(*s),
            other => Err(ConversionError::new("f32", other)),
        }
    }
}

impl TryFrom<&Value> for f64 {
    type Error = ConversionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value
            .as_f64()
            .ok_or_else(|| ConversionError::new("f64", value))
    }
}

/// An ordered name to value mapping produced by a mapping decode.
///
/// Iteration order is the record's field declaration order. Lookups by name
/// go through a key index shared by all maps decoded with the same plan, so
/// building a map allocates nothing per key.
#[derive(Debug, Clone)]
pub struct FieldMap {
    keys: Arc<KeyIndex>,
    values: Vec<Value>,
    consumed: usize,
}

impl FieldMap {
    pub(crate) fn with_keys(keys: Arc<KeyIndex>) -> Self {
        let values = Vec::with_capacity(keys.len());
        Self {
            keys,
            values,
            consumed: 0,
        }
    }

    pub(crate) fn push(&mut self, value: Value) {
        debug_assert!(self.values.len() < self.keys.len());
        self.values.push(value);
    }

    pub(crate) fn set_consumed(&mut self, consumed: usize) {
        self.consumed = consumed;
    }

    /// Number of bytes the record occupied in its buffer.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.keys
            .get_index_of(name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Look up `name` and convert it, returning `None` if the field is
    /// missing or does not convert.
    pub fn get_as<'a, T>(&'a self, name: &str) -> Option<T>
    where
        T: TryFrom<&'a Value>,
    {
        self.get(name).and_then(|v| T::try_from(v).ok())
    }

    /// The value at declaration position `index`.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &Value)> {
        let name = self.keys.get_index(index)?;
        let value = self.values.get(index)?;
        Some((name.as_str(), value))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.keys
            .get_index_of(name)
            .filter(|idx| *idx < self.values.len())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().take(self.values.len()).map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.values.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.names().zip(self.values.iter())
    }
}

impl PartialEq for FieldMap {
    fn eq(&self, other: &Self) -> bool {
        self.consumed == other.consumed
            && self.values == other.values
            && self.names().eq(other.names())
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
