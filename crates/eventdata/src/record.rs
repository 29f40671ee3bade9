//! Traits connecting Rust types to schemas and decoded values.
//!
//! [`Record`] declares a type's fields; [`Populate`] gives the decoder
//! in-place access to them. Both are normally generated by
//! `#[derive(Record)]`:
//!
//! ```
//! use eventdata::Record;
//!
//! #[derive(Debug, Default, Record)]
//! struct Transfer {
//!     len: u16,
//!     #[event_data(length = "len")]
//!     data: Vec<u8>,
//! }
//!
//! let (t, consumed) = eventdata::decode::<Transfer>(&[2, 0, 0xAA, 0xBB], 0, 4).unwrap();
//! assert_eq!(t.data, vec![0xAA, 0xBB]);
//! assert_eq!(consumed, 4);
//! ```

use crate::schema::{ElementType, ScalarRepr, SchemaBuilder};
use crate::value::{ConversionError, Scalar};

/// A record type with a static field layout.
pub trait Record: Populate + Sized + 'static {
    fn record_name() -> &'static str;

    /// Declare the fields of this record in wire order.
    fn declare(schema: &mut SchemaBuilder);
}

/// In-place access to the fields of a record, by declaration position.
pub trait Populate {
    fn slot(&mut self, index: usize) -> Option<Slot<'_>>;
}

/// A mutable view of one field of a record instance.
pub enum Slot<'a> {
    Scalar(&'a mut dyn ScalarSlot),
    Record(&'a mut dyn Populate),
    Array(&'a mut dyn ArraySlot),
}

impl Slot<'_> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Slot::Scalar(_) => "scalar",
            Slot::Record(_) => "record",
            Slot::Array(_) => "array",
        }
    }
}

pub trait ScalarSlot {
    fn store(&mut self, value: Scalar) -> Result<(), ConversionError>;
}

pub trait ArraySlot {
    /// Make room for exactly `len` elements. Returns the supported length
    /// if the array cannot hold `len` elements.
    fn prepare(&mut self, len: usize) -> Result<(), usize>;

    fn element(&mut self, index: usize) -> Option<Slot<'_>>;
}

/// A type that can be stored in a record field.
pub trait FieldValue {
    fn slot(&mut self) -> Slot<'_>;
}

/// A type that declares itself as a single element (scalar or record).
pub trait FieldType {
    fn element_type() -> ElementType;
}

/// A container type usable for array fields.
pub trait ArrayType {
    type Element: FieldType;
}

macro_rules! scalar_field {
    ($($ty:ty => $repr:ident),* $(,)?) => {
        $(
            impl ScalarSlot for $ty {
                fn store(&mut self, value: Scalar) -> Result<(), ConversionError> {
                    *self = <$ty>::try_from(value)?;
                    Ok(())
                }
            }

            impl FieldValue for $ty {
                fn slot(&mut self) -> Slot<'_> {
                    Slot::Scalar(self)
                }
            }

            impl FieldType for $ty {
                fn element_type() -> ElementType {
                    ElementType::Scalar(ScalarRepr::$repr)
                }
            }
        )*
    };
}

scalar_field! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

// usize has no fixed width; it only backs `pointer` fields.
impl ScalarSlot for usize {
    fn store(&mut self, value: Scalar) -> Result<(), ConversionError> {
        *self = value
            .as_i128()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| ConversionError::new("usize", value))?;
        Ok(())
    }
}

impl FieldValue for usize {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Scalar(self)
    }
}

impl<T: FieldValue + Default> ArraySlot for Vec<T> {
    fn prepare(&mut self, len: usize) -> Result<(), usize> {
        self.clear();
        self.resize_with(len, T::default);
        Ok(())
    }

    fn element(&mut self, index: usize) -> Option<Slot<'_>> {
        self.get_mut(index).map(FieldValue::slot)
    }
}

impl<T: FieldValue + Default> FieldValue for Vec<T> {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Array(self)
    }
}

impl<T: FieldType> ArrayType for Vec<T> {
    type Element = T;
}

impl<T: FieldValue, const N: usize> ArraySlot for [T; N] {
    fn prepare(&mut self, len: usize) -> Result<(), usize> {
        if len == N {
            Ok(())
        } else {
            Err(N)
        }
    }

    fn element(&mut self, index: usize) -> Option<Slot<'_>> {
        self.get_mut(index).map(FieldValue::slot)
    }
}

impl<T: FieldValue, const N: usize> FieldValue for [T; N] {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Array(self)
    }
}

impl<T: FieldType, const N: usize> ArrayType for [T; N] {
    type Element = T;
}
