//! Declarative decoder for packed binary event records.
//!
//! A record type declares its fields once, in wire order. The first decode
//! of a type builds its schema and compiles a decode plan, which every later
//! call reuses from any thread.
//!
//! # Field kinds
//!
//! | Kind            | Wire encoding                                        |
//! |-----------------|------------------------------------------------------|
//! | Scalar          | fixed width integer or float (`u8` .. `f64`, pointer) |
//! | Record          | another record, decoded in place                     |
//! | Fixed array     | `count` elements back to back                        |
//! | Variable array  | as many elements as an earlier length field says     |
//!
//! # Usage
//!
//! ```
//! use eventdata::Record;
//!
//! #[derive(Debug, Default, Record)]
//! struct Header {
//!     kind: u16,
//!     flags: u16,
//! }
//!
//! #[derive(Debug, Default, Record)]
//! struct Packet {
//!     header: Header,
//!     len: u8,
//!     #[event_data(length = "len")]
//!     body: Vec<u8>,
//! }
//!
//! let data = [1, 0, 2, 0, 3, 0xAA, 0xBB, 0xCC];
//!
//! let (packet, consumed) = eventdata::decode::<Packet>(&data, 0, data.len()).unwrap();
//! assert_eq!(packet.header.kind, 1);
//! assert_eq!(packet.body, vec![0xAA, 0xBB, 0xCC]);
//! assert_eq!(consumed, 8);
//!
//! let fields = eventdata::decode_to_mapping::<Packet>(&data, 0, data.len()).unwrap();
//! assert_eq!(fields.names().collect::<Vec<_>>(), ["header", "len", "body"]);
//! assert_eq!(fields.get("len").and_then(|v| v.as_u64()), Some(3));
//! ```

// Lets the derive's `::eventdata::` paths resolve inside this crate's tests.
extern crate self as eventdata;

pub mod config;
pub mod error;
pub mod plan;
pub mod reader;
pub mod record;
pub mod registry;
pub mod schema;
pub mod value;
mod materialize;
mod payload;

pub use config::{ByteOrder, DecodeConfig, PointerWidth};
pub use error::{DecodeError, Error, SchemaError};
pub use payload::Payload;
pub use plan::{DecodePlan, Target};
pub use record::{ArraySlot, ArrayType, FieldType, FieldValue, Populate, Record, ScalarSlot, Slot};
pub use registry::{plan, register, schema};
pub use schema::{
    Catalog, Element, ElementType, FieldDescriptor, FieldKind, FieldMeta, RecordSchema,
    ScalarRepr, SchemaBuilder,
};
pub use value::{ConversionError, FieldMap, Scalar, Value};

#[cfg(feature = "derive")]
pub use eventdata_derive::Record;

/// Decodes record types with a fixed [`DecodeConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoder {
    config: DecodeConfig,
}

impl Decoder {
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    /// A decoder configured from the environment, see
    /// [`DecodeConfig::from_env`]. Falls back to the defaults if unset.
    pub fn from_env() -> Result<Self, serde_json::Error> {
        let config = DecodeConfig::from_env()?.unwrap_or_default();
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Populate `instance` from `data[offset..offset + length]`, returning
    /// the number of bytes consumed.
    pub fn decode_into<T: Record>(
        &self,
        instance: &mut T,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<usize, Error> {
        let plan = registry::plan::<T>(Target::TypedInstance)?;
        Ok(plan.decode_into(instance, data, offset, length, &self.config)?)
    }

    /// Decode a fresh `T` from `data[offset..offset + length]`.
    pub fn decode<T: Record + Default>(
        &self,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<(T, usize), Error> {
        let mut instance = T::default();
        let consumed = self.decode_into(&mut instance, data, offset, length)?;
        Ok((instance, consumed))
    }

    /// Decode `data[offset..offset + length]` as a `T` into an ordered
    /// field map.
    pub fn decode_to_mapping<T: Record>(
        &self,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<FieldMap, Error> {
        let plan = registry::plan::<T>(Target::OrderedMapping)?;
        Ok(plan.decode_to_mapping(data, offset, length, &self.config)?)
    }
}

/// [`Decoder::decode_into`] with the default configuration.
pub fn decode_into<T: Record>(
    instance: &mut T,
    data: &[u8],
    offset: usize,
    length: usize,
) -> Result<usize, Error> {
    Decoder::default().decode_into(instance, data, offset, length)
}

/// [`Decoder::decode`] with the default configuration.
pub fn decode<T: Record + Default>(
    data: &[u8],
    offset: usize,
    length: usize,
) -> Result<(T, usize), Error> {
    Decoder::default().decode(data, offset, length)
}

/// [`Decoder::decode_to_mapping`] with the default configuration.
pub fn decode_to_mapping<T: Record>(
    data: &[u8],
    offset: usize,
    length: usize,
) -> Result<FieldMap, Error> {
    Decoder::default().decode_to_mapping::<T>(data, offset, length)
}
