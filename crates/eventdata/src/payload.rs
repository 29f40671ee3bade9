//! Lazily decoded event payloads with raw offset helpers.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;

use crate::error::Error;
use crate::reader::Cursor;
use crate::record::Record;
use crate::schema::RecordSchema;
use crate::value::{FieldMap, Value};
use crate::{registry, Decoder};

/// The raw payload of one event, decoded as a `T` on demand.
///
/// The field map is decoded at most once, on first access, and shared by
/// every later lookup. The raw accessors (`u16_at`, `cstr_at`, ...) read the
/// buffer directly at absolute offsets and never trigger a decode.
pub struct Payload<T> {
    data: Bytes,
    decoder: Decoder,
    fields: OnceCell<Result<FieldMap, Error>>,
    record: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Payload<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.data.len())
            .field("decoded", &self.fields.get().is_some())
            .finish()
    }
}

impl<T> Clone for Payload<T> {
    // The clone shares the buffer but decodes on its own.
    fn clone(&self) -> Self {
        Self::with_decoder(self.data.clone(), self.decoder)
    }
}

impl<T> Payload<T> {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_decoder(data, Decoder::default())
    }

    pub fn with_decoder(data: impl Into<Bytes>, decoder: Decoder) -> Self {
        Self {
            data: data.into(),
            decoder,
            fields: OnceCell::new(),
            record: PhantomData,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn cursor(&self, offset: usize, width: usize) -> Option<Cursor<'_>> {
        Cursor::new(&self.data, offset, width, self.decoder.config()).ok()
    }

    /// The `u16` at `offset`, or `None` if it does not fit in the payload.
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        self.cursor(offset, 2)?.u16().ok()
    }

    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        self.cursor(offset, 4)?.u32().ok()
    }

    pub fn u64_at(&self, offset: usize) -> Option<u64> {
        self.cursor(offset, 8)?.u64().ok()
    }

    /// The NUL terminated byte string starting at `offset`, without the
    /// terminator. An unterminated string runs to the end of the payload.
    pub fn cstr_at(&self, offset: usize) -> Option<&[u8]> {
        let rest = self.data.get(offset..)?;
        let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        Some(&rest[..end])
    }

    /// The offset just past the NUL terminated string at `offset`.
    pub fn skip_cstr(&self, offset: usize) -> Option<usize> {
        let s = self.cstr_at(offset)?;
        Some((offset + s.len() + 1).min(self.data.len()))
    }
}

impl<T: Record> Payload<T> {
    pub fn schema(&self) -> Result<Arc<RecordSchema>, Error> {
        Ok(registry::schema::<T>()?)
    }

    /// Field names of `T` in declaration order.
    pub fn names(&self) -> Result<Vec<String>, Error> {
        Ok(self.schema()?.names().map(str::to_string).collect())
    }

    /// The decoded fields, decoding the payload on first call.
    pub fn fields(&self) -> Result<&FieldMap, Error> {
        self.fields
            .get_or_init(|| {
                log::trace!("decoding {} byte payload as {}", self.data.len(), T::record_name());
                self.decoder.decode_to_mapping::<T>(&self.data, 0, self.data.len())
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The value of the field at `index`; `None` past the last field.
    pub fn value(&self, index: usize) -> Result<Option<&Value>, Error> {
        Ok(self.fields()?.value(index))
    }

    pub fn get(&self, name: &str) -> Result<Option<&Value>, Error> {
        Ok(self.fields()?.get(name))
    }

    /// Decode the whole payload into a fresh `T`.
    pub fn record(&self) -> Result<T, Error>
    where
        T: Default,
    {
        let (record, _) = self.decoder.decode::<T>(&self.data, 0, self.data.len())?;
        Ok(record)
    }
}
