//! Bounds-checked reads of scalar values from a span of a byte buffer.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::config::{ByteOrder, DecodeConfig, PointerWidth};
use crate::error::DecodeError;
use crate::schema::ScalarRepr;
use crate::value::Scalar;

/// A read that would cross the end of the cursor's span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange {
    pub offset: usize,
    pub needed: usize,
    pub available: usize,
}

impl OutOfRange {
    pub(crate) fn into_error(self, field: impl std::fmt::Display) -> DecodeError {
        DecodeError::OutOfBounds {
            field: field.to_string(),
            offset: self.offset,
            needed: self.needed,
            available: self.available,
        }
    }
}

/// A bounds-checked reader over the `[offset, offset + length)` span of a
/// buffer.
///
/// Every read either returns exactly the requested bytes and advances, or
/// fails without moving. Positions are absolute offsets into the buffer.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    byte_order: ByteOrder,
    pointer_width: PointerWidth,
}

macro_rules! read_int {
    ($($name:ident: $ty:ty, $width:expr, $read:ident;)*) => {
        $(
            pub fn $name(&mut self) -> Result<$ty, OutOfRange> {
                let b = self.take($width)?;
                Ok(match self.byte_order {
                    ByteOrder::Little => LittleEndian::$read(b),
                    ByteOrder::Big => BigEndian::$read(b),
                })
            }
        )*
    };
}

impl<'a> Cursor<'a> {
    pub fn new(
        data: &'a [u8],
        offset: usize,
        length: usize,
        config: &DecodeConfig,
    ) -> Result<Self, DecodeError> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= data.len())
            .ok_or(DecodeError::InvalidSpan {
                offset,
                length,
                buffer_len: data.len(),
            })?;
        Ok(Self {
            data,
            pos: offset,
            end,
            byte_order: config.byte_order,
            pointer_width: config.pointer_width,
        })
    }

    /// Current absolute position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute end of the span.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }

    /// A cursor over the rest of this cursor's span, starting at the current
    /// position. Reads on the child do not move this cursor.
    pub fn split(&self) -> Cursor<'a> {
        self.clone()
    }

    pub fn advance(&mut self, n: usize) -> Result<(), OutOfRange> {
        self.take(n).map(|_| ())
    }

    /// Read `n` raw bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], OutOfRange> {
        if n > self.remaining() {
            return Err(OutOfRange {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    pub fn u8(&mut self) -> Result<u8, OutOfRange> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8, OutOfRange> {
        Ok(self.u8()? as i8)
    }

    read_int! {
        u16: u16, 2, read_u16;
        i16: i16, 2, read_i16;
        u32: u32, 4, read_u32;
        i32: i32, 4, read_i32;
        u64: u64, 8, read_u64;
        i64: i64, 8, read_i64;
        f32: f32, 4, read_f32;
        f64: f64, 8, read_f64;
    }

    /// Read a pointer-sized unsigned integer.
    pub fn pointer(&mut self) -> Result<u64, OutOfRange> {
        match self.pointer_width {
            PointerWidth::Four => self.u32().map(u64::from),
            PointerWidth::Eight => self.u64(),
        }
    }

    /// Read one scalar of the given representation.
    pub fn scalar(&mut self, repr: ScalarRepr) -> Result<Scalar, OutOfRange> {
        Ok(match repr {
            ScalarRepr::U8 => Scalar::U8(self.u8()?),
            ScalarRepr::I8 => Scalar::I8(self.i8()?),
            ScalarRepr::U16 => Scalar::U16(self.u16()?),
            ScalarRepr::I16 => Scalar::I16(self.i16()?),
            ScalarRepr::U32 => Scalar::U32(self.u32()?),
            ScalarRepr::I32 => Scalar::I32(self.i32()?),
            ScalarRepr::U64 => Scalar::U64(self.u64()?),
            ScalarRepr::I64 => Scalar::I64(self.i64()?),
            ScalarRepr::F32 => Scalar::F32(self.f32()?),
            ScalarRepr::F64 => Scalar::F64(self.f64()?),
            ScalarRepr::Pointer => Scalar::Pointer(self.pointer()?),
        })
    }
}
