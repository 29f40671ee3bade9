//! Destinations for decoded values: typed record instances and field maps.

use std::fmt;

use crate::error::DecodeError;
use crate::plan::DecodePlan;
use crate::record::{ArraySlot, Populate, Slot};
use crate::value::{FieldMap, Scalar, Value};

/// Where a value sits in its parent: a named field or an array position.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Path<'a> {
    Field(&'a str),
    Element(usize),
}

impl fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Field(name) => f.write_str(name),
            Path::Element(idx) => write!(f, "[{idx}]"),
        }
    }
}

/// Shape of a compound value about to be decoded.
#[derive(Clone, Copy)]
pub(crate) enum Shape<'p> {
    Record(&'p DecodePlan),
    Array(usize),
}

impl Shape<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Shape::Record(_) => "record",
            Shape::Array(_) => "array",
        }
    }
}

/// Decodes the children of a compound value into the given sink and
/// returns the number of bytes consumed.
pub(crate) type Fill<'f> = dyn FnMut(&mut dyn Sink) -> Result<usize, DecodeError> + 'f;

/// Receives decoded values in declaration order.
///
/// `index` is the field position within a record, or the element position
/// within an array.
pub(crate) trait Sink {
    fn scalar(&mut self, index: usize, path: Path<'_>, value: Scalar) -> Result<(), DecodeError>;

    fn nested(
        &mut self,
        index: usize,
        path: Path<'_>,
        shape: Shape<'_>,
        fill: &mut Fill<'_>,
    ) -> Result<(), DecodeError>;
}

// === Ordered mapping ===

/// Builds a [`FieldMap`] for one record.
pub(crate) struct MapSink {
    map: FieldMap,
}

impl MapSink {
    pub(crate) fn new(plan: &DecodePlan) -> Result<Self, DecodeError> {
        let keys = plan
            .keys()
            .cloned()
            .ok_or_else(|| plan.target_mismatch(crate::plan::Target::OrderedMapping))?;
        Ok(Self {
            map: FieldMap::with_keys(keys),
        })
    }

    pub(crate) fn finish(mut self, consumed: usize) -> FieldMap {
        self.map.set_consumed(consumed);
        self.map
    }
}

impl Sink for MapSink {
    fn scalar(&mut self, _index: usize, _path: Path<'_>, value: Scalar) -> Result<(), DecodeError> {
        self.map.push(Value::Scalar(value));
        Ok(())
    }

    fn nested(
        &mut self,
        _index: usize,
        _path: Path<'_>,
        shape: Shape<'_>,
        fill: &mut Fill<'_>,
    ) -> Result<(), DecodeError> {
        let value = collect(shape, fill)?;
        self.map.push(value);
        Ok(())
    }
}

/// Collects the elements of one array.
struct ListSink {
    items: Vec<Value>,
}

impl Sink for ListSink {
    fn scalar(&mut self, _index: usize, _path: Path<'_>, value: Scalar) -> Result<(), DecodeError> {
        self.items.push(Value::Scalar(value));
        Ok(())
    }

    fn nested(
        &mut self,
        _index: usize,
        _path: Path<'_>,
        shape: Shape<'_>,
        fill: &mut Fill<'_>,
    ) -> Result<(), DecodeError> {
        let value = collect(shape, fill)?;
        self.items.push(value);
        Ok(())
    }
}

fn collect(shape: Shape<'_>, fill: &mut Fill<'_>) -> Result<Value, DecodeError> {
    match shape {
        Shape::Record(plan) => {
            let mut child = MapSink::new(plan)?;
            let consumed = fill(&mut child)?;
            Ok(Value::Record(child.finish(consumed)))
        }
        Shape::Array(len) => {
            let mut child = ListSink {
                items: Vec::with_capacity(len),
            };
            fill(&mut child)?;
            Ok(Value::Array(child.items))
        }
    }
}

// === Typed instances ===

/// Writes decoded values straight into a record instance (or one of its
/// arrays).
pub(crate) enum InstanceSink<'a> {
    Record(&'a mut dyn Populate),
    Array(&'a mut dyn ArraySlot),
}

impl InstanceSink<'_> {
    fn slot(&mut self, index: usize) -> Option<Slot<'_>> {
        match self {
            InstanceSink::Record(r) => r.slot(index),
            InstanceSink::Array(a) => a.element(index),
        }
    }
}

impl Sink for InstanceSink<'_> {
    fn scalar(&mut self, index: usize, path: Path<'_>, value: Scalar) -> Result<(), DecodeError> {
        match self.slot(index) {
            Some(Slot::Scalar(s)) => s.store(value).map_err(|e| DecodeError::TypeMismatch {
                field: path.to_string(),
                expected: e.expected,
                found: e.found,
            }),
            Some(other) => Err(DecodeError::TypeMismatch {
                field: path.to_string(),
                expected: other.kind(),
                found: format!("{value:?}"),
            }),
            None => Err(DecodeError::MissingSlot {
                field: path.to_string(),
                index,
            }),
        }
    }

    fn nested(
        &mut self,
        index: usize,
        path: Path<'_>,
        shape: Shape<'_>,
        fill: &mut Fill<'_>,
    ) -> Result<(), DecodeError> {
        match (shape, self.slot(index)) {
            (Shape::Record(_), Some(Slot::Record(r))) => {
                fill(&mut InstanceSink::Record(r))?;
                Ok(())
            }
            (Shape::Array(len), Some(Slot::Array(a))) => {
                a.prepare(len).map_err(|expected| DecodeError::ArrayLength {
                    field: path.to_string(),
                    expected,
                    found: len,
                })?;
                fill(&mut InstanceSink::Array(a))?;
                Ok(())
            }
            (shape, Some(other)) => Err(DecodeError::TypeMismatch {
                field: path.to_string(),
                expected: other.kind(),
                found: shape.kind().to_string(),
            }),
            (_, None) => Err(DecodeError::MissingSlot {
                field: path.to_string(),
                index,
            }),
        }
    }
}
