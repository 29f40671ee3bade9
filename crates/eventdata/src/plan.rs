//! Compiled decode plans.
//!
//! A plan is the schema turned into a flat list of steps, one per field.
//! Each step knows how to read its field from a [`Cursor`] and hands the
//! value to a sink, which either stores it into a record instance or
//! appends it to a [`FieldMap`].

use std::sync::Arc;

use crate::config::DecodeConfig;
use crate::error::DecodeError;
use crate::materialize::{InstanceSink, MapSink, Path, Shape, Sink};
use crate::reader::Cursor;
use crate::record::Populate;
use crate::registry;
use crate::schema::{Element, FieldKind, RecordSchema, ScalarRepr};
use crate::value::{FieldMap, KeyIndex};

/// What a plan produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    TypedInstance,
    OrderedMapping,
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Target::TypedInstance => "typed instance",
            Target::OrderedMapping => "ordered mapping",
        }
    }
}

#[derive(Debug)]
enum ElementOp {
    Scalar(ScalarRepr),
    Record(Arc<DecodePlan>),
}

impl ElementOp {
    fn min_size(&self) -> usize {
        match self {
            ElementOp::Scalar(repr) => repr.min_width(),
            ElementOp::Record(plan) => plan.min_size,
        }
    }
}

#[derive(Debug)]
enum Count {
    Fixed(usize),
    /// The value captured from an earlier length field in the same pass.
    Captured { slot: usize, length_field: String },
}

#[derive(Debug)]
enum Op {
    Scalar(ScalarRepr),
    Record(Arc<DecodePlan>),
    Array { element: ElementOp, count: Count },
}

#[derive(Debug)]
struct Step {
    name: String,
    op: Op,
    /// Capture slot for fields that govern a variable length array.
    capture: Option<usize>,
}

/// The compiled, reusable decode procedure of one record schema.
///
/// Plans hold no per-call state and can be shared between threads.
#[derive(Debug)]
pub struct DecodePlan {
    record: String,
    target: Target,
    steps: Vec<Step>,
    captures: usize,
    keys: Option<Arc<KeyIndex>>,
    min_size: usize,
}

impl DecodePlan {
    /// Compile `schema` for `target`.
    ///
    /// Nested records of static types reuse the registry's cached plans;
    /// nested explicit schemas are compiled along with this plan.
    pub fn compile(schema: &RecordSchema, target: Target) -> DecodePlan {
        let fields = schema.fields();

        let mut capture_of: Vec<Option<usize>> = vec![None; fields.len()];
        let mut captures = 0;
        for field in fields {
            if let FieldKind::VariableArray { length_index, .. } = field.kind() {
                capture_of[*length_index].get_or_insert_with(|| {
                    captures += 1;
                    captures - 1
                });
            }
        }

        let steps: Vec<Step> = fields
            .iter()
            .zip(&capture_of)
            .map(|(field, capture)| {
                let op = match field.kind() {
                    FieldKind::Scalar(repr) => Op::Scalar(*repr),
                    FieldKind::Record(nested) => Op::Record(registry::plan_for(nested, target)),
                    FieldKind::FixedArray { element, count } => Op::Array {
                        element: element_op(element, target),
                        count: Count::Fixed(*count),
                    },
                    FieldKind::VariableArray {
                        element,
                        length_field,
                        length_index,
                    } => Op::Array {
                        element: element_op(element, target),
                        count: Count::Captured {
                            slot: capture_of[*length_index].unwrap_or_default(),
                            length_field: length_field.clone(),
                        },
                    },
                };
                Step {
                    name: field.name().to_string(),
                    op,
                    capture: *capture,
                }
            })
            .collect();

        log::debug!(
            "compiled {} plan for {} ({} steps, {} captures)",
            target.name(),
            schema.name(),
            steps.len(),
            captures
        );

        DecodePlan {
            record: schema.name().to_string(),
            target,
            steps,
            captures,
            keys: match target {
                Target::OrderedMapping => Some(schema.keys().clone()),
                Target::TypedInstance => None,
            },
            min_size: schema.min_size(),
        }
    }

    pub fn record_name(&self) -> &str {
        &self.record
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub(crate) fn keys(&self) -> Option<&Arc<KeyIndex>> {
        self.keys.as_ref()
    }

    pub(crate) fn target_mismatch(&self, requested: Target) -> DecodeError {
        DecodeError::TargetMismatch {
            record: self.record.clone(),
            compiled: self.target.name(),
            requested: requested.name(),
        }
    }

    /// Populate `instance` from `data[offset..offset + length]` and return
    /// the number of bytes consumed.
    pub fn decode_into(
        &self,
        instance: &mut dyn Populate,
        data: &[u8],
        offset: usize,
        length: usize,
        config: &DecodeConfig,
    ) -> Result<usize, DecodeError> {
        if self.target != Target::TypedInstance {
            return Err(self.target_mismatch(Target::TypedInstance));
        }
        let mut cursor = Cursor::new(data, offset, length, config)?;
        let consumed = self.run(&mut cursor, config, &mut InstanceSink::Record(instance))?;
        log::trace!("decoded {} into instance ({} bytes)", self.record, consumed);
        Ok(consumed)
    }

    /// Decode `data[offset..offset + length]` into an ordered field map.
    pub fn decode_to_mapping(
        &self,
        data: &[u8],
        offset: usize,
        length: usize,
        config: &DecodeConfig,
    ) -> Result<FieldMap, DecodeError> {
        let mut sink = MapSink::new(self)?;
        let mut cursor = Cursor::new(data, offset, length, config)?;
        let consumed = self.run(&mut cursor, config, &mut sink)?;
        log::trace!("decoded {} into mapping ({} bytes)", self.record, consumed);
        Ok(sink.finish(consumed))
    }

    /// Execute every step against `cursor`, returning the bytes consumed.
    pub(crate) fn run(
        &self,
        cursor: &mut Cursor<'_>,
        config: &DecodeConfig,
        sink: &mut dyn Sink,
    ) -> Result<usize, DecodeError> {
        let start = cursor.position();
        let mut captured = vec![0i128; self.captures];

        for (index, step) in self.steps.iter().enumerate() {
            let path = Path::Field(&step.name);
            match &step.op {
                Op::Scalar(repr) => {
                    let value = cursor.scalar(*repr).map_err(|e| e.into_error(path))?;
                    if let Some(slot) = step.capture {
                        // Length fields are integer scalars; the schema
                        // builder rejects anything else.
                        captured[slot] = value.as_i128().unwrap_or_default();
                    }
                    sink.scalar(index, path, value)?;
                }
                Op::Record(plan) => {
                    sink.nested(index, path, Shape::Record(plan), &mut |child| {
                        run_nested(plan, cursor, config, child, path)
                    })?;
                }
                Op::Array { element, count } => {
                    let len = array_len(step, element, count, &captured, cursor, config)?;
                    sink.nested(index, path, Shape::Array(len), &mut |child| {
                        decode_elements(element, len, cursor, config, child)
                            .map_err(|e| e.within(&step.name))
                    })?;
                }
            }
        }

        Ok(cursor.position() - start)
    }
}

fn element_op(element: &Element, target: Target) -> ElementOp {
    match element {
        Element::Scalar(repr) => ElementOp::Scalar(*repr),
        Element::Record(schema) => ElementOp::Record(registry::plan_for(schema, target)),
    }
}

/// Run a nested record plan on the remaining span and advance past it.
fn run_nested(
    plan: &DecodePlan,
    cursor: &mut Cursor<'_>,
    config: &DecodeConfig,
    sink: &mut dyn Sink,
    path: Path<'_>,
) -> Result<usize, DecodeError> {
    let mut inner = cursor.split();
    let consumed = plan
        .run(&mut inner, config, sink)
        .map_err(|e| e.within(&path.to_string()))?;
    cursor
        .advance(consumed)
        .map_err(|e| e.into_error(path))?;
    Ok(consumed)
}

fn decode_elements(
    element: &ElementOp,
    len: usize,
    cursor: &mut Cursor<'_>,
    config: &DecodeConfig,
    sink: &mut dyn Sink,
) -> Result<usize, DecodeError> {
    let start = cursor.position();
    for i in 0..len {
        let path = Path::Element(i);
        match element {
            ElementOp::Scalar(repr) => {
                let value = cursor.scalar(*repr).map_err(|e| e.into_error(path))?;
                sink.scalar(i, path, value)?;
            }
            ElementOp::Record(plan) => {
                sink.nested(i, path, Shape::Record(plan), &mut |child| {
                    run_nested(plan, cursor, config, child, path)
                })?;
            }
        }
    }
    Ok(cursor.position() - start)
}

/// Resolve the element count of an array step.
///
/// Every count, fixed or captured, is capped by what the remaining span could
/// possibly hold, so corrupt lengths and oversized fixed arrays fail before
/// anything is allocated.
fn array_len(
    step: &Step,
    element: &ElementOp,
    count: &Count,
    captured: &[i128],
    cursor: &Cursor<'_>,
    config: &DecodeConfig,
) -> Result<usize, DecodeError> {
    let requested = match count {
        Count::Fixed(n) => *n as u128,
        Count::Captured { slot, length_field } => {
            let value = captured[*slot];
            if value < 0 {
                return Err(DecodeError::NegativeLength {
                    field: step.name.clone(),
                    length_field: length_field.clone(),
                    value,
                });
            }
            value as u128
        }
    };

    let span_limit = cursor.remaining() / element.min_size().max(1);

    let limit = config
        .max_array_elements
        .map_or(span_limit, |max| max.min(span_limit));
    if requested > limit as u128 {
        return Err(DecodeError::TooManyElements {
            field: step.name.clone(),
            count: requested,
            limit,
        });
    }
    Ok(requested as usize)
}
