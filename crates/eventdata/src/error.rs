//! Schema build errors and decode errors carrying field paths.

/// Errors raised while building a record schema.
///
/// Schema errors are fatal for the record type they belong to. They are
/// cached alongside the schema, so every later use of the type observes the
/// same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{record}.{field}: cannot decode field of type `{ty}`")]
    UnresolvedType {
        record: String,
        field: String,
        ty: String,
    },

    #[error("{record}.{field}: array count must not be negative, got {count}")]
    NegativeCount {
        record: String,
        field: String,
        count: i64,
    },

    #[error(
        "{record}.{field}: length field `{length_field}` must be declared before the variable length field"
    )]
    LengthFieldNotDeclared {
        record: String,
        field: String,
        length_field: String,
    },

    #[error("{record}.{field}: length field `{length_field}` is not an integer scalar")]
    LengthFieldNotInteger {
        record: String,
        field: String,
        length_field: String,
    },

    #[error("{record}.{field}: field declared twice")]
    DuplicateField { record: String, field: String },

    #[error("nested record cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("{record}.{field}: {source}")]
    Nested {
        record: String,
        field: String,
        source: Box<SchemaError>,
    },
}

/// Errors raised by a single decode call.
///
/// Decode errors never leave shared state behind; the caller may log the
/// malformed record and carry on with the next buffer. Field names are paths
/// relative to the decoded record, e.g. `urb.setup[3]`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("span {offset}+{length} exceeds buffer of {buffer_len} bytes")]
    InvalidSpan {
        offset: usize,
        length: usize,
        buffer_len: usize,
    },

    #[error("{field}: need {needed} bytes at offset {offset}, only {available} available")]
    OutOfBounds {
        field: String,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{field}: length field `{length_field}` holds negative count {value}")]
    NegativeLength {
        field: String,
        length_field: String,
        value: i128,
    },

    #[error("{field}: element count {count} exceeds limit of {limit}")]
    TooManyElements {
        field: String,
        count: u128,
        limit: usize,
    },

    #[error("{field}: cannot store {found} into {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("{field}: array holds {expected} elements, decoded {found}")]
    ArrayLength {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("{field}: record has no slot at index {index}")]
    MissingSlot { field: String, index: usize },

    #[error("plan for {record} was compiled for {compiled}, not {requested}")]
    TargetMismatch {
        record: String,
        compiled: &'static str,
        requested: &'static str,
    },
}

impl DecodeError {
    /// Prefix the field path of this error with `parent`.
    pub(crate) fn within(mut self, parent: &str) -> Self {
        let field = match &mut self {
            DecodeError::OutOfBounds { field, .. }
            | DecodeError::NegativeLength { field, .. }
            | DecodeError::TooManyElements { field, .. }
            | DecodeError::TypeMismatch { field, .. }
            | DecodeError::ArrayLength { field, .. }
            | DecodeError::MissingSlot { field, .. } => field,
            DecodeError::InvalidSpan { .. } | DecodeError::TargetMismatch { .. } => return self,
        };
        *field = if field.starts_with('[') {
            format!("{parent}{field}")
        } else {
            format!("{parent}.{field}")
        };
        self
    }

    /// The field path this error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            DecodeError::OutOfBounds { field, .. }
            | DecodeError::NegativeLength { field, .. }
            | DecodeError::TooManyElements { field, .. }
            | DecodeError::TypeMismatch { field, .. }
            | DecodeError::ArrayLength { field, .. }
            | DecodeError::MissingSlot { field, .. } => Some(field),
            DecodeError::InvalidSpan { .. } | DecodeError::TargetMismatch { .. } => None,
        }
    }
}

/// Errors returned by the typed entry points, which may build a schema on
/// first use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_nests_paths() {
        let err = DecodeError::OutOfBounds {
            field: "tail".into(),
            offset: 4,
            needed: 2,
            available: 1,
        };
        let err = err.within("[2]").within("items").within("hdr");
        assert_eq!(err.field(), Some("hdr.items[2].tail"));
    }

    #[test]
    fn test_within_keeps_spanless_errors() {
        let err = DecodeError::InvalidSpan {
            offset: 1,
            length: 2,
            buffer_len: 2,
        };
        assert_eq!(err.clone().within("hdr"), err);
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_display() {
        let err = DecodeError::OutOfBounds {
            field: "size".into(),
            offset: 6,
            needed: 4,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "size: need 4 bytes at offset 6, only 2 available"
        );

        let err = SchemaError::Cycle {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "nested record cycle: A -> B -> A");
    }
}
