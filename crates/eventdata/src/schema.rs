//! Record schemas: the ordered list of fields making up one record type and
//! how each of them is decoded.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::PointerWidth;
use crate::error::SchemaError;
use crate::record::Record;
use crate::registry;
use crate::value::KeyIndex;

/// Wire representation of a fixed-width scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarRepr {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Unsigned pointer-sized integer; its width comes from the decode config.
    Pointer,
}

impl ScalarRepr {
    /// Encoded width in bytes.
    pub fn width(self, pointer_width: PointerWidth) -> usize {
        match self {
            ScalarRepr::U8 | ScalarRepr::I8 => 1,
            ScalarRepr::U16 | ScalarRepr::I16 => 2,
            ScalarRepr::U32 | ScalarRepr::I32 | ScalarRepr::F32 => 4,
            ScalarRepr::U64 | ScalarRepr::I64 | ScalarRepr::F64 => 8,
            ScalarRepr::Pointer => pointer_width.bytes(),
        }
    }

    /// Smallest width this repr can have under any configuration.
    pub fn min_width(self) -> usize {
        self.width(PointerWidth::Four)
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, ScalarRepr::F32 | ScalarRepr::F64)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarRepr::U8 => "u8",
            ScalarRepr::I8 => "i8",
            ScalarRepr::U16 => "u16",
            ScalarRepr::I16 => "i16",
            ScalarRepr::U32 => "u32",
            ScalarRepr::I32 => "i32",
            ScalarRepr::U64 => "u64",
            ScalarRepr::I64 => "i64",
            ScalarRepr::F32 => "f32",
            ScalarRepr::F64 => "f64",
            ScalarRepr::Pointer => "pointer",
        }
    }

    /// Resolve a textual type name as found in event manifests.
    ///
    /// Accepts Rust primitive names as well as the CLR/ETW spellings
    /// (`UInt16`, `Byte`, `IntPtr`, ...).
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "u8" | "byte" | "Byte" | "UInt8" => ScalarRepr::U8,
            "i8" | "sbyte" | "SByte" | "Int8" => ScalarRepr::I8,
            "u16" | "ushort" | "UInt16" => ScalarRepr::U16,
            "i16" | "short" | "Int16" => ScalarRepr::I16,
            "u32" | "uint" | "UInt32" => ScalarRepr::U32,
            "i32" | "int" | "Int32" => ScalarRepr::I32,
            "u64" | "ulong" | "UInt64" => ScalarRepr::U64,
            "i64" | "long" | "Int64" => ScalarRepr::I64,
            "f32" | "float" | "Single" | "Float" => ScalarRepr::F32,
            "f64" | "double" | "Double" => ScalarRepr::F64,
            "pointer" | "IntPtr" | "UIntPtr" | "Pointer" => ScalarRepr::Pointer,
            _ => return None,
        })
    }
}

impl fmt::Display for ScalarRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference to a static record type, resolved through the registry.
#[derive(Clone, Copy)]
pub struct TypeRef {
    pub(crate) id: TypeId,
    pub(crate) name: fn() -> &'static str,
    pub(crate) declare: fn(&mut SchemaBuilder),
    pub(crate) schema: fn() -> Result<Arc<RecordSchema>, SchemaError>,
}

impl TypeRef {
    pub fn of<T: Record>() -> Self {
        TypeRef {
            id: TypeId::of::<T>(),
            name: T::record_name,
            declare: T::declare,
            schema: registry::schema::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeRef").field(&self.name()).finish()
    }
}

/// A declared element: what a plain field holds, or what an array repeats.
#[derive(Debug, Clone)]
pub enum ElementType {
    Scalar(ScalarRepr),
    /// A static record type, built through the registry.
    Record(TypeRef),
    /// An explicitly built schema.
    Schema(Arc<RecordSchema>),
}

impl ElementType {
    pub fn record<T: Record>() -> Self {
        ElementType::Record(TypeRef::of::<T>())
    }
}

/// Array metadata attached to a textual field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMeta {
    None,
    Count(i64),
    Length(String),
}

/// A resolved element.
#[derive(Debug, Clone)]
pub enum Element {
    Scalar(ScalarRepr),
    Record(Arc<RecordSchema>),
}

impl Element {
    pub fn min_size(&self) -> usize {
        match self {
            Element::Scalar(repr) => repr.min_width(),
            Element::Record(schema) => schema.min_size(),
        }
    }
}

/// How one field is decoded.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(ScalarRepr),
    Record(Arc<RecordSchema>),
    FixedArray {
        element: Element,
        count: usize,
    },
    VariableArray {
        element: Element,
        length_field: String,
        /// Position of `length_field` in the schema; always smaller than the
        /// position of the array itself.
        length_index: usize,
    },
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn min_size(&self) -> usize {
        match &self.kind {
            FieldKind::Scalar(repr) => repr.min_width(),
            FieldKind::Record(schema) => schema.min_size(),
            FieldKind::FixedArray { element, count } => element.min_size().saturating_mul(*count),
            FieldKind::VariableArray { .. } => 0,
        }
    }
}

/// The immutable field layout of one record type.
#[derive(Debug)]
pub struct RecordSchema {
    name: String,
    type_id: Option<TypeId>,
    fields: Vec<FieldDescriptor>,
    keys: Arc<KeyIndex>,
    min_size: usize,
}

impl RecordSchema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The Rust type this schema was built for, if any.
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index_of(name).map(|idx| &self.fields[idx])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.keys.get_index_of(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Minimum number of bytes a record of this schema occupies.
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub(crate) fn keys(&self) -> &Arc<KeyIndex> {
        &self.keys
    }
}

/// Named schemas that textual declarations may refer to.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    schemas: HashMap<String, Arc<RecordSchema>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema under its own name, replacing any previous entry.
    pub fn insert(&mut self, schema: Arc<RecordSchema>) -> Option<Arc<RecordSchema>> {
        self.schemas.insert(schema.name().to_string(), schema)
    }

    /// Add the schema of a static record type.
    pub fn register<T: Record>(&mut self) -> Result<Arc<RecordSchema>, SchemaError> {
        let schema = registry::schema::<T>()?;
        self.insert(schema.clone());
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RecordSchema>> {
        self.schemas.get(name)
    }
}

enum Decl {
    Single(ElementType),
    Fixed(ElementType, i64),
    Variable(ElementType, String),
    Unresolved(String),
}

struct Declared {
    name: String,
    decl: Decl,
}

/// Collects field declarations in order and validates them into a
/// [`RecordSchema`].
///
/// Declaration methods never fail; every problem is reported by
/// [`SchemaBuilder::build`], scanning fields left to right.
pub struct SchemaBuilder {
    record: String,
    type_id: Option<TypeId>,
    catalog: Option<Catalog>,
    fields: Vec<Declared>,
}

impl SchemaBuilder {
    pub fn new(record: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            type_id: None,
            catalog: None,
            fields: Vec::new(),
        }
    }

    pub(crate) fn for_type<T: Record>() -> Self {
        Self {
            type_id: Some(TypeId::of::<T>()),
            ..Self::new(T::record_name())
        }
    }

    /// Resolve textual record type names against `catalog`.
    pub fn with_catalog(mut self, catalog: &Catalog) -> Self {
        self.catalog = Some(catalog.clone());
        self
    }

    pub fn record_name(&self) -> &str {
        &self.record
    }

    fn push(&mut self, name: impl Into<String>, decl: Decl) -> &mut Self {
        self.fields.push(Declared {
            name: name.into(),
            decl,
        });
        self
    }

    /// A scalar or nested record field.
    pub fn field(&mut self, name: impl Into<String>, element: ElementType) -> &mut Self {
        self.push(name, Decl::Single(element))
    }

    pub fn scalar(&mut self, name: impl Into<String>, repr: ScalarRepr) -> &mut Self {
        self.field(name, ElementType::Scalar(repr))
    }

    pub fn record<T: Record>(&mut self, name: impl Into<String>) -> &mut Self {
        self.field(name, ElementType::record::<T>())
    }

    pub fn nested(&mut self, name: impl Into<String>, schema: Arc<RecordSchema>) -> &mut Self {
        self.field(name, ElementType::Schema(schema))
    }

    pub fn fixed_array(
        &mut self,
        name: impl Into<String>,
        element: ElementType,
        count: i64,
    ) -> &mut Self {
        self.push(name, Decl::Fixed(element, count))
    }

    pub fn variable_array(
        &mut self,
        name: impl Into<String>,
        element: ElementType,
        length_field: impl Into<String>,
    ) -> &mut Self {
        self.push(name, Decl::Variable(element, length_field.into()))
    }

    /// Declare a field by textual type name, e.g. `("PortPath", "UInt32[]",
    /// FieldMeta::Count(6))`.
    ///
    /// Scalar names win over catalog names. Array types (`T[]`) need either a
    /// count or a length field; anything that does not resolve is reported
    /// as [`SchemaError::UnresolvedType`] by `build`.
    pub fn declared(&mut self, name: impl Into<String>, ty: &str, meta: FieldMeta) -> &mut Self {
        let ty = ty.trim();
        let decl = match (ty.strip_suffix("[]"), meta) {
            (None, FieldMeta::None) => self.resolve_type_name(ty).map(Decl::Single),
            (Some(elem), FieldMeta::Count(count)) => self
                .resolve_type_name(elem.trim())
                .map(|e| Decl::Fixed(e, count)),
            (Some(elem), FieldMeta::Length(field)) => self
                .resolve_type_name(elem.trim())
                .map(|e| Decl::Variable(e, field)),
            _ => None,
        };
        let decl = decl.unwrap_or_else(|| Decl::Unresolved(ty.to_string()));
        self.push(name, decl)
    }

    fn resolve_type_name(&self, ty: &str) -> Option<ElementType> {
        if let Some(repr) = ScalarRepr::from_type_name(ty) {
            return Some(ElementType::Scalar(repr));
        }
        self.catalog
            .as_ref()
            .and_then(|c| c.get(ty))
            .map(|schema| ElementType::Schema(schema.clone()))
    }

    /// Static record types this builder refers to, in declaration order.
    pub(crate) fn type_refs(&self) -> impl Iterator<Item = &TypeRef> + '_ {
        self.fields.iter().filter_map(|f| match &f.decl {
            Decl::Single(ElementType::Record(r))
            | Decl::Fixed(ElementType::Record(r), _)
            | Decl::Variable(ElementType::Record(r), _) => Some(r),
            _ => None,
        })
    }

    pub fn build(self) -> Result<RecordSchema, SchemaError> {
        let record = self.record;
        let mut fields: Vec<FieldDescriptor> = Vec::with_capacity(self.fields.len());
        let mut keys = KeyIndex::with_capacity(self.fields.len());

        for Declared { name, decl } in self.fields {
            if keys.contains(&name) {
                return Err(SchemaError::DuplicateField {
                    record,
                    field: name,
                });
            }

            let kind = match decl {
                Decl::Single(element) => match resolve(&record, &name, element)? {
                    Element::Scalar(repr) => FieldKind::Scalar(repr),
                    Element::Record(schema) => FieldKind::Record(schema),
                },
                Decl::Fixed(element, count) => {
                    let Ok(count) = usize::try_from(count) else {
                        return Err(SchemaError::NegativeCount {
                            record,
                            field: name,
                            count,
                        });
                    };
                    FieldKind::FixedArray {
                        element: resolve(&record, &name, element)?,
                        count,
                    }
                }
                Decl::Variable(element, length_field) => {
                    let Some(length_index) = keys.get_index_of(&length_field) else {
                        return Err(SchemaError::LengthFieldNotDeclared {
                            record,
                            field: name,
                            length_field,
                        });
                    };
                    match fields[length_index].kind {
                        FieldKind::Scalar(repr) if repr.is_integer() => {}
                        _ => {
                            return Err(SchemaError::LengthFieldNotInteger {
                                record,
                                field: name,
                                length_field,
                            })
                        }
                    }
                    FieldKind::VariableArray {
                        element: resolve(&record, &name, element)?,
                        length_field,
                        length_index,
                    }
                }
                Decl::Unresolved(ty) => {
                    return Err(SchemaError::UnresolvedType {
                        record,
                        field: name,
                        ty,
                    })
                }
            };

            keys.insert(name.clone());
            fields.push(FieldDescriptor { name, kind });
        }

        let min_size = fields
            .iter()
            .fold(0usize, |acc, f| acc.saturating_add(f.min_size()));

        log::debug!(
            "built schema {} ({} fields, min size {})",
            record,
            fields.len(),
            min_size
        );

        Ok(RecordSchema {
            name: record,
            type_id: self.type_id,
            fields,
            keys: Arc::new(keys),
            min_size,
        })
    }
}

fn resolve(record: &str, field: &str, element: ElementType) -> Result<Element, SchemaError> {
    match element {
        ElementType::Scalar(repr) => Ok(Element::Scalar(repr)),
        ElementType::Schema(schema) => Ok(Element::Record(schema)),
        ElementType::Record(type_ref) => {
            (type_ref.schema)()
                .map(Element::Record)
                .map_err(|source| SchemaError::Nested {
                    record: record.to_string(),
                    field: field.to_string(),
                    source: Box::new(source),
                })
        }
    }
}
