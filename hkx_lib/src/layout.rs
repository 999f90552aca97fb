use std::sync::Arc;

/// The primitive value types the field dispatcher can decode directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
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
}

impl ScalarKind {
    pub fn identity(&self) -> &'static str {
        match self {
            ScalarKind::U8 => "hkUint8",
            ScalarKind::I8 => "hkInt8",
            ScalarKind::U16 => "hkUint16",
            ScalarKind::I16 => "hkInt16",
            ScalarKind::U32 => "hkUint32",
            ScalarKind::I32 => "hkInt32",
            ScalarKind::U64 => "hkUint64",
            ScalarKind::I64 => "hkInt64",
            ScalarKind::F32 => "hkReal",
            ScalarKind::F64 => "hkDouble64",
        }
    }

    pub fn size_in_bytes(&self) -> u64 {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }
}

/// Determines which branch of the field dispatcher handles a type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// A composite type serialized field by field from its layout metadata.
    Record,
    /// A primitive value.
    Scalar(ScalarKind),
    /// A fixed count of contiguous elements.
    Array { element: Arc<TypeLayout>, count: usize },
}

/// Field layout metadata for one serialized type.
///
/// Layouts are supplied by the engine's reflected type system and loaded once.
/// They are immutable and shared between decodes via [Arc].
#[derive(Debug, Clone)]
pub struct TypeLayout {
    pub identity: String,
    pub alignment: u64,
    pub size: u64,
    pub kind: TypeKind,
    /// Fields in declaration order. Empty for scalars and arrays.
    pub fields: Vec<FieldLayout>,
}

/// One member of a record type.
#[derive(Debug, Clone)]
pub struct FieldLayout {
    pub name: String,
    /// Byte offset relative to the start of the owning record.
    pub offset: u64,
    pub layout: Arc<TypeLayout>,
    /// Non-serializable fields reserve their size as zero bytes.
    pub non_serializable: bool,
}

impl TypeLayout {
    pub fn scalar(kind: ScalarKind) -> Arc<TypeLayout> {
        let size = kind.size_in_bytes();
        Arc::new(TypeLayout {
            identity: kind.identity().to_string(),
            alignment: size,
            size,
            kind: TypeKind::Scalar(kind),
            fields: Vec::new(),
        })
    }

    pub fn array(element: Arc<TypeLayout>, count: usize) -> Arc<TypeLayout> {
        Arc::new(TypeLayout {
            identity: format!("{}[{}]", element.identity, count),
            alignment: element.alignment,
            size: element.size * count as u64,
            kind: TypeKind::Array { element, count },
            fields: Vec::new(),
        })
    }

    pub fn record(
        identity: impl Into<String>,
        alignment: u64,
        size: u64,
        fields: Vec<FieldLayout>,
    ) -> Arc<TypeLayout> {
        Arc::new(TypeLayout {
            identity: identity.into(),
            alignment,
            size,
            kind: TypeKind::Record,
            fields,
        })
    }
}

impl FieldLayout {
    pub fn new(name: impl Into<String>, offset: u64, layout: Arc<TypeLayout>) -> Self {
        Self {
            name: name.into(),
            offset,
            layout,
            non_serializable: false,
        }
    }

    pub fn reserved(name: impl Into<String>, offset: u64, layout: Arc<TypeLayout>) -> Self {
        Self {
            name: name.into(),
            offset,
            layout,
            non_serializable: true,
        }
    }
}
