//! Type mapping from entity field types to the types used in each layer
//!
//! Synthesizers never inspect field types directly when they need a concrete
//! type or a tag; they ask a [`TypeMapper`]. The mappings are pure and
//! deterministic, which keeps re-runs stable.

use crate::entity::{Field, FieldType, Scalar};

/// Convention layer consulted once per field per artifact
pub trait TypeMapper: Send + Sync {
    /// Rust type of the column in the storage row struct
    fn storage_type(&self, field: &Field) -> String;

    /// Rust type of the field in the prost-generated wire message
    fn wire_type(&self, field: &Field) -> String;

    /// Rust type of the field in the domain model
    fn in_memory_type(&self, field: &Field) -> String;

    /// Column name in storage
    fn storage_tag(&self, field: &Field) -> String {
        field.column.clone().unwrap_or_else(|| field.name.clone())
    }

    /// Field name in the wire message
    fn wire_field_name(&self, field: &Field) -> String {
        field.wire_name.clone().unwrap_or_else(|| field.name.clone())
    }
}

/// The default convention: Postgres via sqlx, prost on the wire
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeMapper;

impl TypeMapper for DefaultTypeMapper {
    fn storage_type(&self, field: &Field) -> String {
        // sqlx decodes Postgres arrays, uuid and timestamptz natively
        map_native(&field.field_type)
    }

    fn wire_type(&self, field: &Field) -> String {
        map_wire(&field.field_type)
    }

    fn in_memory_type(&self, field: &Field) -> String {
        map_native(&field.field_type)
    }
}

fn map_scalar(scalar: Scalar) -> &'static str {
    match scalar {
        Scalar::String => "String",
        Scalar::Bool => "bool",
        Scalar::I32 => "i32",
        Scalar::I64 => "i64",
        Scalar::F32 => "f32",
        Scalar::F64 => "f64",
    }
}

fn map_native(field_type: &FieldType) -> String {
    match field_type {
        FieldType::Scalar(s) => map_scalar(*s).to_string(),
        FieldType::Uuid => "Uuid".to_string(),
        FieldType::Timestamp => "DateTime<Utc>".to_string(),
        FieldType::List(inner) => format!("Vec<{}>", map_native(inner)),
    }
}

/// Map a field type to its prost representation
///
/// Identifiers travel as strings; a singular `google.protobuf.Timestamp` is a
/// message and therefore optional in prost, repeated ones are not.
fn map_wire(field_type: &FieldType) -> String {
    match field_type {
        FieldType::Scalar(s) => map_scalar(*s).to_string(),
        FieldType::Uuid => "String".to_string(),
        FieldType::Timestamp => "Option<Timestamp>".to_string(),
        FieldType::List(inner) => match inner.as_ref() {
            FieldType::Timestamp => "Vec<Timestamp>".to_string(),
            other => format!("Vec<{}>", map_wire(other)),
        },
    }
}
