//! Entity model driving every synthesizer
//!
//! An [`Entity`] is the immutable, validated description of one data entity:
//! its name, its ordered fields and their capability flags. Field order is
//! significant: it determines column order, selection order and argument
//! order in everything that gets generated.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use heck::{ToSnakeCase, ToUpperCamelCase};
use serde::Serialize;

use crate::codegen::is_identifier;
use crate::error::{GeneratorError, Result};

/// Name of the implicit identifier field
pub const ID_FIELD: &str = "id";
/// Name of the implicit creation timestamp
pub const CREATED_AT_FIELD: &str = "created_at";
/// Name of the implicit modification timestamp
pub const UPDATED_AT_FIELD: &str = "updated_at";
/// Variant of the generated `Iden` enum that names the table
pub const TABLE_VARIANT: &str = "Table";

/// A data entity (table/model)
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    /// Entity name, UpperCamelCase
    pub name: String,

    /// Storage table name
    pub table_name: String,

    /// Declared fields, in declaration order (implicit fields excluded)
    pub fields: Vec<Field>,
}

/// A field/column in an entity
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    /// Field name, snake_case
    pub name: String,

    /// Semantic type
    pub field_type: FieldType,

    /// Storage column override
    pub column: Option<String>,

    /// Wire field name override
    pub wire_name: Option<String>,

    /// Participates in full-text filtering
    pub searchable: bool,

    /// Participates in the sort-key set
    pub orderable: bool,

    /// The entity identifier (only the implicit `id`)
    pub primary: bool,
}

/// Scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    String,
    Bool,
    I32,
    I64,
    F32,
    F64,
}

/// Semantic field types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// A plain scalar value
    Scalar(Scalar),
    /// An identifier (own or referencing another entity)
    Uuid,
    /// A point in time
    Timestamp,
    /// A collection of scalars or identifiers
    List(Box<FieldType>),
}

impl Entity {
    /// Build and validate an entity
    ///
    /// `name` is normalized to UpperCamelCase and field names to snake_case.
    pub fn new(
        name: impl AsRef<str>,
        table_name: Option<String>,
        fields: Vec<Field>,
    ) -> Result<Self> {
        let raw = name.as_ref();
        if raw.trim().is_empty() {
            return Err(GeneratorError::invalid_entity(raw, "entity name is empty"));
        }
        let name = raw.to_upper_camel_case();
        if !is_identifier(&name) {
            return Err(GeneratorError::invalid_entity(raw, "entity name is not an identifier"));
        }
        let table_name = table_name
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| name.to_snake_case());

        let fields: Vec<Field> = fields
            .into_iter()
            .map(|mut f| {
                f.name = f.name.to_snake_case();
                f
            })
            .collect();

        let entity = Entity {
            name,
            table_name,
            fields,
        };
        entity.validate()?;
        Ok(entity)
    }

    fn validate(&self) -> Result<()> {
        let implicit = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];
        let mut seen: HashSet<&str> = implicit.into_iter().collect();
        let mut columns: HashSet<&str> = implicit.into_iter().collect();
        let mut wire_names: HashSet<&str> = implicit.into_iter().collect();
        // `Table` names the table itself in the generated `Iden` enum
        let mut variants: HashSet<String> = implicit
            .iter()
            .map(|name| name.to_upper_camel_case())
            .chain([TABLE_VARIANT.to_string()])
            .collect();

        for field in &self.fields {
            if !is_identifier(&field.name) {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!("field name '{}' is not an identifier", field.name),
                ));
            }
            if let Some(wire) = field.wire_name.as_deref().filter(|w| !is_identifier(w)) {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!("wire name '{wire}' of field '{}' is not an identifier", field.name),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!("duplicate or reserved field name '{}'", field.name),
                ));
            }
            let column = field.column.as_deref().unwrap_or(&field.name);
            if !columns.insert(column) {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!("column '{column}' of field '{}' is already taken", field.name),
                ));
            }
            let wire = field.wire_name.as_deref().unwrap_or(&field.name);
            if !wire_names.insert(wire) {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!("wire name '{wire}' of field '{}' is already taken", field.name),
                ));
            }
            if !variants.insert(field.variant_name()) {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!(
                        "field '{}' maps to column variant '{}', which is already taken",
                        field.name,
                        field.variant_name()
                    ),
                ));
            }
            if field.primary {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!(
                        "field '{}' cannot be the identifier, '{}' is implicit",
                        field.name, ID_FIELD
                    ),
                ));
            }
            if let FieldType::List(inner) = &field.field_type {
                if matches!(**inner, FieldType::List(_) | FieldType::Timestamp) {
                    return Err(GeneratorError::invalid_entity(
                        &self.name,
                        format!("field '{}' must be a list of scalars or ids", field.name),
                    ));
                }
            }
            if field.searchable && field.field_type != FieldType::Scalar(Scalar::String) {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!("field '{}' is searchable but not a string", field.name),
                ));
            }
            if field.orderable && field.field_type.is_list() {
                return Err(GeneratorError::invalid_entity(
                    &self.name,
                    format!("list field '{}' cannot be orderable", field.name),
                ));
            }
        }
        Ok(())
    }

    /// Snake-case name used for modules and functions (`OrderLine` -> `order_line`)
    pub fn snake_name(&self) -> String {
        self.name.to_snake_case()
    }

    /// Plural snake-case name used in wire naming (`user` -> `users`)
    pub fn collection_name(&self) -> String {
        pluralize(&self.snake_name())
    }

    /// Plural UpperCamelCase name (`User` -> `Users`)
    pub fn plural_name(&self) -> String {
        self.collection_name().to_upper_camel_case()
    }

    /// All columns: `id`, declared fields, `created_at`, `updated_at`
    pub fn columns(&self) -> Vec<Field> {
        let mut columns = Vec::with_capacity(self.fields.len() + 3);
        columns.push(Field::identifier());
        columns.extend(self.fields.iter().cloned());
        columns.push(Field::new(CREATED_AT_FIELD, FieldType::Timestamp).orderable(true));
        columns.push(Field::new(UPDATED_AT_FIELD, FieldType::Timestamp).orderable(true));
        columns
    }

    /// Columns taking part in full-text filtering
    pub fn searchable_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.searchable)
    }

    /// Columns in the sort-key set, implicit timestamps included
    pub fn orderable_fields(&self) -> Vec<Field> {
        self.columns().into_iter().filter(|f| f.orderable).collect()
    }
}

impl Field {
    /// A plain field with no capability flags
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Field {
            name: name.into(),
            field_type,
            column: None,
            wire_name: None,
            searchable: false,
            orderable: false,
            primary: false,
        }
    }

    /// The implicit identifier field
    pub fn identifier() -> Self {
        Field {
            primary: true,
            ..Field::new(ID_FIELD, FieldType::Uuid)
        }
    }

    /// Set the searchable flag
    pub fn searchable(mut self, searchable: bool) -> Self {
        self.searchable = searchable;
        self
    }

    /// Set the orderable flag
    pub fn orderable(mut self, orderable: bool) -> Self {
        self.orderable = orderable;
        self
    }

    /// Override the storage column name
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Override the wire field name
    pub fn wire_name(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    /// Whether this is one of the implicit fields
    pub fn is_implicit(&self) -> bool {
        matches!(
            self.name.as_str(),
            ID_FIELD | CREATED_AT_FIELD | UPDATED_AT_FIELD
        )
    }

    /// UpperCamelCase name used for enum variants (`created_at` -> `CreatedAt`)
    pub fn variant_name(&self) -> String {
        self.name.to_upper_camel_case()
    }
}

impl FieldType {
    /// Whether the type is a collection
    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }

    /// Element type for collections, the type itself otherwise
    pub fn element(&self) -> &FieldType {
        match self {
            FieldType::List(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scalar::String => "string",
            Scalar::Bool => "bool",
            Scalar::I32 => "i32",
            Scalar::I64 => "i64",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
        };
        f.write_str(name)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(s) => s.fmt(f),
            FieldType::Uuid => f.write_str("uuid"),
            FieldType::Timestamp => f.write_str("timestamp"),
            FieldType::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

impl FromStr for FieldType {
    type Err = GeneratorError;

    /// Parse a declared type: `string`, `bool`, `i32`, `i64`, `f32`, `f64`,
    /// `uuid`, `timestamp`, or a list written `[T]`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return Ok(FieldType::List(Box::new(inner.parse()?)));
        }
        let parsed = match s.to_ascii_lowercase().as_str() {
            "string" | "text" => FieldType::Scalar(Scalar::String),
            "bool" | "boolean" => FieldType::Scalar(Scalar::Bool),
            "i32" | "int" | "int32" => FieldType::Scalar(Scalar::I32),
            "i64" | "int64" => FieldType::Scalar(Scalar::I64),
            "f32" | "float" => FieldType::Scalar(Scalar::F32),
            "f64" | "double" => FieldType::Scalar(Scalar::F64),
            "uuid" | "id" => FieldType::Uuid,
            "timestamp" | "datetime" => FieldType::Timestamp,
            other => {
                return Err(GeneratorError::Config(format!("unknown field type '{other}'")));
            }
        };
        Ok(parsed)
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// English plural for snake_case identifiers, applied to the last word only
fn pluralize(word: &str) -> String {
    if word.ends_with("ss")
        || word.ends_with('x')
        || word.ends_with("ch")
        || word.ends_with("sh")
        || word.ends_with('z')
    {
        format!("{word}es")
    } else if let Some(stem) = word.strip_suffix('y') {
        match stem.chars().last() {
            Some(c) if !"aeiou".contains(c) => format!("{stem}ies"),
            _ => format!("{word}s"),
        }
    } else if word.ends_with('s') {
        word.to_string()
    } else {
        format!("{word}s")
    }
}
