#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Primitive or nested type of a format field
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    Bool,
    Char,
    /// Another message format, referenced by name
    Nested(String),
}

impl FieldType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "int8_t" => FieldType::Int8,
            "uint8_t" => FieldType::UInt8,
            "int16_t" => FieldType::Int16,
            "uint16_t" => FieldType::UInt16,
            "int32_t" => FieldType::Int32,
            "uint32_t" => FieldType::UInt32,
            "int64_t" => FieldType::Int64,
            "uint64_t" => FieldType::UInt64,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "bool" => FieldType::Bool,
            "char" => FieldType::Char,
            other => FieldType::Nested(other.to_string()),
        }
    }

    /// Size in bytes of one element, `None` for nested formats
    pub fn primitive_size(&self) -> Option<usize> {
        match self {
            FieldType::Int8 | FieldType::UInt8 | FieldType::Bool | FieldType::Char => Some(1),
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float => Some(4),
            FieldType::Int64 | FieldType::UInt64 | FieldType::Double => Some(8),
            FieldType::Nested(_) => None,
        }
    }
}

/// Field definition inside a message format
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    /// Element count for `type[n]` fields
    pub array_len: Option<usize>,
}

impl FieldDefinition {
    pub fn is_padding(&self) -> bool {
        self.name.starts_with("_padding")
    }
}

/// Message format announced by an `F` message
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MessageFormat {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
}

impl MessageFormat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}
