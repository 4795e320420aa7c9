#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoded value of a single log field
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value, `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::UInt(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(v) => Some(*v),
            FieldValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// True for values decoded from integer fields
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldValue::Int(_) | FieldValue::UInt(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One decoded data message
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogRecord {
    /// Topic name, e.g. `vehicle_global_position`
    pub message_name: String,
    pub multi_id: u8,
    pub timestamp_us: u64,
    pub fields: HashMap<String, FieldValue>,
}

impl LogRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}
