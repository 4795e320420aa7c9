use crate::types::FieldValue;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// ULog file header plus the key/value info collected while reading
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UlogHeader {
    pub version: u8,
    /// Log start time in microseconds since boot
    pub timestamp_us: u64,
    pub compat_flags: [u8; 8],
    pub incompat_flags: [u8; 8],
    /// `I` and `M` messages, keyed by field name (e.g. `sys_name`)
    pub info: HashMap<String, FieldValue>,
}

impl UlogHeader {
    pub fn info_text(&self, key: &str) -> Option<&str> {
        self.info.get(key).and_then(FieldValue::as_text)
    }
}

/// Counters gathered during a single pass over a log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReaderStats {
    pub messages: u64,
    pub data_records: u64,
    /// Messages consumed and discarded (unknown tags, unsubscribed ids, ...)
    pub skipped_messages: u64,
    pub dropouts: u64,
    pub dropout_ms: u64,
}
