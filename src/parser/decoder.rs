use crate::error::{ConvertError, Result};
use crate::parser::stream::PayloadStream;
use crate::types::{FieldDefinition, FieldType, FieldValue, MessageFormat};
use std::collections::HashMap;

// ULog message type tags
pub const MSG_FLAG_BITS: u8 = b'B';
pub const MSG_FORMAT: u8 = b'F';
pub const MSG_INFO: u8 = b'I';
pub const MSG_INFO_MULTIPLE: u8 = b'M';
pub const MSG_PARAMETER: u8 = b'P';
pub const MSG_PARAMETER_DEFAULT: u8 = b'Q';
pub const MSG_ADD_LOGGED: u8 = b'A';
pub const MSG_REMOVE_LOGGED: u8 = b'R';
pub const MSG_DATA: u8 = b'D';
pub const MSG_LOGGING: u8 = b'L';
pub const MSG_LOGGING_TAGGED: u8 = b'C';
pub const MSG_SYNC: u8 = b'S';
pub const MSG_DROPOUT: u8 = b'O';

// Incompatible flag bit 0 of byte 0: appended data sections
pub const INCOMPAT_FLAG_DATA_APPENDED: u8 = 0x01;

// Guards against self-referencing nested formats
const MAX_NESTING_DEPTH: usize = 8;

/// Size in bytes of a complete message of this format
pub fn format_size(
    format: &MessageFormat,
    formats: &HashMap<String, MessageFormat>,
    depth: usize,
) -> Result<usize> {
    format.fields.iter().try_fold(0usize, |total, field| {
        total
            .checked_add(field_size(field, formats, depth)?)
            .ok_or_else(|| size_overflow(&format.name))
    })
}

fn field_size(
    field: &FieldDefinition,
    formats: &HashMap<String, MessageFormat>,
    depth: usize,
) -> Result<usize> {
    let element = match &field.field_type {
        FieldType::Nested(type_name) => {
            format_size(lookup_nested(type_name, formats, depth)?, formats, depth + 1)?
        }
        primitive => primitive.primitive_size().unwrap_or(0),
    };
    element
        .checked_mul(field.array_len.unwrap_or(1))
        .ok_or_else(|| size_overflow(&field.name))
}

fn size_overflow(name: &str) -> ConvertError {
    ConvertError::MalformedLog(format!("size of '{}' overflows", name))
}

fn lookup_nested<'f>(
    type_name: &str,
    formats: &'f HashMap<String, MessageFormat>,
    depth: usize,
) -> Result<&'f MessageFormat> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(ConvertError::MalformedLog(format!(
            "nested type '{}' exceeds maximum nesting depth",
            type_name
        )));
    }
    formats.get(type_name).ok_or_else(|| {
        ConvertError::MalformedLog(format!("unknown nested type '{}'", type_name))
    })
}

/// Decode a data payload into flattened `name`, `name[i]` and `parent.child` fields
///
/// Returns `Ok(false)` when the payload ends before the format is complete;
/// fields decoded up to that point stay in `out`.
pub fn decode_fields(
    stream: &mut PayloadStream,
    format: &MessageFormat,
    formats: &HashMap<String, MessageFormat>,
    prefix: &str,
    out: &mut HashMap<String, FieldValue>,
    depth: usize,
) -> Result<bool> {
    for field in &format.fields {
        let name = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };

        if field.is_padding() {
            let size = field_size(field, formats, depth)?;
            if stream.remaining() < size {
                return Ok(false);
            }
            stream.read_bytes(size)?;
            continue;
        }

        match (&field.field_type, field.array_len) {
            (FieldType::Char, Some(len)) => {
                if stream.remaining() < len {
                    return Ok(false);
                }
                out.insert(name, FieldValue::Text(stream.read_str(len)?));
            }
            (FieldType::Nested(type_name), array_len) => {
                let nested = lookup_nested(type_name, formats, depth)?;
                match array_len {
                    Some(len) => {
                        // Elements without bytes decode to nothing
                        if format_size(nested, formats, depth + 1)? == 0 {
                            continue;
                        }
                        for i in 0..len {
                            let element = format!("{}[{}]", name, i);
                            if !decode_fields(stream, nested, formats, &element, out, depth + 1)? {
                                return Ok(false);
                            }
                        }
                    }
                    None => {
                        if !decode_fields(stream, nested, formats, &name, out, depth + 1)? {
                            return Ok(false);
                        }
                    }
                }
            }
            (primitive, array_len) => {
                let size = primitive.primitive_size().unwrap_or(0);
                match array_len {
                    Some(len) => {
                        for i in 0..len {
                            if stream.remaining() < size {
                                return Ok(false);
                            }
                            out.insert(format!("{}[{}]", name, i), stream.read_primitive(primitive)?);
                        }
                    }
                    None => {
                        if stream.remaining() < size {
                            return Ok(false);
                        }
                        out.insert(name, stream.read_primitive(primitive)?);
                    }
                }
            }
        }
    }

    Ok(true)
}

/// Decode the value part of an `I`/`M` message
///
/// Char arrays become text, scalars their numeric value; other arrays are
/// not kept.
pub fn decode_info_value(field: &FieldDefinition, value: &[u8]) -> Result<Option<FieldValue>> {
    let mut stream = PayloadStream::new(value);
    match (&field.field_type, field.array_len) {
        (FieldType::Char, Some(_)) => Ok(Some(FieldValue::Text(stream.read_rest_str()))),
        (FieldType::Nested(_), _) | (_, Some(_)) => Ok(None),
        (primitive, None) => Ok(Some(stream.read_primitive(primitive)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::header::parse_format_definition;

    fn formats(defs: &[&str]) -> HashMap<String, MessageFormat> {
        defs.iter()
            .map(|d| parse_format_definition(d).unwrap())
            .map(|f| (f.name.clone(), f))
            .collect()
    }

    #[test]
    fn test_decode_arrays_nested_and_padding() {
        let formats = formats(&[
            "wheel:float speed;uint8_t id;",
            "rover:uint64_t timestamp;int16_t[2] gain;wheel[2] wheels;uint8_t[3] _padding0;char[4] tag;",
        ]);
        let rover = &formats["rover"];
        assert_eq!(format_size(rover, &formats, 0).unwrap(), 8 + 4 + 10 + 3 + 4);

        let mut payload = Vec::new();
        payload.extend_from_slice(&42u64.to_le_bytes());
        payload.extend_from_slice(&7i16.to_le_bytes());
        payload.extend_from_slice(&(-7i16).to_le_bytes());
        payload.extend_from_slice(&2.5f32.to_le_bytes());
        payload.push(1);
        payload.extend_from_slice(&0.5f32.to_le_bytes());
        payload.push(2);
        payload.extend_from_slice(&[0, 0, 0]);
        payload.extend_from_slice(b"ok\0\0");

        let mut out = HashMap::new();
        let mut stream = PayloadStream::new(&payload);
        assert!(decode_fields(&mut stream, rover, &formats, "", &mut out, 0).unwrap());

        assert_eq!(out["timestamp"], FieldValue::UInt(42));
        assert_eq!(out["gain[1]"], FieldValue::Int(-7));
        assert_eq!(out["wheels[0].speed"], FieldValue::Float(2.5));
        assert_eq!(out["wheels[1].id"], FieldValue::UInt(2));
        assert_eq!(out["tag"], FieldValue::Text("ok".to_string()));
        assert!(!out.keys().any(|k| k.contains("_padding")));
    }

    #[test]
    fn test_short_payload_keeps_complete_fields() {
        let formats = formats(&["pos:uint64_t timestamp;int32_t lat;int32_t lon;"]);
        let mut payload = Vec::new();
        payload.extend_from_slice(&5u64.to_le_bytes());
        payload.extend_from_slice(&10i32.to_le_bytes());
        payload.extend_from_slice(&[1, 2]);

        let mut out = HashMap::new();
        let mut stream = PayloadStream::new(&payload);
        let complete = decode_fields(&mut stream, &formats["pos"], &formats, "", &mut out, 0).unwrap();

        assert!(!complete);
        assert_eq!(out.len(), 2);
        assert!(!out.contains_key("lon"));
    }

    #[test]
    fn test_self_referencing_format_is_rejected() {
        let formats = formats(&["loop:uint64_t timestamp;loop inner;"]);
        assert!(matches!(
            format_size(&formats["loop"], &formats, 0),
            Err(ConvertError::MalformedLog(_))
        ));
    }

    #[test]
    fn test_oversized_array_is_malformed() {
        let formats = formats(&["t:uint64_t timestamp;uint64_t[2305843009213693952] _padding0;"]);
        assert!(matches!(
            format_size(&formats["t"], &formats, 0),
            Err(ConvertError::MalformedLog(_))
        ));

        let mut out = HashMap::new();
        let payload = 1u64.to_le_bytes();
        let mut stream = PayloadStream::new(&payload);
        assert!(matches!(
            decode_fields(&mut stream, &formats["t"], &formats, "", &mut out, 0),
            Err(ConvertError::MalformedLog(_))
        ));
    }

    #[test]
    fn test_empty_nested_array_is_skipped() {
        let formats = formats(&["e:", "t:uint64_t timestamp;e[4000000000] x;uint8_t id;"]);
        let mut payload = 9u64.to_le_bytes().to_vec();
        payload.push(4);

        let mut out = HashMap::new();
        let mut stream = PayloadStream::new(&payload);
        assert!(decode_fields(&mut stream, &formats["t"], &formats, "", &mut out, 0).unwrap());
        assert_eq!(out["timestamp"], FieldValue::UInt(9));
        assert_eq!(out["id"], FieldValue::UInt(4));
    }

    #[test]
    fn test_decode_info_values() {
        let text_field = FieldDefinition {
            name: "sys_name".into(),
            field_type: FieldType::Char,
            array_len: Some(3),
        };
        assert_eq!(
            decode_info_value(&text_field, b"PX4").unwrap(),
            Some(FieldValue::Text("PX4".into()))
        );

        let int_field = FieldDefinition {
            name: "ver_sw_release".into(),
            field_type: FieldType::UInt32,
            array_len: None,
        };
        assert_eq!(
            decode_info_value(&int_field, &0x010e_00ffu32.to_le_bytes()).unwrap(),
            Some(FieldValue::UInt(0x010e_00ff))
        );
    }
}
