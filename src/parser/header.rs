use crate::error::{ConvertError, Result};
use crate::types::{FieldDefinition, FieldType, MessageFormat};

/// Parse an `F` message body such as
/// `vehicle_global_position:uint64_t timestamp;double lat;double lon;float alt;`
pub fn parse_format_definition(text: &str) -> Result<MessageFormat> {
    let (name, body) = text.split_once(':').ok_or_else(|| {
        ConvertError::MalformedLog(format!("format definition without ':' - {:?}", text))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ConvertError::MalformedLog(
            "format definition with empty message name".into(),
        ));
    }

    let mut format = MessageFormat::new(name);
    for spec in body.split(';') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        format.fields.push(parse_field_spec(spec)?);
    }

    Ok(format)
}

/// Parse a single `type name` or `type[n] name` declaration
pub fn parse_field_spec(spec: &str) -> Result<FieldDefinition> {
    let (type_part, name) = spec
        .trim()
        .split_once(' ')
        .ok_or_else(|| ConvertError::MalformedLog(format!("field without a name - {:?}", spec)))?;

    let (type_name, array_len) = match type_part.split_once('[') {
        Some((base, rest)) => {
            let len = rest
                .strip_suffix(']')
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| {
                    ConvertError::MalformedLog(format!("bad array length in {:?}", type_part))
                })?;
            (base, Some(len))
        }
        None => (type_part, None),
    };

    Ok(FieldDefinition {
        name: name.trim().to_string(),
        field_type: FieldType::from_name(type_name),
        array_len,
    })
}
