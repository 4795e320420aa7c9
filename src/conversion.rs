//! Unit conversions for position fields
//!
//! GPS topics store latitude/longitude as degrees * 1e7 and altitude in
//! millimeters; fused position topics use floating point degrees and
//! meters. The field kind decides which rule applies.

use crate::types::FieldValue;

/// Raw integer latitude/longitude units per degree
pub const COORDINATE_SCALE: f64 = 10_000_000.0;

/// Raw integer altitude units (millimeters) per meter
pub const ALTITUDE_SCALE: f64 = 1000.0;

/// Convert a latitude or longitude field to degrees
pub fn convert_coordinate(value: &FieldValue) -> Option<f64> {
    let degrees = if value.is_integer() {
        value.as_f64()? / COORDINATE_SCALE
    } else {
        value.as_f64()?
    };
    degrees.is_finite().then_some(degrees)
}

/// Convert an altitude field to meters
pub fn convert_altitude(value: &FieldValue) -> Option<f64> {
    let meters = if value.is_integer() {
        value.as_f64()? / ALTITUDE_SCALE
    } else {
        value.as_f64()?
    };
    meters.is_finite().then_some(meters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_coordinates_are_scaled() {
        let lat = convert_coordinate(&FieldValue::Int(473_977_418)).unwrap();
        assert!((lat - 47.397_741_8).abs() < 1e-9);

        let lon = convert_coordinate(&FieldValue::Int(-1_225_000_000)).unwrap();
        assert!((lon + 122.5).abs() < 1e-9);
    }

    #[test]
    fn test_float_coordinates_pass_through() {
        assert_eq!(convert_coordinate(&FieldValue::Float(8.545_594)), Some(8.545_594));
        assert_eq!(convert_coordinate(&FieldValue::Float(f64::NAN)), None);
        assert_eq!(convert_coordinate(&FieldValue::Text("x".into())), None);
    }

    #[test]
    fn test_altitude_millimeters_to_meters() {
        assert_eq!(convert_altitude(&FieldValue::Int(488_150)), Some(488.15));
        assert_eq!(convert_altitude(&FieldValue::Float(488.5)), Some(488.5));
        assert_eq!(convert_altitude(&FieldValue::Float(f64::INFINITY)), None);
    }
}
