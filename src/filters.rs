//! Filters applied to position fixes before encoding
//!
//! GPS receivers report NaN or zeroed-out coordinates before they have a
//! fix, and high-rate topics produce far more vertices than a map view
//! needs. These helpers keep the track drawable without reordering it.

use crate::types::PositionFix;

/// True when latitude and longitude are finite and inside WGS84 bounds
pub fn is_plausible_position(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// Keep every `step`-th fix, always including the first
///
/// A step of 0 or 1 keeps everything.
pub fn downsample(fixes: Vec<PositionFix>, step: usize) -> Vec<PositionFix> {
    if step <= 1 {
        return fixes;
    }
    fixes.into_iter().step_by(step).collect()
}
