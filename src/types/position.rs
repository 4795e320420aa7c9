#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Geographic fix derived from a position record
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above mean sea level
    pub altitude: f64,
    pub timestamp_us: u64,
}

/// Coordinate triple read back from a KML document
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KmlCoordinate {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}
