//! Position extraction
//!
//! Turns decoded log records into an ordered list of [`PositionFix`] values.
//! Only instance 0 of a position topic is used, and topics are never mixed:
//! the highest-priority topic that yields at least one fix wins.

use crate::conversion::{convert_altitude, convert_coordinate};
use crate::filters::{downsample, is_plausible_position};
use crate::types::{LogRecord, PositionFix};
use crate::Result;
use log::debug;

/// Position topics in order of preference
pub const POSITION_TOPICS: [&str; 3] = [
    "vehicle_global_position",
    "vehicle_gps_position",
    "sensor_gps",
];

/// Options for [`extract_positions`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Topics to read, most preferred first
    pub topics: Vec<String>,
    /// Keep every n-th fix (1 keeps all)
    pub downsample: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            topics: POSITION_TOPICS.iter().map(|t| t.to_string()).collect(),
            downsample: 1,
        }
    }
}

/// Build a fix from a single record
///
/// Returns `None` when latitude or longitude is missing or implausible.
/// A missing altitude is reported as 0 m.
pub fn extract_position_fix(record: &LogRecord) -> Option<PositionFix> {
    let latitude = record.get("lat").and_then(convert_coordinate)?;
    let longitude = record.get("lon").and_then(convert_coordinate)?;
    if !is_plausible_position(latitude, longitude) {
        return None;
    }
    let altitude = record
        .get("alt")
        .and_then(convert_altitude)
        .unwrap_or(0.0);

    Some(PositionFix {
        latitude,
        longitude,
        altitude,
        timestamp_us: record.timestamp_us,
    })
}

/// Consume a record stream and return the chronological track
///
/// Reader errors are propagated. Records that are not usable positions are
/// skipped, as are fixes that would step back in time.
pub fn extract_positions<I>(records: I, options: &ExtractOptions) -> Result<Vec<PositionFix>>
where
    I: IntoIterator<Item = Result<LogRecord>>,
{
    let mut tracks: Vec<Vec<PositionFix>> = vec![Vec::new(); options.topics.len()];
    let mut skipped = 0usize;

    for record in records {
        let record = record?;
        if record.multi_id != 0 {
            continue;
        }
        let Some(topic) = options
            .topics
            .iter()
            .position(|t| *t == record.message_name)
        else {
            continue;
        };

        let track = &mut tracks[topic];
        match extract_position_fix(&record) {
            Some(fix) if track.last().map_or(true, |prev| fix.timestamp_us >= prev.timestamp_us) => {
                track.push(fix);
            }
            _ => skipped += 1,
        }
    }

    let Some((topic, track)) = tracks
        .into_iter()
        .enumerate()
        .find(|(_, track)| !track.is_empty())
    else {
        debug!("No usable position records ({} skipped)", skipped);
        return Ok(Vec::new());
    };

    debug!(
        "Extracted {} fixes from '{}' ({} records skipped)",
        track.len(),
        options.topics[topic],
        skipped
    );

    Ok(downsample(track, options.downsample))
}
