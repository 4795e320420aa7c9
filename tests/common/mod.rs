//! Shared helpers for building synthetic ULog files

#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const GPS_FORMAT: &str =
    "vehicle_gps_position:uint64_t timestamp;int32_t lat;int32_t lon;int32_t alt;uint8_t fix_type;uint8_t[3] _padding0;";
pub const BATTERY_FORMAT: &str = "battery_status:uint64_t timestamp;float voltage_v;float current_a;";

pub const GPS_MSG_ID: u16 = 1;
pub const GPS_SECOND_INSTANCE_ID: u16 = 2;
pub const BATTERY_MSG_ID: u16 = 3;

/// Byte-level ULog writer
pub struct UlogBuilder {
    bytes: Vec<u8>,
}

impl UlogBuilder {
    pub fn new() -> Self {
        let mut bytes = vec![0x55, 0x4C, 0x6F, 0x67, 0x01, 0x12, 0x35, 0x01];
        bytes.extend_from_slice(&1_000u64.to_le_bytes());
        Self { bytes }
    }

    pub fn raw(&mut self, msg_type: u8, payload: &[u8]) -> &mut Self {
        self.bytes
            .extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.bytes.push(msg_type);
        self.bytes.extend_from_slice(payload);
        self
    }

    pub fn format(&mut self, definition: &str) -> &mut Self {
        self.raw(b'F', definition.as_bytes())
    }

    pub fn subscribe(&mut self, multi_id: u8, msg_id: u16, name: &str) -> &mut Self {
        let mut payload = vec![multi_id];
        payload.extend_from_slice(&msg_id.to_le_bytes());
        payload.extend_from_slice(name.as_bytes());
        self.raw(b'A', &payload)
    }

    pub fn data(&mut self, msg_id: u16, body: &[u8]) -> &mut Self {
        let mut payload = msg_id.to_le_bytes().to_vec();
        payload.extend_from_slice(body);
        self.raw(b'D', &payload)
    }

    pub fn gps(&mut self, msg_id: u16, timestamp_us: u64, lat: f64, lon: f64, alt_m: f64) -> &mut Self {
        let mut body = timestamp_us.to_le_bytes().to_vec();
        body.extend_from_slice(&((lat * 1e7).round() as i32).to_le_bytes());
        body.extend_from_slice(&((lon * 1e7).round() as i32).to_le_bytes());
        body.extend_from_slice(&((alt_m * 1000.0).round() as i32).to_le_bytes());
        body.push(3);
        body.extend_from_slice(&[0; 3]);
        self.data(msg_id, &body)
    }

    /// A GPS record cut off after the latitude
    pub fn gps_without_lon(&mut self, msg_id: u16, timestamp_us: u64, lat: f64) -> &mut Self {
        let mut body = timestamp_us.to_le_bytes().to_vec();
        body.extend_from_slice(&((lat * 1e7).round() as i32).to_le_bytes());
        self.data(msg_id, &body)
    }

    pub fn battery(&mut self, timestamp_us: u64, voltage: f32) -> &mut Self {
        let mut body = timestamp_us.to_le_bytes().to_vec();
        body.extend_from_slice(&voltage.to_le_bytes());
        body.extend_from_slice(&1.5f32.to_le_bytes());
        self.data(BATTERY_MSG_ID, &body)
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn write_to(&self, path: &Path) -> PathBuf {
        std::fs::write(path, &self.bytes).expect("Failed to write ULog fixture");
        path.to_path_buf()
    }
}

/// The `i`-th point of the synthetic flight
pub fn track_point(i: usize) -> (f64, f64, f64) {
    (
        47.397_742 + i as f64 * 1e-5,
        8.545_594 + i as f64 * 2e-5,
        488.0 + i as f64 * 0.25,
    )
}

/// A log with `fixes` GPS records interleaved with `noise` irrelevant ones:
/// battery records and a second GPS instance
pub fn flight_log(fixes: usize, noise: usize) -> UlogBuilder {
    let mut log = UlogBuilder::new();
    log.format(GPS_FORMAT)
        .format(BATTERY_FORMAT)
        .subscribe(0, GPS_MSG_ID, "vehicle_gps_position")
        .subscribe(1, GPS_SECOND_INSTANCE_ID, "vehicle_gps_position")
        .subscribe(0, BATTERY_MSG_ID, "battery_status");

    let total = fixes.max(noise);
    let mut noise_left = noise;
    for i in 0..total {
        let timestamp = 1_000_000 + i as u64 * 100_000;
        if i < fixes {
            let (lat, lon, alt) = track_point(i);
            log.gps(GPS_MSG_ID, timestamp, lat, lon, alt);
        }
        if noise_left > 0 {
            if noise_left % 2 == 0 {
                log.battery(timestamp + 10, 16.4);
            } else {
                log.gps(GPS_SECOND_INSTANCE_ID, timestamp + 20, -33.0, 151.0, 10.0);
            }
            noise_left -= 1;
        }
    }
    log
}

/// A log with `fixes` good GPS records and `damaged` bad ones in between:
/// truncated payloads, out-of-range coordinates, data for unknown ids and
/// records with a timestamp older than the previous fix
pub fn damaged_flight_log(fixes: usize, damaged: usize) -> UlogBuilder {
    let mut log = UlogBuilder::new();
    log.format(GPS_FORMAT)
        .subscribe(0, GPS_MSG_ID, "vehicle_gps_position");

    for i in 0..fixes.max(damaged) {
        let timestamp = 1_000_000 + i as u64 * 100_000;
        if i < fixes {
            let (lat, lon, alt) = track_point(i);
            log.gps(GPS_MSG_ID, timestamp, lat, lon, alt);
        }
        if i < damaged {
            match i % 4 {
                0 => log.gps_without_lon(GPS_MSG_ID, timestamp + 10, 47.0),
                1 => log.gps(GPS_MSG_ID, timestamp + 10, 95.0, 8.5, 400.0),
                2 => log.data(77, &[0xde, 0xad, 0xbe, 0xef]),
                _ => log.gps(GPS_MSG_ID, 10, 47.0, 8.5, 400.0),
            };
        }
    }
    log
}

/// A log with no position topic at all
pub fn battery_only_log(records: usize) -> UlogBuilder {
    let mut log = UlogBuilder::new();
    log.format(BATTERY_FORMAT)
        .subscribe(0, BATTERY_MSG_ID, "battery_status");
    for i in 0..records {
        log.battery(1_000_000 + i as u64 * 100_000, 16.0);
    }
    log
}

/// External converter arguments running `script` through `sh -c` with
/// `$1` = input and `$2` = output
pub fn sh_args(script: &str) -> Vec<String> {
    vec![
        "-c".to_string(),
        script.to_string(),
        "sh".to_string(),
        "{input}".to_string(),
        "{output}".to_string(),
    ]
}

/// Names of the entries in `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to list dir")
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
