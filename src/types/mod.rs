pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Beacon identity within the map's proximity UUID namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeaconId {
    pub major: u16,
    pub minor: u16,
}

impl BeaconId {
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// One beacon heard during a scan
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconReading {
    pub id: BeaconId,
    pub rssi: f64,
    /// Estimated distance to the beacon in map units (negative if unknown)
    pub distance: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconScan {
    pub timestamp: f64,
    pub readings: Vec<BeaconReading>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InertialReading {
    pub timestamp: f64,
    /// Device acceleration (x, y, z) in m/s²
    #[serde(default)]
    pub acceleration: [f64; 3],
    /// Compass heading in the map plane (radians, clockwise from +y)
    pub heading: f64,
    /// Heading change since the previous reading (radians)
    #[serde(default)]
    pub heading_delta: f64,
    /// A pedometer step was detected with this reading
    #[serde(default)]
    pub step: bool,
}

/// A timestamped sensor sample, live or replayed from a log
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorSample {
    Beacon(BeaconScan),
    Inertial(InertialReading),
}

impl SensorSample {
    pub fn timestamp(&self) -> f64 {
        match self {
            SensorSample::Beacon(scan) => scan.timestamp,
            SensorSample::Inertial(reading) => reading.timestamp,
        }
    }

    pub fn is_beacon(&self) -> bool {
        matches!(self, SensorSample::Beacon(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_tagged_json() {
        let json = r#"{"type": "inertial", "timestamp": 1.5, "heading": 0.25, "step": true}"#;
        let sample: SensorSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.timestamp(), 1.5);
        match sample {
            SensorSample::Inertial(r) => {
                assert!(r.step);
                assert_eq!(r.heading_delta, 0.0);
            }
            SensorSample::Beacon(_) => panic!("expected inertial sample"),
        }
    }

    #[test]
    fn test_beacon_scan_json() {
        let json = r#"{"type": "beacon", "timestamp": 2.0,
            "readings": [{"id": {"major": 1, "minor": 7}, "rssi": -71.0, "distance": 3.5}]}"#;
        let sample: SensorSample = serde_json::from_str(json).unwrap();
        assert!(sample.is_beacon());
        if let SensorSample::Beacon(scan) = sample {
            assert_eq!(scan.readings[0].id, BeaconId::new(1, 7));
        }
    }
}
