use crate::error::Result;
use crate::types::{BeaconId, BeaconReading, Vec2};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Installed beacon position
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    pub id: BeaconId,
    pub x: f64,
    pub y: f64,
    pub floor: i32,
}

/// Beacon layout file used by the particle filters
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BeaconModel {
    pub beacons: Vec<Beacon>,
}

impl BeaconModel {
    pub fn load(path: &Path) -> Result<Self> {
        read_json_file(path)
    }
}

/// Read a JSON document, transparently gunzipping `.gz` files
pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?)
    } else {
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Beacon positions of one floor keyed by id
pub(crate) fn beacon_positions(beacons: &[Beacon], floor: i32) -> HashMap<BeaconId, Vec2> {
    beacons
        .iter()
        .filter(|b| b.floor == floor)
        .map(|b| (b.id, Vec2::new(b.x, b.y)))
        .collect()
}

/// Gaussian log-likelihood of the observed beacon ranges at `position`
///
/// Readings without a distance estimate or from unknown beacons are skipped;
/// `None` when nothing usable remains.
pub(crate) fn range_log_likelihood(
    position: Vec2,
    readings: &[BeaconReading],
    beacons: &HashMap<BeaconId, Vec2>,
    sigma: f64,
) -> Option<f64> {
    let mut ll = 0.0;
    let mut used = 0;
    for reading in readings.iter().filter(|r| r.distance >= 0.0) {
        if let Some(beacon) = beacons.get(&reading.id) {
            let predicted = (beacon - position).norm();
            let z = (reading.distance - predicted) / sigma;
            ll -= 0.5 * z * z;
            used += 1;
        }
    }
    (used > 0).then_some(ll)
}
