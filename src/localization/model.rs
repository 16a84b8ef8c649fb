use super::beacon::read_json_file;
use crate::error::Result;
use crate::types::BeaconId;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One reference signal pattern recorded at a known position
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fingerprint {
    pub x: f64,
    pub y: f64,
    /// RSSI per beacon, in the order of [`KnnModel::beacons`]
    pub rssi: Vec<f64>,
}

/// Fingerprint table of one edge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnnModel {
    pub edge_id: String,
    pub beacons: Vec<BeaconId>,
    pub fingerprints: Vec<Fingerprint>,
}

impl KnnModel {
    /// Load from `.json` or `.json.gz`
    pub fn load(path: &Path) -> Result<Self> {
        read_json_file(path)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.beacons.is_empty() {
            return Err("model lists no beacons".to_string());
        }
        if self.fingerprints.is_empty() {
            return Err("model has no fingerprints".to_string());
        }
        if let Some((i, fp)) = self
            .fingerprints
            .iter()
            .enumerate()
            .find(|(_, fp)| fp.rssi.len() != self.beacons.len())
        {
            return Err(format!(
                "fingerprint {} has {} readings, expected {}",
                i,
                fp.rssi.len(),
                self.beacons.len()
            ));
        }
        Ok(())
    }

    /// (signals, positions): one row per fingerprint
    pub(crate) fn to_arrays(&self) -> (Array2<f64>, Array2<f64>) {
        let n = self.fingerprints.len();
        let m = self.beacons.len();
        let mut signals = Array2::<f64>::zeros((n, m));
        let mut positions = Array2::<f64>::zeros((n, 2));
        for (i, fp) in self.fingerprints.iter().enumerate() {
            signals.row_mut(i).assign(&Array1::from(fp.rssi.clone()));
            positions[[i, 0]] = fp.x;
            positions[[i, 1]] = fp.y;
        }
        (signals, positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> KnnModel {
        KnnModel {
            edge_id: "E1".to_string(),
            beacons: vec![BeaconId::new(1, 1), BeaconId::new(1, 2)],
            fingerprints: vec![
                Fingerprint { x: 0.0, y: 0.0, rssi: vec![-60.0, -80.0] },
                Fingerprint { x: 5.0, y: 0.0, rssi: vec![-70.0, -70.0] },
            ],
        }
    }

    #[test]
    fn test_validate() {
        assert!(model().validate().is_ok());
        let mut bad = model();
        bad.fingerprints[1].rssi.pop();
        assert!(bad.validate().unwrap_err().contains("fingerprint 1"));
        let mut empty = model();
        empty.fingerprints.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_to_arrays() {
        let (signals, positions) = model().to_arrays();
        assert_eq!(signals.dim(), (2, 2));
        assert_eq!(signals[[1, 0]], -70.0);
        assert_eq!(positions[[1, 0]], 5.0);
    }
}
