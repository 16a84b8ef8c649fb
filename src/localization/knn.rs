//! Nearest-neighbour fingerprint localizer on a single edge

use super::model::KnnModel;
use super::result::LocalizeResult;
use crate::config::KnnConfig;
use crate::geometry::{EdgePath, Point2D};
use crate::types::{heading_deg, BeaconId, BeaconScan, SensorSample};
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct KnnLocalizer {
    name: String,
    path: Arc<EdgePath>,
    slots: HashMap<BeaconId, usize>,
    signals: Array2<f64>,
    positions: Array2<f64>,
    k: usize,
    missing_rssi: f64,
    heading: f64,
}

impl KnnLocalizer {
    /// Fails when the model does not validate
    pub fn new(
        name: impl Into<String>,
        model: &KnnModel,
        path: Arc<EdgePath>,
        config: &KnnConfig,
    ) -> std::result::Result<Self, String> {
        model.validate()?;
        let (signals, positions) = model.to_arrays();
        let slots = model
            .beacons
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        Ok(Self {
            name: name.into(),
            path,
            slots,
            signals,
            positions,
            k: config.k.max(1),
            missing_rssi: config.missing_rssi,
            heading: 0.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn edge_id(&self) -> &str {
        &self.path.edge_id
    }

    pub fn path(&self) -> &Arc<EdgePath> {
        &self.path
    }

    pub fn reset(&mut self) {
        self.heading = 0.0;
    }

    /// Compass heading in radians
    pub fn set_heading(&mut self, heading: f64) {
        self.heading = heading;
    }

    pub fn consume_sample(&mut self, sample: &SensorSample) -> Option<LocalizeResult> {
        match sample {
            SensorSample::Inertial(reading) => {
                self.heading = reading.heading;
                None
            }
            SensorSample::Beacon(scan) => self.classify(scan),
        }
    }

    fn query_vector(&self, scan: &BeaconScan) -> Option<Array1<f64>> {
        let mut query = Array1::from_elem(self.slots.len(), self.missing_rssi);
        let mut heard = 0;
        for reading in &scan.readings {
            if let Some(&slot) = self.slots.get(&reading.id) {
                query[slot] = reading.rssi;
                heard += 1;
            }
        }
        (heard > 0).then_some(query)
    }

    fn classify(&self, scan: &BeaconScan) -> Option<LocalizeResult> {
        let query = self.query_vector(scan)?;
        let mut ranked: Vec<(usize, f64)> = self
            .signals
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, row)| {
                let diff = &row - &query;
                (i, diff.mapv(|d| d * d).sum().sqrt())
            })
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        let nearest = ranked.first()?.1;
        let k = self.k.min(ranked.len());

        let (mut x, mut y) = (0.0, 0.0);
        for (i, _) in &ranked[..k] {
            x += self.positions[[*i, 0]];
            y += self.positions[[*i, 1]];
        }
        let estimate = Point2D::new(x / k as f64, y / k as f64);
        let on_edge = self.path.nearest_point(&estimate).unwrap_or(estimate);
        let (ori1, ori2) = self.path.orientation_at(&on_edge);

        Some(LocalizeResult {
            timestamp: scan.timestamp,
            x: on_edge.x,
            y: on_edge.y,
            z: 0.0,
            floor: self.path.floor,
            orientation: heading_deg(self.heading),
            velocity: 0.0,
            knn_dist: nearest,
            edge_id: Some(self.path.edge_id.clone()),
            ori1,
            ori2,
        })
    }
}
