//! Particle filter constrained to one edge's walking path
//!
//! Each particle is an arc-length position along the edge. Pedometer steps
//! move particles by the step length projected onto the local segment
//! direction; beacon range readings weight them.

use super::beacon::{beacon_positions, range_log_likelihood, Beacon};
use super::result::LocalizeResult;
use super::weights::{
    apply_log_likelihoods, effective_sample_size, low_variance_indices, weighted_stats,
};
use crate::config::ParticleConfig;
use crate::geometry::{EdgePath, Point2D};
use crate::types::{heading_deg, heading_vector, BeaconId, BeaconScan, InertialReading, SensorSample, Vec2};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ParticleFilter1d {
    name: String,
    path: Arc<EdgePath>,
    beacons: HashMap<BeaconId, Vec2>,
    config: ParticleConfig,
    count: usize,
    rng: StdRng,
    step_noise: Normal<f64>,
    positions: Vec<f64>,
    weights: Vec<f64>,
    heading: f64,
    last_estimate: Option<(f64, f64)>,
}

impl ParticleFilter1d {
    pub fn new(
        name: impl Into<String>,
        path: Arc<EdgePath>,
        beacons: &[Beacon],
        config: &ParticleConfig,
        count: usize,
        rng: StdRng,
    ) -> std::result::Result<Self, String> {
        if !(path.length() > 0.0) {
            return Err(format!("edge {} has no walkable length", path.edge_id));
        }
        let beacons = beacon_positions(beacons, path.floor);
        if beacons.is_empty() {
            return Err(format!("no beacons on floor {}", path.floor));
        }
        let step_noise = Normal::new(0.0, config.step_noise).map_err(|e| e.to_string())?;
        let mut filter = Self {
            name: name.into(),
            path,
            beacons,
            config: config.clone(),
            count: count.max(1),
            rng,
            step_noise,
            positions: Vec::new(),
            weights: Vec::new(),
            heading: 0.0,
            last_estimate: None,
        };
        filter.initialize();
        Ok(filter)
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

    pub fn beacons(&self) -> Vec<Beacon> {
        self.beacons
            .iter()
            .map(|(id, p)| Beacon {
                id: *id,
                x: p.x,
                y: p.y,
                floor: self.path.floor,
            })
            .collect()
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    pub fn particle_count(&self) -> usize {
        self.count
    }

    pub fn rng(&self) -> &StdRng {
        &self.rng
    }

    /// Spread particles uniformly over the edge
    pub fn initialize(&mut self) {
        let len = self.path.length();
        self.positions = (0..self.count).map(|_| self.rng.gen_range(0.0..=len)).collect();
        self.weights = vec![1.0 / self.count as f64; self.count];
        self.last_estimate = None;
    }

    pub fn reset(&mut self) {
        self.initialize();
        self.heading = 0.0;
    }

    /// Compass heading in radians
    pub fn set_heading(&mut self, heading: f64) {
        self.heading = heading;
    }

    /// Concentrate particles around the projection of `point`
    pub fn focus(&mut self, point: &Point2D, spread: f64) {
        let len = self.path.length();
        let center = self.path.arc_position(point);
        match Normal::new(center, spread.max(1e-6)) {
            Ok(dist) => {
                self.positions = (0..self.count)
                    .map(|_| dist.sample(&mut self.rng).clamp(0.0, len))
                    .collect();
                self.weights = vec![1.0 / self.count as f64; self.count];
                self.last_estimate = None;
            }
            Err(e) => warn!("{}: cannot focus particles: {}", self.name, e),
        }
    }

    pub fn consume_sample(&mut self, sample: &SensorSample) -> Option<LocalizeResult> {
        match sample {
            SensorSample::Inertial(reading) => {
                self.predict(reading);
                None
            }
            SensorSample::Beacon(scan) => self.update(scan),
        }
    }

    fn predict(&mut self, reading: &InertialReading) {
        self.heading = reading.heading;
        if !reading.step {
            return;
        }
        let len = self.path.length();
        let walk = heading_vector(reading.heading);
        for i in 0..self.positions.len() {
            let along = self.path.direction_at_arc(self.positions[i]).dot(&walk);
            let stride = self.config.step_length + self.step_noise.sample(&mut self.rng);
            self.positions[i] = (self.positions[i] + stride * along).clamp(0.0, len);
        }
    }

    fn update(&mut self, scan: &BeaconScan) -> Option<LocalizeResult> {
        let sigma = self.config.observation_sigma;
        let mut lls = Vec::with_capacity(self.positions.len());
        for &s in &self.positions {
            let p = self.path.point_at_arc(s).vec();
            lls.push(range_log_likelihood(p, &scan.readings, &self.beacons, sigma)?);
        }
        if !apply_log_likelihoods(&mut self.weights, &lls) {
            warn!("{}: all particles have zero likelihood, keeping weights", self.name);
        }

        let (mean, std) = weighted_stats(&self.positions, &self.weights);
        let neff = effective_sample_size(&self.weights);
        if neff < self.config.resample_threshold * self.count as f64 {
            debug!("{}: resampling (neff {:.1})", self.name, neff);
            self.resample();
        }

        let velocity = match self.last_estimate {
            Some((t, s)) if scan.timestamp > t => (mean - s) / (scan.timestamp - t),
            _ => 0.0,
        };
        self.last_estimate = Some((scan.timestamp, mean));

        let point = self.path.point_at_arc(mean);
        let (ori1, ori2) = self.path.orientation_at(&point);
        Some(LocalizeResult {
            timestamp: scan.timestamp,
            x: point.x,
            y: point.y,
            z: 0.0,
            floor: self.path.floor,
            orientation: heading_deg(self.heading),
            velocity,
            knn_dist: std,
            edge_id: Some(self.path.edge_id.clone()),
            ori1,
            ori2,
        })
    }

    fn resample(&mut self) {
        let len = self.path.length();
        let indices = low_variance_indices(&self.weights, &mut self.rng);
        let jitter = self.config.step_noise * 0.5;
        let mut positions = Vec::with_capacity(indices.len());
        for i in indices {
            let roughened = self.positions[i] + jitter * (self.rng.gen::<f64>() - 0.5);
            positions.push(roughened.clamp(0.0, len));
        }
        self.positions = positions;
        self.weights = vec![1.0 / self.count as f64; self.count];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BeaconReading;
    use rand::SeedableRng;

    fn straight_edge() -> Arc<EdgePath> {
        Arc::new(EdgePath::from_points(
            "E1",
            &[Point2D::new(0.0, 0.0), Point2D::new(60.0, 0.0)],
            90.0,
            270.0,
            1,
        ))
    }

    fn beacons() -> Vec<Beacon> {
        [(1, 0.0, 3.0), (2, 20.0, -3.0), (3, 40.0, 3.0), (4, 60.0, -3.0)]
            .into_iter()
            .map(|(minor, x, y)| Beacon { id: BeaconId::new(1, minor), x, y, floor: 1 })
            .collect()
    }

    fn scan_at(t: f64, x: f64) -> SensorSample {
        let truth = Vec2::new(x, 0.0);
        SensorSample::Beacon(BeaconScan {
            timestamp: t,
            readings: beacons()
                .iter()
                .map(|b| BeaconReading {
                    id: b.id,
                    rssi: -60.0,
                    distance: (Vec2::new(b.x, b.y) - truth).norm(),
                })
                .collect(),
        })
    }

    fn step(t: f64) -> SensorSample {
        SensorSample::Inertial(InertialReading {
            timestamp: t,
            acceleration: [0.0, 0.0, 9.8],
            heading: std::f64::consts::FRAC_PI_2,
            heading_delta: 0.0,
            step: true,
        })
    }

    fn filter(seed: u64) -> ParticleFilter1d {
        let config = ParticleConfig::default();
        ParticleFilter1d::new("pf", straight_edge(), &beacons(), &config, 300, StdRng::seed_from_u64(seed))
            .unwrap()
    }

    #[test]
    fn test_converges_on_synthetic_walk() {
        let mut pf = filter(7);
        let mut truth = 5.0;
        let mut last = None;
        for i in 0..12 {
            let t = i as f64;
            pf.consume_sample(&step(t));
            truth += 2.2;
            last = pf.consume_sample(&scan_at(t + 0.5, truth));
        }
        let result = last.unwrap();
        assert!((result.x - truth).abs() < 2.0, "estimate {} truth {}", result.x, truth);
        assert!(result.knn_dist < 3.0, "posterior spread {}", result.knn_dist);
        assert!(result.velocity > 0.0);
        assert!((result.orientation - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_initial_spread_is_wide() {
        let pf = filter(1);
        let (_, std) = weighted_stats(&pf.positions, &pf.weights);
        assert!(std > 10.0);
    }

    #[test]
    fn test_focus_and_reset() {
        let mut pf = filter(2);
        pf.focus(&Point2D::new(30.0, 1.0), 1.0);
        let (mean, std) = weighted_stats(&pf.positions, &pf.weights);
        assert!((mean - 30.0).abs() < 0.5);
        assert!(std < 1.5);
        pf.reset();
        let (_, std) = weighted_stats(&pf.positions, &pf.weights);
        assert!(std > 10.0);
    }

    #[test]
    fn test_particles_stay_on_edge() {
        let mut pf = filter(3);
        for i in 0..40 {
            pf.consume_sample(&step(i as f64));
        }
        assert!(pf.positions.iter().all(|s| (0.0..=60.0).contains(s)));
    }

    #[test]
    fn test_rejects_edge_without_beacons() {
        let config = ParticleConfig::default();
        let result = ParticleFilter1d::new("pf", straight_edge(), &[], &config, 10, StdRng::seed_from_u64(0));
        assert!(result.is_err());
    }
}
