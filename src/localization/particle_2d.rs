//! Floor-wide particle filter used before an edge is identified
//!
//! Particles roam the walkable corridors of one floor: everything within
//! `corridor_half_width` of an edge path. Particles pushed outside the
//! corridors lose almost all of their weight.

use super::beacon::{beacon_positions, range_log_likelihood, Beacon};
use super::result::LocalizeResult;
use super::weights::{
    apply_log_likelihoods, effective_sample_size, low_variance_indices, normalize,
    weighted_stats,
};
use crate::config::ParticleConfig;
use crate::geometry::{EdgePath, Point2D};
use crate::topo::EdgeIndex;
use crate::types::{heading_deg, heading_vector, BeaconId, BeaconScan, InertialReading, SensorSample, Vec2};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use std::sync::Arc;

const OFF_CORRIDOR_WEIGHT: f64 = 1e-4;

#[derive(Clone)]
pub struct ParticleFilter2d {
    name: String,
    floor: i32,
    paths: Vec<Arc<EdgePath>>,
    index: Arc<EdgeIndex>,
    beacons: HashMap<BeaconId, Vec2>,
    config: ParticleConfig,
    count: usize,
    rng: StdRng,
    step_noise: Normal<f64>,
    particles: Vec<Vec2>,
    weights: Vec<f64>,
    heading: f64,
    last_estimate: Option<(f64, Vec2)>,
}

impl ParticleFilter2d {
    pub fn new(
        name: impl Into<String>,
        floor: i32,
        paths: Vec<Arc<EdgePath>>,
        index: Arc<EdgeIndex>,
        beacons: &[Beacon],
        config: &ParticleConfig,
        count: usize,
        rng: StdRng,
    ) -> std::result::Result<Self, String> {
        let paths: Vec<Arc<EdgePath>> = paths
            .into_iter()
            .filter(|p| p.floor == floor && p.length() > 0.0)
            .collect();
        if paths.is_empty() {
            return Err(format!("floor {} has no walkable edges", floor));
        }
        let beacons = beacon_positions(beacons, floor);
        if beacons.is_empty() {
            return Err(format!("no beacons on floor {}", floor));
        }
        let step_noise = Normal::new(0.0, config.step_noise).map_err(|e| e.to_string())?;
        let mut filter = Self {
            name: name.into(),
            floor,
            paths,
            index,
            beacons,
            config: config.clone(),
            count: count.max(1),
            rng,
            step_noise,
            particles: Vec::new(),
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

    pub fn floor(&self) -> i32 {
        self.floor
    }

    /// Spread particles over all corridors, proportionally to edge length
    pub fn initialize(&mut self) {
        let total: f64 = self.paths.iter().map(|p| p.length()).sum();
        let half_width = self.config.corridor_half_width;
        let mut particles = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            let mut pick = self.rng.gen_range(0.0..total);
            let mut chosen = &self.paths[self.paths.len() - 1];
            for path in &self.paths {
                if pick < path.length() {
                    chosen = path;
                    break;
                }
                pick -= path.length();
            }
            let arc = self.rng.gen_range(0.0..=chosen.length());
            let dir = chosen.direction_at_arc(arc);
            let normal = Vec2::new(-dir.y, dir.x);
            let offset = self.rng.gen_range(-half_width..=half_width);
            particles.push(chosen.point_at_arc(arc).vec() + normal * offset);
        }
        self.particles = particles;
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

    pub fn focus(&mut self, point: &Point2D, spread: f64) {
        let center = point.vec();
        match Normal::new(0.0, spread.max(1e-6)) {
            Ok(dist) => {
                self.particles = (0..self.count)
                    .map(|_| center + Vec2::new(dist.sample(&mut self.rng), dist.sample(&mut self.rng)))
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

    fn in_corridor(&self, p: &Vec2) -> bool {
        self.index
            .nearest_edge(self.floor, &Point2D::new(p.x, p.y), self.config.corridor_half_width)
            .is_some()
    }

    fn predict(&mut self, reading: &InertialReading) {
        self.heading = reading.heading;
        if !reading.step {
            return;
        }
        let walk = heading_vector(reading.heading);
        for i in 0..self.particles.len() {
            let stride = self.config.step_length + self.step_noise.sample(&mut self.rng);
            self.particles[i] += walk * stride;
            if !self.in_corridor(&self.particles[i]) {
                self.weights[i] *= OFF_CORRIDOR_WEIGHT;
            }
        }
        if !normalize(&mut self.weights) {
            warn!("{}: every particle left the corridors, reinitializing", self.name);
            self.initialize();
        }
    }

    fn update(&mut self, scan: &BeaconScan) -> Option<LocalizeResult> {
        let sigma = self.config.observation_sigma;
        let mut lls = Vec::with_capacity(self.particles.len());
        for p in &self.particles {
            lls.push(range_log_likelihood(*p, &scan.readings, &self.beacons, sigma)?);
        }
        if !apply_log_likelihoods(&mut self.weights, &lls) {
            warn!("{}: all particles have zero likelihood, keeping weights", self.name);
        }

        let xs: Vec<f64> = self.particles.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = self.particles.iter().map(|p| p.y).collect();
        let (mx, sx) = weighted_stats(&xs, &self.weights);
        let (my, sy) = weighted_stats(&ys, &self.weights);
        let mean = Vec2::new(mx, my);
        let spread = (sx * sx + sy * sy).sqrt();

        let neff = effective_sample_size(&self.weights);
        if neff < self.config.resample_threshold * self.count as f64 {
            debug!("{}: resampling (neff {:.1})", self.name, neff);
            self.resample();
        }

        let velocity = match self.last_estimate {
            Some((t, prev)) if scan.timestamp > t => (mean - prev).norm() / (scan.timestamp - t),
            _ => 0.0,
        };
        self.last_estimate = Some((scan.timestamp, mean));

        let point = Point2D::new(mx, my);
        let nearest = self
            .index
            .nearest_edge(self.floor, &point, 2.0 * self.config.corridor_half_width)
            .map(|(edge, _)| edge.edge_id.clone());
        let (ori1, ori2) = nearest
            .as_ref()
            .and_then(|id| self.paths.iter().find(|p| &p.edge_id == id))
            .map(|p| p.orientation_at(&point))
            .unwrap_or((0.0, 0.0));

        Some(LocalizeResult {
            timestamp: scan.timestamp,
            x: mx,
            y: my,
            z: 0.0,
            floor: self.floor,
            orientation: heading_deg(self.heading),
            velocity,
            knn_dist: spread,
            edge_id: nearest,
            ori1,
            ori2,
        })
    }

    fn resample(&mut self) {
        let indices = low_variance_indices(&self.weights, &mut self.rng);
        let jitter = self.config.step_noise * 0.5;
        let mut particles = Vec::with_capacity(indices.len());
        for i in indices {
            let dx = jitter * (self.rng.gen::<f64>() - 0.5);
            let dy = jitter * (self.rng.gen::<f64>() - 0.5);
            particles.push(self.particles[i] + Vec2::new(dx, dy));
        }
        self.particles = particles;
        self.weights = vec![1.0 / self.count as f64; self.count];
    }

    /// Edges holding the most particle mass, heaviest first
    pub fn candidate_edges(&self, max: usize) -> Vec<(String, f64)> {
        let mut mass: HashMap<String, f64> = HashMap::new();
        for (p, w) in self.particles.iter().zip(&self.weights) {
            let hit = self.index.nearest_edge(
                self.floor,
                &Point2D::new(p.x, p.y),
                self.config.corridor_half_width,
            );
            if let Some((edge, _)) = hit {
                *mass.entry(edge.edge_id.clone()).or_insert(0.0) += w;
            }
        }
        let mut ranked: Vec<(String, f64)> = mass.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max);
        ranked
    }
}

impl std::fmt::Debug for ParticleFilter2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleFilter2d")
            .field("name", &self.name)
            .field("floor", &self.floor)
            .field("particles", &self.particles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topo::fixtures;
    use crate::types::BeaconReading;
    use rand::SeedableRng;

    fn filter(seed: u64) -> ParticleFilter2d {
        let map = fixtures::corridor_map();
        let paths = map.edges().map(|(_, e)| Arc::new(e.path.clone())).collect();
        let index = Arc::new(EdgeIndex::from_map(&map));
        ParticleFilter2d::new(
            "pf2d",
            1,
            paths,
            index,
            map.beacons(),
            &ParticleConfig::default(),
            1000,
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    fn scan_at(t: f64, x: f64, y: f64) -> SensorSample {
        let map = fixtures::corridor_map();
        let truth = Vec2::new(x, y);
        SensorSample::Beacon(BeaconScan {
            timestamp: t,
            readings: map
                .beacons()
                .iter()
                .map(|b| BeaconReading {
                    id: b.id,
                    rssi: -60.0,
                    distance: (Vec2::new(b.x, b.y) - truth).norm(),
                })
                .collect(),
        })
    }

    #[test]
    fn test_initial_particles_in_corridors() {
        let pf = filter(5);
        assert!(pf.particles.iter().all(|p| pf.in_corridor(p)));
    }

    #[test]
    fn test_identifies_edge_from_scans() {
        let mut pf = filter(9);
        let mut result = None;
        for i in 0..5 {
            result = pf.consume_sample(&scan_at(i as f64, 30.0, 12.0));
        }
        let result = result.unwrap();
        assert_eq!(result.edge_id.as_deref(), Some("E2"));
        assert!((result.y - 12.0).abs() < 2.5, "y estimate {}", result.y);
        let candidates = pf.candidate_edges(2);
        assert_eq!(candidates[0].0, "E2");
    }

    #[test]
    fn test_wrong_floor_rejected() {
        let map = fixtures::corridor_map();
        let paths = map.edges().map(|(_, e)| Arc::new(e.path.clone())).collect();
        let index = Arc::new(EdgeIndex::from_map(&map));
        let result = ParticleFilter2d::new(
            "pf2d",
            3,
            paths,
            index,
            map.beacons(),
            &ParticleConfig::default(),
            100,
            StdRng::seed_from_u64(0),
        );
        assert!(result.is_err());
    }
}
