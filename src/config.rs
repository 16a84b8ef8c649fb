//! Configuration loading for the navigation engine
//!
//! Every field has a default so a partial JSON document (or none at all)
//! yields a usable configuration.

use crate::error::{NavError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NavConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub particles: ParticleConfig,
    #[serde(default)]
    pub knn: KnnConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
}

/// Current-location state machine thresholds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Confidence distance (map units) a localizer must stay under to lock an edge
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Consecutive confident samples required before committing (default: 3)
    #[serde(default = "default_sustained_samples")]
    pub sustained_samples: usize,

    /// Seconds of sample time spent Initializing before a low-confidence timeout
    #[serde(default = "default_init_timeout")]
    pub init_timeout_secs: f64,

    /// Samples a candidate edge gets before the next candidate is tried
    #[serde(default = "default_candidate_patience")]
    pub candidate_patience: usize,

    /// Multiple of the node transit radius at which a pending transition is abandoned
    #[serde(default = "default_exit_distance_factor")]
    pub exit_distance_factor: f64,
}

/// Particle filter parameters shared by the 1-D and 2-D variants
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticleConfig {
    #[serde(default = "default_count_1d")]
    pub count_1d: usize,

    #[serde(default = "default_count_2d")]
    pub count_2d: usize,

    /// Resample when Neff / N drops below this ratio
    #[serde(default = "default_resample_threshold")]
    pub resample_threshold: f64,

    /// Stride length in map units
    #[serde(default = "default_step_length")]
    pub step_length: f64,

    /// Standard deviation of the stride (map units)
    #[serde(default = "default_step_noise")]
    pub step_noise: f64,

    /// Standard deviation of a beacon range observation (map units)
    #[serde(default = "default_observation_sigma")]
    pub observation_sigma: f64,

    /// Half width of walkable space around an edge path (map units)
    #[serde(default = "default_corridor_half_width")]
    pub corridor_half_width: f64,

    /// RNG seed; 0 draws from entropy
    #[serde(default)]
    pub seed: u64,
}

/// Fingerprint matching parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnnConfig {
    #[serde(default = "default_k")]
    pub k: usize,

    /// RSSI assumed for beacons absent from a scan
    #[serde(default = "default_missing_rssi")]
    pub missing_rssi: f64,
}

/// Instruction generation parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Distance before the target node at which "approaching" is announced (feet)
    #[serde(default = "default_approach_distance")]
    pub approach_distance: f64,

    /// Distance to the target node that counts as arrival (feet)
    #[serde(default = "default_arrive_distance")]
    pub arrive_distance: f64,

    /// Seconds a transition may wait for edge confirmation before advancing anyway
    #[serde(default = "default_transition_timeout")]
    pub transition_timeout_secs: f64,

    /// Announce distances in meters instead of feet
    #[serde(default)]
    pub use_meters: bool,
}

impl NavConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: NavConfig = serde_json::from_str(&text)
            .map_err(|e| NavError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tracking.sustained_samples == 0 {
            return Err(NavError::Config(
                "tracking.sustained_samples must be at least 1".to_string(),
            ));
        }
        if self.particles.count_1d == 0 || self.particles.count_2d == 0 {
            return Err(NavError::Config(
                "particle counts must be positive".to_string(),
            ));
        }
        if self.knn.k == 0 {
            return Err(NavError::Config("knn.k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.particles.resample_threshold) {
            return Err(NavError::Config(
                "particles.resample_threshold must lie in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            sustained_samples: default_sustained_samples(),
            init_timeout_secs: default_init_timeout(),
            candidate_patience: default_candidate_patience(),
            exit_distance_factor: default_exit_distance_factor(),
        }
    }
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            count_1d: default_count_1d(),
            count_2d: default_count_2d(),
            resample_threshold: default_resample_threshold(),
            step_length: default_step_length(),
            step_noise: default_step_noise(),
            observation_sigma: default_observation_sigma(),
            corridor_half_width: default_corridor_half_width(),
            seed: 0,
        }
    }
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            missing_rssi: default_missing_rssi(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            approach_distance: default_approach_distance(),
            arrive_distance: default_arrive_distance(),
            transition_timeout_secs: default_transition_timeout(),
            use_meters: false,
        }
    }
}

fn default_confidence_threshold() -> f64 {
    8.0
}
fn default_sustained_samples() -> usize {
    3
}
fn default_init_timeout() -> f64 {
    15.0
}
fn default_candidate_patience() -> usize {
    6
}
fn default_exit_distance_factor() -> f64 {
    2.0
}
fn default_count_1d() -> usize {
    300
}
fn default_count_2d() -> usize {
    1000
}
fn default_resample_threshold() -> f64 {
    0.5
}
fn default_step_length() -> f64 {
    2.2
}
fn default_step_noise() -> f64 {
    0.4
}
fn default_observation_sigma() -> f64 {
    3.0
}
fn default_corridor_half_width() -> f64 {
    4.0
}
fn default_k() -> usize {
    3
}
fn default_missing_rssi() -> f64 {
    -100.0
}
fn default_approach_distance() -> f64 {
    20.0
}
fn default_arrive_distance() -> f64 {
    5.0
}
fn default_transition_timeout() -> f64 {
    20.0
}
