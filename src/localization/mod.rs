//! Localizers: sensor samples in, position estimates out
//!
//! The three localizer variants share one capability set behind the
//! [`Localizer`] enum. Each instance owns its particle or fingerprint state
//! and is bound to a single edge (1-D) or floor (2-D).

pub mod beacon;
pub mod factory;
pub mod knn;
pub mod model;
pub mod particle_1d;
pub mod particle_2d;
pub mod result;
mod weights;

pub use beacon::{Beacon, BeaconModel};
pub use factory::{LocalizerFactory, LocalizerOptions};
pub use knn::KnnLocalizer;
pub use model::{Fingerprint, KnnModel};
pub use particle_1d::ParticleFilter1d;
pub use particle_2d::ParticleFilter2d;
pub use result::LocalizeResult;

use crate::geometry::Point2D;
use crate::types::SensorSample;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalizerKind {
    #[serde(rename = "knn_1d")]
    Knn1d,
    #[serde(rename = "particle_filter_1d")]
    ParticleFilter1d,
    #[serde(rename = "particle_filter_2d")]
    ParticleFilter2d,
}

impl LocalizerKind {
    pub fn is_one_dimensional(&self) -> bool {
        !matches!(self, LocalizerKind::ParticleFilter2d)
    }
}

/// How to build the localizer of an edge (or floor)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalizerDescriptor {
    pub id: String,
    pub kind: LocalizerKind,
    /// Fingerprint table (KNN) or beacon layout (particle filters)
    #[serde(default)]
    pub model: Option<PathBuf>,
    /// Floor searched by a 2-D filter
    #[serde(default)]
    pub floor: Option<i32>,
}

#[derive(Clone, Debug)]
pub enum Localizer {
    Knn1d(KnnLocalizer),
    ParticleFilter1d(ParticleFilter1d),
    ParticleFilter2d(ParticleFilter2d),
}

impl Localizer {
    /// Feed one sample; `Some` when the sample produced a new estimate
    pub fn consume_sample(&mut self, sample: &SensorSample) -> Option<LocalizeResult> {
        match self {
            Localizer::Knn1d(l) => l.consume_sample(sample),
            Localizer::ParticleFilter1d(l) => l.consume_sample(sample),
            Localizer::ParticleFilter2d(l) => l.consume_sample(sample),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Localizer::Knn1d(l) => l.reset(),
            Localizer::ParticleFilter1d(l) => l.reset(),
            Localizer::ParticleFilter2d(l) => l.reset(),
        }
    }

    /// Seed the heading (compass degrees) reported until the next inertial reading
    pub fn set_orientation(&mut self, orientation: f64) {
        let heading = orientation.to_radians();
        match self {
            Localizer::Knn1d(l) => l.set_heading(heading),
            Localizer::ParticleFilter1d(l) => l.set_heading(heading),
            Localizer::ParticleFilter2d(l) => l.set_heading(heading),
        }
    }

    /// Concentrate the estimate around a known position (no-op for KNN)
    pub fn focus(&mut self, point: &Point2D, spread: f64) {
        match self {
            Localizer::Knn1d(_) => {}
            Localizer::ParticleFilter1d(l) => l.focus(point, spread),
            Localizer::ParticleFilter2d(l) => l.focus(point, spread),
        }
    }

    pub fn kind(&self) -> LocalizerKind {
        match self {
            Localizer::Knn1d(_) => LocalizerKind::Knn1d,
            Localizer::ParticleFilter1d(_) => LocalizerKind::ParticleFilter1d,
            Localizer::ParticleFilter2d(_) => LocalizerKind::ParticleFilter2d,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Localizer::Knn1d(l) => l.name(),
            Localizer::ParticleFilter1d(l) => l.name(),
            Localizer::ParticleFilter2d(l) => l.name(),
        }
    }

    /// Edge a 1-D localizer is bound to
    pub fn edge_id(&self) -> Option<&str> {
        match self {
            Localizer::Knn1d(l) => Some(l.edge_id()),
            Localizer::ParticleFilter1d(l) => Some(l.edge_id()),
            Localizer::ParticleFilter2d(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_json() {
        let json = r#"{"id": "knn-e1", "kind": "knn_1d", "model": "models/e1.json.gz"}"#;
        let d: LocalizerDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.kind, LocalizerKind::Knn1d);
        assert_eq!(d.model, Some(PathBuf::from("models/e1.json.gz")));
        assert!(d.kind.is_one_dimensional());
        assert!(!LocalizerKind::ParticleFilter2d.is_one_dimensional());
    }
}
