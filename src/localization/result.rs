use serde::{Deserialize, Serialize};

/// Output of one localizer cycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalizeResult {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    pub floor: i32,
    /// Compass heading in degrees [0, 360)
    pub orientation: f64,
    /// Speed along the estimate's track (map units per second)
    pub velocity: f64,
    /// Confidence distance; smaller is better
    pub knn_dist: f64,
    /// Edge the estimate is scoped to (nearest edge for floor-wide search)
    pub edge_id: Option<String>,
    pub ori1: f64,
    pub ori2: f64,
}

impl LocalizeResult {
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.knn_dist.is_finite() && self.knn_dist <= threshold
    }
}
