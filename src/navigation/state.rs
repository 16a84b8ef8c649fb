//! One step of a navigation route
//!
//! A route is a chain of Walking states (follow one edge to its target node)
//! joined by Transition states (turn onto, or ride a vertical transit to, the
//! next edge). States live in the machine's vector and link by index.

use super::instructions::feet_to_meters;
use crate::topo::{EdgeIdx, Location, NodeIdx, TopoMap};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StateKind {
    Walking,
    Transition,
}

#[derive(Clone, Debug, Serialize)]
pub struct NavState {
    pub kind: StateKind,
    /// Edge walked in a Walking state
    pub walking_edge: Option<EdgeIdx>,
    /// Edge a Transition waits to be confirmed on; none for a trailing transit
    pub target_edge: Option<EdgeIdx>,
    pub target_edge_id: Option<String>,
    pub start_node: NodeIdx,
    pub target_node: NodeIdx,
    pub prev: Option<usize>,
    pub next: Option<usize>,

    pub start_info: String,
    pub approaching_info: String,
    pub arrived_info: String,
    /// Action at the target node, used with a live distance ("12 feet to turn left")
    pub next_action_info: String,
    pub surround_info: String,
    pub accessibility_info: String,
    pub tricky_info: String,
    pub is_tricky: bool,
    /// Closest distance to the target node seen so far (map units)
    pub closest_distance: f64,

    /// Expected walking orientation (compass degrees)
    pub ori: f64,
    pub sx: f64,
    pub sy: f64,
    pub tx: f64,
    pub ty: f64,
    pub floor: i32,
    pub is_first: bool,
    pub is_meter: bool,
    pub approach_announced: bool,
    /// Timestamp of the location that started this state
    pub started_at: Option<f64>,
}

impl NavState {
    pub(crate) fn new(kind: StateKind, start_node: NodeIdx, target_node: NodeIdx) -> Self {
        Self {
            kind,
            walking_edge: None,
            target_edge: None,
            target_edge_id: None,
            start_node,
            target_node,
            prev: None,
            next: None,
            start_info: String::new(),
            approaching_info: String::new(),
            arrived_info: String::new(),
            next_action_info: String::new(),
            surround_info: String::new(),
            accessibility_info: String::new(),
            tricky_info: String::new(),
            is_tricky: false,
            closest_distance: f64::INFINITY,
            ori: 0.0,
            sx: 0.0,
            sy: 0.0,
            tx: 0.0,
            ty: 0.0,
            floor: 0,
            is_first: false,
            is_meter: false,
            approach_announced: false,
            started_at: None,
        }
    }

    pub fn is_walking(&self) -> bool {
        self.kind == StateKind::Walking
    }

    pub fn is_meter(&self) -> bool {
        self.is_meter
    }

    pub fn to_meter(&self, feet: f64) -> i64 {
        feet_to_meters(feet)
    }

    /// Walking distance from the start node (map units); 0 off this state's edge
    pub fn start_distance(&self, map: &TopoMap, location: &Location) -> f64 {
        self.distance_to(map, location, self.start_node)
    }

    /// Walking distance to the target node (map units); 0 off this state's edge
    pub fn target_distance(&self, map: &TopoMap, location: &Location) -> f64 {
        self.distance_to(map, location, self.target_node)
    }

    /// Fraction of the edge already walked
    pub fn start_ratio(&self, map: &TopoMap, location: &Location) -> f64 {
        let start = self.start_distance(map, location);
        let total = start + self.target_distance(map, location);
        if total > 0.0 {
            start / total
        } else {
            1.0
        }
    }

    /// Fraction of the edge still ahead
    pub fn target_ratio(&self, map: &TopoMap, location: &Location) -> f64 {
        1.0 - self.start_ratio(map, location)
    }

    fn distance_to(&self, map: &TopoMap, location: &Location, node: NodeIdx) -> f64 {
        location.distance_to_node(map, node).unwrap_or(0.0)
    }

    /// Whether `location` lies on the edge this state walks
    pub fn is_on_walking_edge(&self, map: &TopoMap, location: &Location) -> bool {
        self.walking_edge
            .and_then(|e| map.edge(e))
            .map(|e| e.id == location.edge_id)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topo::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_ratios_along_edge() {
        let map = fixtures::corridor_map();
        let a = map.node_by_id("A").unwrap();
        let b = map.node_by_id("B").unwrap();
        let e1 = map.edge_by_id("E1").unwrap();
        let mut state = NavState::new(StateKind::Walking, a, b);
        state.walking_edge = Some(e1);

        let loc = Location::on_edge(map.edge(e1).unwrap(), 12.0, 0.0, 1.0, 0.0);
        assert!(state.is_on_walking_edge(&map, &loc));
        assert_relative_eq!(state.start_distance(&map, &loc), 12.0, epsilon = 1e-9);
        assert_relative_eq!(state.target_distance(&map, &loc), 18.0, epsilon = 1e-9);
        assert_relative_eq!(state.start_ratio(&map, &loc), 0.4, epsilon = 1e-9);
        assert_relative_eq!(state.target_ratio(&map, &loc), 0.6, epsilon = 1e-9);
        assert_eq!(state.to_meter(100.0), 30);
    }
}
