use super::{EdgeIdx, LayerIdx};
use crate::geometry::Point2D;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeKind {
    #[default]
    Normal,
    DoorTransit,
    StairTransit,
    ElevatorTransit,
    Destination,
}

impl NodeKind {
    /// Nodes through which a floor change may happen
    pub fn is_vertical_transit(&self) -> bool {
        matches!(
            self,
            NodeKind::DoorTransit | NodeKind::StairTransit | NodeKind::ElevatorTransit
        )
    }
}

/// Announcement data attached to a node, as seen when arriving along one edge
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeEdgeInfo {
    /// Spoken when arriving at the node along the edge
    #[serde(default)]
    pub info: String,
    /// Spoken instead of `info` when the node is the destination
    #[serde(default)]
    pub dest_info: String,
    #[serde(default)]
    pub surround_info: String,
    #[serde(default)]
    pub accessibility_info: String,
    /// Node position in the edge's coordinates (falls back to the node position)
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub tricky: bool,
    #[serde(default)]
    pub tricky_info: String,
}

/// Vertical connection to a node on another layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitLink {
    /// Target node id
    pub target: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Announcement, e.g. "Take the elevator to the third floor"
    #[serde(default)]
    pub info: String,
    /// Cost added by the planner for taking this link
    #[serde(default)]
    pub length: f64,
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub building: String,
    pub kind: NodeKind,
    pub position: Point2D,
    pub floor: i32,
    pub layer: LayerIdx,
    /// Confidence distance below which the node counts as passed
    pub knn_dist_threshold: f64,
    /// Positional distance below which the node counts as passed
    pub pos_dist_threshold: f64,
    pub edges: Vec<EdgeIdx>,
    pub edge_info: HashMap<String, NodeEdgeInfo>,
    pub transits: Vec<TransitLink>,
    pub temporary: bool,
}

impl Node {
    pub fn info_from_edge(&self, edge_id: &str) -> Option<&NodeEdgeInfo> {
        self.edge_info.get(edge_id)
    }

    /// Text announced when arriving along `edge_id`
    pub fn info_coming_from_edge(&self, edge_id: &str) -> &str {
        self.edge_info
            .get(edge_id)
            .map(|i| i.info.as_str())
            .unwrap_or("")
    }

    pub fn dest_info_coming_from_edge(&self, edge_id: &str) -> &str {
        self.edge_info
            .get(edge_id)
            .map(|i| i.dest_info.as_str())
            .unwrap_or("")
    }

    /// Position of this node in the coordinates of `edge_id`
    pub fn position_in_edge(&self, edge_id: &str) -> Point2D {
        match self.edge_info.get(edge_id) {
            Some(NodeEdgeInfo {
                x: Some(x),
                y: Some(y),
                ..
            }) => Point2D::new(*x, *y),
            _ => self.position,
        }
    }

    pub fn x_in_edge(&self, edge_id: &str) -> f64 {
        self.position_in_edge(edge_id).x
    }

    pub fn y_in_edge(&self, edge_id: &str) -> f64 {
        self.position_in_edge(edge_id).y
    }

    pub fn is_tricky_coming_from_edge(&self, edge_id: &str) -> bool {
        self.edge_info.get(edge_id).map(|i| i.tricky).unwrap_or(false)
    }

    pub fn tricky_info_coming_from_edge(&self, edge_id: &str) -> &str {
        self.edge_info
            .get(edge_id)
            .map(|i| i.tricky_info.as_str())
            .unwrap_or("")
    }

    pub fn has_transition(&self) -> bool {
        self.kind.is_vertical_transit() && self.transits.iter().any(|t| t.enabled)
    }

    pub fn transit_enabled_to_node(&self, target_id: &str) -> bool {
        self.kind.is_vertical_transit()
            && self
                .transits
                .iter()
                .any(|t| t.enabled && t.target == target_id)
    }

    pub fn transit_info_to_node(&self, target_id: &str) -> Option<&str> {
        self.transits
            .iter()
            .find(|t| t.target == target_id)
            .map(|t| t.info.as_str())
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elevator() -> Node {
        let mut edge_info = HashMap::new();
        edge_info.insert(
            "e1".to_string(),
            NodeEdgeInfo {
                info: "Elevator hall".to_string(),
                x: Some(1.0),
                y: Some(2.0),
                tricky: true,
                tricky_info: "Hall opens to the left".to_string(),
                ..Default::default()
            },
        );
        Node {
            id: "n1".to_string(),
            name: String::new(),
            building: "Main".to_string(),
            kind: NodeKind::ElevatorTransit,
            position: Point2D::new(5.0, 5.0),
            floor: 1,
            layer: LayerIdx(0),
            knn_dist_threshold: 4.0,
            pos_dist_threshold: 3.0,
            edges: vec![],
            edge_info,
            transits: vec![
                TransitLink {
                    target: "n9".to_string(),
                    enabled: true,
                    info: "Take the elevator to floor 2".to_string(),
                    length: 0.0,
                },
                TransitLink {
                    target: "n10".to_string(),
                    enabled: false,
                    info: String::new(),
                    length: 0.0,
                },
            ],
            temporary: false,
        }
    }

    #[test]
    fn test_edge_info_lookup() {
        let node = elevator();
        assert_eq!(node.info_coming_from_edge("e1"), "Elevator hall");
        assert_eq!(node.info_coming_from_edge("e2"), "");
        assert_eq!(node.x_in_edge("e1"), 1.0);
        assert_eq!(node.y_in_edge("e2"), 5.0);
        assert!(node.is_tricky_coming_from_edge("e1"));
        assert_eq!(node.tricky_info_coming_from_edge("e1"), "Hall opens to the left");
        assert_eq!(node.display_name(), "n1");
    }

    #[test]
    fn test_transit_links() {
        let mut node = elevator();
        assert!(node.has_transition());
        assert!(node.transit_enabled_to_node("n9"));
        assert!(!node.transit_enabled_to_node("n10"));
        assert_eq!(node.transit_info_to_node("n9"), Some("Take the elevator to floor 2"));

        node.kind = NodeKind::Normal;
        assert!(!node.transit_enabled_to_node("n9"));
        assert!(!node.has_transition());
    }
}
