use super::{LayerIdx, Location, NodeIdx, TopoMap};
use crate::geometry::{EdgePath, Point2D};
use crate::localization::LocalizerDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeKind {
    #[default]
    Normal,
    /// Walkable but never part of a planned route
    NonNavigational,
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub id: String,
    pub kind: EdgeKind,
    /// Length in map units, the planner's weight
    pub len: u32,
    /// Walking orientation (degrees) when entering from node1
    pub ori1: f64,
    /// Walking orientation (degrees) when entering from node2
    pub ori2: f64,
    pub min_knn_dist: f64,
    pub max_knn_dist: f64,
    pub node1: NodeIdx,
    pub node2: NodeIdx,
    pub node1_id: String,
    pub node2_id: String,
    pub layer: LayerIdx,
    pub floor: i32,
    /// Spoken when starting to walk from node1
    pub info1: String,
    /// Spoken when starting to walk from node2
    pub info2: String,
    pub path: EdgePath,
    pub localizer: Option<LocalizerDescriptor>,
    pub temporary: bool,
}

impl Edge {
    pub fn is_navigational(&self) -> bool {
        self.kind == EdgeKind::Normal
    }

    pub fn connects(&self, node: NodeIdx) -> bool {
        self.node1 == node || self.node2 == node
    }

    pub fn other_node(&self, node: NodeIdx) -> Option<NodeIdx> {
        if node == self.node1 {
            Some(self.node2)
        } else if node == self.node2 {
            Some(self.node1)
        } else {
            None
        }
    }

    /// Walking orientation when leaving `node` along this edge
    pub fn ori_from_node(&self, node: NodeIdx) -> f64 {
        if node == self.node1 {
            self.ori1
        } else {
            self.ori2
        }
    }

    pub fn info_from_node(&self, node: NodeIdx) -> &str {
        if node == self.node1 {
            &self.info1
        } else {
            &self.info2
        }
    }

    /// Ratio between planner length and geometric path length
    pub fn len_per_path_unit(&self) -> f64 {
        let path_len = self.path.length();
        if path_len > 0.0 {
            self.len as f64 / path_len
        } else {
            1.0
        }
    }

    /// Which endpoint, if any, `location` has reached
    ///
    /// Both the node's confidence threshold and its positional threshold must
    /// hold. When both endpoints qualify the closer one wins.
    pub fn check_valid_end_node_at_location(
        &self,
        map: &TopoMap,
        location: &Location,
    ) -> Option<NodeIdx> {
        let here = Point2D::new(location.x, location.y);
        [self.node1, self.node2]
            .into_iter()
            .filter_map(|idx| {
                let node = map.node(idx)?;
                let dist = node.position_in_edge(&self.id).distance_to(&here);
                let reached = location.knn_dist <= node.knn_dist_threshold
                    && dist <= node.pos_dist_threshold;
                reached.then_some((idx, dist))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }

    /// Copy of this edge under a new id, used for temporary edges
    pub fn clone_as(&self, id: impl Into<String>) -> Edge {
        let id = id.into();
        let mut edge = self.clone();
        edge.path.edge_id = id.clone();
        edge.id = id;
        edge.temporary = true;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topo::fixtures;

    #[test]
    fn test_orientation_and_info_by_direction() {
        let map = fixtures::corridor_map();
        let e1 = map.edge_by_id("E1").and_then(|i| map.edge(i)).unwrap();
        let a = map.node_by_id("A").unwrap();
        let b = map.node_by_id("B").unwrap();
        assert_eq!(e1.ori_from_node(a), 90.0);
        assert_eq!(e1.ori_from_node(b), 270.0);
        assert_eq!(e1.info_from_node(a), "Walk along the main corridor");
        assert_eq!(e1.other_node(a), Some(b));
        assert_eq!(e1.other_node(map.node_by_id("C").unwrap()), None);
    }

    #[test]
    fn test_valid_end_node_requires_both_thresholds() {
        let map = fixtures::corridor_map();
        let e1 = map.edge_by_id("E1").and_then(|i| map.edge(i)).unwrap();
        let b = map.node_by_id("B").unwrap();

        let mut loc = Location::on_edge(e1, 29.0, 0.0, 1.0, 0.0);
        assert_eq!(e1.check_valid_end_node_at_location(&map, &loc), Some(b));

        // confident but too far from the node
        loc.x = 20.0;
        assert_eq!(e1.check_valid_end_node_at_location(&map, &loc), None);

        // close but not confident
        loc.x = 29.0;
        loc.knn_dist = 50.0;
        assert_eq!(e1.check_valid_end_node_at_location(&map, &loc), None);
    }

    #[test]
    fn test_clone_as_is_temporary() {
        let map = fixtures::corridor_map();
        let e1 = map.edge_by_id("E1").and_then(|i| map.edge(i)).unwrap();
        let copy = e1.clone_as("tmp_edge");
        assert!(copy.temporary);
        assert_eq!(copy.path.edge_id, "tmp_edge");
        assert_eq!(copy.len, e1.len);
    }
}
