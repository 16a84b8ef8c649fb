use super::{Edge, EdgeIdx, NodeIdx, TopoMap};
use crate::error::{NavError, Result};
use crate::geometry::Point2D;
use serde::{Deserialize, Serialize};

/// Position snapshot on one edge
///
/// A new `Location` is produced every localization cycle; consumers never
/// mutate one in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub timestamp: f64,
    pub edge_id: String,
    pub floor: i32,
    /// Position on the edge path in map coordinates
    pub x: f64,
    pub y: f64,
    /// Localization confidence distance (smaller is better)
    pub knn_dist: f64,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Edge orientations (degrees) walking from node1 and from node2
    pub ori1: f64,
    pub ori2: f64,
    /// Estimated user heading (compass degrees)
    pub orientation: f64,
}

impl Location {
    /// Location on `edge` at the projection of (x, y)
    pub fn on_edge(edge: &Edge, x: f64, y: f64, knn_dist: f64, timestamp: f64) -> Self {
        let foot = edge
            .path
            .nearest_point(&Point2D::new(x, y))
            .unwrap_or(Point2D::new(x, y));
        Self {
            timestamp,
            edge_id: edge.id.clone(),
            floor: edge.floor,
            x: foot.x,
            y: foot.y,
            knn_dist,
            lat: foot.lat,
            lng: foot.lng,
            ori1: edge.ori1,
            ori2: edge.ori2,
            orientation: edge.ori1,
        }
    }

    pub fn point(&self) -> Point2D {
        Point2D {
            x: self.x,
            y: self.y,
            lat: self.lat,
            lng: self.lng,
        }
    }

    pub fn edge<'m>(&self, map: &'m TopoMap) -> Result<(EdgeIdx, &'m Edge)> {
        let idx = map
            .edge_by_id(&self.edge_id)
            .ok_or_else(|| NavError::UnknownLocation(format!("edge {}", self.edge_id)))?;
        let edge = map
            .edge(idx)
            .ok_or_else(|| NavError::GraphIntegrity(format!("edge {}", self.edge_id)))?;
        Ok((idx, edge))
    }

    fn endpoint<'m>(&self, map: &'m TopoMap, node: NodeIdx) -> Result<(&'m Edge, Point2D)> {
        let (_, edge) = self.edge(map)?;
        if !edge.connects(node) {
            return Err(NavError::InvalidState(format!(
                "node {} is not an endpoint of edge {}",
                node.0, edge.id
            )));
        }
        let target = map
            .node(node)
            .ok_or_else(|| NavError::GraphIntegrity(format!("no node with handle {}", node.0)))?;
        Ok((edge, target.position_in_edge(&edge.id)))
    }

    /// Walking distance along the current edge to one of its endpoints
    pub fn distance_to_node(&self, map: &TopoMap, node: NodeIdx) -> Result<f64> {
        let (edge, target) = self.endpoint(map, node)?;
        Ok(edge.path.distance_between(&self.point(), &target))
    }

    /// Polyline from this location to an endpoint of its edge
    pub fn path_to_node(&self, map: &TopoMap, node: NodeIdx) -> Result<Vec<Point2D>> {
        let (edge, target) = self.endpoint(map, node)?;
        Ok(edge.path.path_between(&self.point(), &target))
    }

    /// Polyline from an endpoint of the current edge to this location
    pub fn path_from_node(&self, map: &TopoMap, node: NodeIdx) -> Result<Vec<Point2D>> {
        let (edge, source) = self.endpoint(map, node)?;
        Ok(edge.path.path_between(&source, &self.point()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topo::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_on_edge_projects() {
        let map = fixtures::corridor_map();
        let e1 = map.edge(map.edge_by_id("E1").unwrap()).unwrap();
        let loc = Location::on_edge(e1, 12.0, 3.0, 2.0, 1.0);
        assert_relative_eq!(loc.x, 12.0);
        assert_relative_eq!(loc.y, 0.0);
        assert_eq!(loc.floor, 1);
        assert_eq!(loc.edge_id, "E1");
    }

    #[test]
    fn test_distance_and_paths_to_endpoints() {
        let map = fixtures::corridor_map();
        let e1 = map.edge(map.edge_by_id("E1").unwrap()).unwrap();
        let a = map.node_by_id("A").unwrap();
        let b = map.node_by_id("B").unwrap();
        let loc = Location::on_edge(e1, 12.0, 0.0, 2.0, 1.0);

        assert_relative_eq!(loc.distance_to_node(&map, a).unwrap(), 12.0);
        assert_relative_eq!(loc.distance_to_node(&map, b).unwrap(), 18.0);

        let to_b = loc.path_to_node(&map, b).unwrap();
        assert_relative_eq!(to_b.last().unwrap().x, 30.0);
        let from_a = loc.path_from_node(&map, a).unwrap();
        assert_relative_eq!(from_a[0].x, 0.0);
        assert_relative_eq!(from_a.last().unwrap().x, 12.0);
    }

    #[test]
    fn test_non_endpoint_and_unknown_edge() {
        let map = fixtures::corridor_map();
        let e1 = map.edge(map.edge_by_id("E1").unwrap()).unwrap();
        let loc = Location::on_edge(e1, 12.0, 0.0, 2.0, 1.0);
        let c = map.node_by_id("C").unwrap();
        assert!(matches!(loc.distance_to_node(&map, c), Err(NavError::InvalidState(_))));

        let mut lost = loc.clone();
        lost.edge_id = "nope".to_string();
        assert!(matches!(lost.edge(&map), Err(NavError::UnknownLocation(_))));
    }
}
