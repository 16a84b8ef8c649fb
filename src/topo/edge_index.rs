use super::{EdgeIdx, TopoMap};
use crate::geometry::Point2D;
use geo::{Coord, EuclideanDistance, LineString, Point};
use rstar::{RTree, RTreeObject, AABB};

/// Edge path with its bounding box, as stored in the R-tree
#[derive(Clone, Debug)]
pub struct SpatialEdge {
    pub edge: EdgeIdx,
    pub edge_id: String,
    pub floor: i32,
    pub line: LineString<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for SpatialEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over edge paths for nearest-edge queries
///
/// Coordinates are plane map units. Edges of every floor share one tree;
/// queries filter by floor.
pub struct EdgeIndex {
    tree: RTree<SpatialEdge>,
    edge_count: usize,
}

impl EdgeIndex {
    pub fn new() -> Self {
        EdgeIndex {
            tree: RTree::new(),
            edge_count: 0,
        }
    }

    /// Index every permanent edge of `map`
    pub fn from_map(map: &TopoMap) -> Self {
        let spatial: Vec<SpatialEdge> = map
            .edges()
            .filter(|(_, e)| !e.temporary)
            .map(|(idx, e)| {
                let line = e.path.to_line_string();
                SpatialEdge {
                    edge: idx,
                    edge_id: e.id.clone(),
                    floor: e.floor,
                    envelope: compute_envelope(&line),
                    line,
                }
            })
            .collect();
        let edge_count = spatial.len();
        EdgeIndex {
            tree: RTree::bulk_load(spatial),
            edge_count,
        }
    }

    /// Edges on `floor` within `max_distance` of `point`, nearest first
    pub fn nearest_edges(&self, floor: i32, point: &Point2D, max_distance: f64) -> Vec<(&SpatialEdge, f64)> {
        let envelope = AABB::from_corners(
            [point.x - max_distance, point.y - max_distance],
            [point.x + max_distance, point.y + max_distance],
        );
        let query = Point::new(point.x, point.y);
        let mut candidates: Vec<(&SpatialEdge, f64)> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|s| s.floor == floor)
            .map(|s| (s, query.euclidean_distance(&s.line)))
            .filter(|(_, d)| *d <= max_distance)
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        candidates
    }

    pub fn nearest_edge(&self, floor: i32, point: &Point2D, max_distance: f64) -> Option<(&SpatialEdge, f64)> {
        self.nearest_edges(floor, point, max_distance).into_iter().next()
    }

    pub fn edges_on_floor(&self, floor: i32) -> impl Iterator<Item = &SpatialEdge> {
        self.tree.iter().filter(move |s| s.floor == floor)
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

impl Default for EdgeIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_envelope(line: &LineString<f64>) -> AABB<[f64; 2]> {
    let coords: Vec<&Coord<f64>> = line.coords().collect();
    if coords.is_empty() {
        return AABB::from_corners([0.0, 0.0], [0.0, 0.0]);
    }
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
    );
    for c in coords {
        min_x = min_x.min(c.x);
        max_x = max_x.max(c.x);
        min_y = min_y.min(c.y);
        max_y = max_y.max(c.y);
    }
    AABB::from_corners([min_x, min_y], [max_x, max_y])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topo::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_index_all_edges() {
        let map = fixtures::corridor_map();
        let index = EdgeIndex::from_map(&map);
        assert_eq!(index.edge_count(), 3);
        assert_eq!(index.edges_on_floor(1).count(), 3);
        assert_eq!(index.edges_on_floor(2).count(), 0);
    }

    #[test]
    fn test_nearest_sorted_and_filtered() {
        let map = fixtures::corridor_map();
        let index = EdgeIndex::from_map(&map);
        let hits = index.nearest_edges(1, &Point2D::new(28.0, 3.0), 5.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.edge_id, "E2");
        assert_relative_eq!(hits[0].1, 2.0);
        assert_eq!(hits[1].0.edge_id, "E1");

        assert!(index.nearest_edge(1, &Point2D::new(15.0, 40.0), 5.0).is_none());
        assert!(index.nearest_edge(2, &Point2D::new(15.0, 0.0), 5.0).is_none());
    }

    #[test]
    fn test_empty_index() {
        let index = EdgeIndex::new();
        assert_eq!(index.edge_count(), 0);
        assert!(index.nearest_edges(1, &Point2D::new(0.0, 0.0), 100.0).is_empty());
    }
}
