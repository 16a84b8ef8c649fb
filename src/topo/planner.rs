//! Dijkstra route planning over the topological map
//!
//! Distances and predecessors live in a per-query scratch table, never on the
//! nodes themselves, so concurrent queries against a shared map are safe.

use super::{EdgeIdx, IndexedMinHeap, Location, NodeIdx, TopoMap};
use crate::error::{NavError, Result};
use log::{debug, info};

/// How the route moves from one node to the next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hop {
    Edge(EdgeIdx),
    /// Vertical transit (stairs, elevator, door) between layers
    Transit,
}

#[derive(Clone, Debug)]
pub struct PlannedPath {
    pub nodes: Vec<NodeIdx>,
    /// `hops[i]` connects `nodes[i]` to `nodes[i + 1]`
    pub hops: Vec<Hop>,
    pub distance: f64,
}

impl PlannedPath {
    pub fn edges(&self) -> impl Iterator<Item = EdgeIdx> + '_ {
        self.hops.iter().filter_map(|h| match h {
            Hop::Edge(e) => Some(*e),
            Hop::Transit => None,
        })
    }

    pub fn start(&self) -> Option<NodeIdx> {
        self.nodes.first().copied()
    }

    pub fn destination(&self) -> Option<NodeIdx> {
        self.nodes.last().copied()
    }
}

struct Scratch {
    dist: Vec<f64>,
    prev: Vec<Option<(NodeIdx, Hop)>>,
    done: Vec<bool>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            dist: vec![f64::INFINITY; n],
            prev: vec![None; n],
            done: vec![false; n],
        }
    }
}

/// Neighbours reachable in one hop: navigational edges plus enabled transit links
fn neighbours(map: &TopoMap, node: NodeIdx) -> Result<Vec<(NodeIdx, Hop, f64)>> {
    let current = map
        .node(node)
        .ok_or_else(|| NavError::GraphIntegrity(format!("no node with handle {}", node.0)))?;
    let mut out = Vec::with_capacity(current.edges.len() + current.transits.len());
    for &e in &current.edges {
        let edge = map
            .edge(e)
            .ok_or_else(|| NavError::GraphIntegrity(format!("node {} lists missing edge {}", current.id, e.0)))?;
        if !edge.is_navigational() {
            continue;
        }
        if let Some(other) = edge.other_node(node) {
            out.push((other, Hop::Edge(e), edge.len as f64));
        }
    }
    if current.kind.is_vertical_transit() {
        for link in current.transits.iter().filter(|t| t.enabled) {
            let target = map.node_by_id(&link.target).ok_or_else(|| {
                NavError::GraphIntegrity(format!(
                    "node {} has transit link to missing node {}",
                    current.id, link.target
                ))
            })?;
            out.push((target, Hop::Transit, link.length.max(0.0)));
        }
    }
    Ok(out)
}

/// Shortest route between two nodes
///
/// Floor changes happen only through enabled transit links on vertical
/// transit nodes. Returns `NotReachable` when no route exists.
pub fn find_shortest_path(map: &TopoMap, from: NodeIdx, to: NodeIdx) -> Result<PlannedPath> {
    let n = map.node_count();
    let name = |idx: NodeIdx| -> Result<String> {
        map.node(idx)
            .map(|node| node.id.clone())
            .ok_or_else(|| NavError::GraphIntegrity(format!("no node with handle {}", idx.0)))
    };
    let from_id = name(from)?;
    let to_id = name(to)?;
    debug!("planning {} -> {}", from_id, to_id);

    let mut scratch = Scratch::new(n);
    let mut heap = IndexedMinHeap::with_capacity(n);
    scratch.dist[from.0] = 0.0;
    heap.insert(from.0, 0.0)?;

    while !heap.is_empty() {
        let (u, d) = heap.extract_min()?;
        scratch.done[u] = true;
        if u == to.0 {
            break;
        }
        for (v, hop, w) in neighbours(map, NodeIdx(u))? {
            if scratch.done[v.0] {
                continue;
            }
            let candidate = d + w;
            if candidate < scratch.dist[v.0] {
                scratch.dist[v.0] = candidate;
                scratch.prev[v.0] = Some((NodeIdx(u), hop));
                if heap.contains(v.0) {
                    heap.decrease_key(v.0, candidate)?;
                } else {
                    heap.insert(v.0, candidate)?;
                }
            }
        }
    }

    if !scratch.dist[to.0].is_finite() {
        info!("no route from {} to {}", from_id, to_id);
        return Err(NavError::NotReachable {
            from: from_id,
            to: to_id,
        });
    }

    let mut nodes = vec![to];
    let mut hops = Vec::new();
    let mut cursor = to;
    while let Some((prev, hop)) = scratch.prev[cursor.0] {
        nodes.push(prev);
        hops.push(hop);
        cursor = prev;
    }
    nodes.reverse();
    hops.reverse();

    let distance = scratch.dist[to.0];
    info!(
        "route {} -> {}: {} nodes, distance {:.1}",
        from_id,
        to_id,
        nodes.len(),
        distance
    );
    Ok(PlannedPath {
        nodes,
        hops,
        distance,
    })
}

/// Shortest route between two named locations (names fall back to node ids)
pub fn find_shortest_path_by_name(map: &TopoMap, from: &str, to: &str) -> Result<PlannedPath> {
    let from_idx = map
        .node_by_name(from)
        .ok_or_else(|| NavError::UnknownLocation(from.to_string()))?;
    let to_idx = map
        .node_by_name(to)
        .ok_or_else(|| NavError::UnknownLocation(to.to_string()))?;
    find_shortest_path(map, from_idx, to_idx)
}

/// Shortest route from a live location
///
/// A temporary node is projected onto the location's edge and the route starts
/// there. The caller must call [`TopoMap::clean_temporary_nodes_and_edges`]
/// once done with the returned path; its first node is only valid until then.
pub fn find_shortest_path_from_location(
    map: &mut TopoMap,
    location: &Location,
    to: NodeIdx,
) -> Result<PlannedPath> {
    let (edge, _) = location.edge(map)?;
    let start = map.add_temporary_node_on_edge(edge, location.point())?;
    find_shortest_path(map, start, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topo::fixtures;
    use crate::topo::map_data::{EdgeData, NodeData};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn path_cost(map: &TopoMap, path: &PlannedPath) -> f64 {
        path.hops
            .iter()
            .zip(path.nodes.windows(2))
            .map(|(hop, pair)| match hop {
                Hop::Edge(e) => map.edge(*e).unwrap().len as f64,
                Hop::Transit => {
                    let from = map.node(pair[0]).unwrap();
                    let to_id = &map.node(pair[1]).unwrap().id;
                    from.transits.iter().find(|t| &t.target == to_id).unwrap().length
                }
            })
            .sum()
    }

    /// Exhaustive search over simple paths
    fn brute_force(map: &TopoMap, from: NodeIdx, to: NodeIdx) -> Option<f64> {
        fn walk(
            map: &TopoMap,
            at: NodeIdx,
            to: NodeIdx,
            visited: &mut Vec<bool>,
            cost: f64,
            best: &mut Option<f64>,
        ) {
            if at == to {
                if best.map(|b| cost < b).unwrap_or(true) {
                    *best = Some(cost);
                }
                return;
            }
            for (next, _, w) in neighbours(map, at).unwrap() {
                if !visited[next.0] {
                    visited[next.0] = true;
                    walk(map, next, to, visited, cost + w, best);
                    visited[next.0] = false;
                }
            }
        }
        let mut visited = vec![false; map.node_count()];
        visited[from.0] = true;
        let mut best = None;
        walk(map, from, to, &mut visited, 0.0, &mut best);
        best
    }

    fn random_graph(seed: u64, nodes: usize, edges: usize) -> TopoMap {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut map = TopoMap::new("random");
        let layer = map.add_layer("f", 1).unwrap();
        for i in 0..nodes {
            let x = rng.gen_range(0.0..100.0);
            let y = rng.gen_range(0.0..100.0);
            map.add_node(layer, NodeData::new(format!("n{}", i), x, y)).unwrap();
        }
        for i in 0..edges {
            let a = rng.gen_range(0..nodes);
            let b = rng.gen_range(0..nodes);
            if a == b {
                continue;
            }
            let mut data = EdgeData::new(format!("e{}", i), format!("n{}", a), format!("n{}", b));
            data.len = Some(rng.gen_range(1..50));
            map.add_edge(layer, data).unwrap();
        }
        map
    }

    #[test]
    fn test_corridor_route() {
        let map = fixtures::corridor_map();
        let path = find_shortest_path_by_name(&map, "Lobby", "Library").unwrap();
        let ids: Vec<&str> = path.nodes.iter().map(|n| map.node(*n).unwrap().id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(path.distance, 50.0);
        assert_eq!(path.edges().count(), 2);
    }

    #[test]
    fn test_matches_brute_force_on_random_graphs() {
        for seed in 0..20 {
            let map = random_graph(seed, 8, 14);
            for a in 0..map.node_count() {
                for b in 0..map.node_count() {
                    let (from, to) = (NodeIdx(a), NodeIdx(b));
                    let expected = brute_force(&map, from, to);
                    match find_shortest_path(&map, from, to) {
                        Ok(path) => {
                            assert_eq!(Some(path.distance), expected, "seed {} {}->{}", seed, a, b);
                            assert_eq!(path_cost(&map, &path), path.distance);
                            assert_eq!(path.start(), Some(from));
                            assert_eq!(path.destination(), Some(to));
                        }
                        Err(NavError::NotReachable { .. }) => assert_eq!(expected, None),
                        Err(e) => panic!("unexpected error {}", e),
                    }
                }
            }
        }
    }

    #[test]
    fn test_floor_change_through_transit() {
        let map = fixtures::two_floor_map();
        let path = find_shortest_path_by_name(&map, "A", "F").unwrap();
        assert!(path.hops.contains(&Hop::Transit));
        assert_eq!(path_cost(&map, &path), path.distance);
    }

    #[test]
    fn test_disabled_transit_is_not_reachable() {
        let mut map = fixtures::two_floor_map_with_transit(false);
        let result = find_shortest_path_by_name(&map, "A", "F");
        assert!(matches!(result, Err(NavError::NotReachable { .. })));
        map.clean_temporary_nodes_and_edges();
        // the reverse direction is also blocked
        let result = find_shortest_path_by_name(&map, "F", "A");
        assert!(matches!(result, Err(NavError::NotReachable { .. })));
    }

    #[test]
    fn test_unknown_name() {
        let map = fixtures::corridor_map();
        assert!(matches!(
            find_shortest_path_by_name(&map, "Lobby", "Roof"),
            Err(NavError::UnknownLocation(_))
        ));
    }

    #[test]
    fn test_non_navigational_edges_skipped() {
        let map = fixtures::corridor_map();
        // D is only reachable through the service edge E3
        let result = find_shortest_path_by_name(&map, "A", "D");
        assert!(matches!(result, Err(NavError::NotReachable { .. })));
    }

    #[test]
    fn test_from_location_uses_temporary_node() {
        let mut map = fixtures::corridor_map();
        let e1 = map.edge(map.edge_by_id("E1").unwrap()).unwrap();
        let loc = Location::on_edge(e1, 10.0, 0.0, 1.0, 0.0);
        let c = map.node_by_id("C").unwrap();
        let nodes_before = map.node_count();

        let path = find_shortest_path_from_location(&mut map, &loc, c).unwrap();
        assert_eq!(path.distance, 40.0);
        assert!(map.node(path.nodes[0]).unwrap().temporary);

        map.clean_temporary_nodes_and_edges();
        assert_eq!(map.node_count(), nodes_before);
        // planning again after cleanup works and reuses nothing stale
        let path = find_shortest_path_from_location(&mut map, &loc, c).unwrap();
        assert_eq!(path.distance, 40.0);
        map.clean_temporary_nodes_and_edges();
    }
}
