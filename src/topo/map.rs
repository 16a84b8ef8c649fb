use super::map_data::{EdgeData, NodeData};
use super::{Edge, EdgeIdx, LayerIdx, Node, NodeIdx};
use crate::error::{NavError, Result};
use crate::geometry::{EdgePath, Point2D};
use crate::localization::Beacon;
use crate::types::{bearing_deg, wrap_deg};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const FEET_PER_METER: f64 = 3.28084;

/// Native distance unit of a map's coordinates and edge lengths
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapUnit {
    #[default]
    Feet,
    Meter,
}

/// All nodes and edges of one floor
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: String,
    pub floor: i32,
    pub nodes: Vec<NodeIdx>,
    pub edges: Vec<EdgeIdx>,
    node_ids: HashMap<String, NodeIdx>,
    edge_ids: HashMap<String, EdgeIdx>,
}

/// Topological indoor map
///
/// Node and edge ids are unique across the whole map, so lookup by id alone
/// is never ambiguous. Temporary nodes and edges (synthesized for one-off
/// queries) always sit at the tail of the tables until
/// [`TopoMap::clean_temporary_nodes_and_edges`] drops them.
#[derive(Clone, Debug, Default)]
pub struct TopoMap {
    pub name: String,
    /// Beacon proximity UUID namespace
    pub uuid: String,
    pub major_id: u16,
    pub language: String,
    pub unit: MapUnit,
    layers: Vec<Layer>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    layer_lookup: HashMap<String, LayerIdx>,
    node_lookup: HashMap<String, NodeIdx>,
    edge_lookup: HashMap<String, EdgeIdx>,
    beacons: Vec<Beacon>,
    temp_counter: usize,
}

impl TopoMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: "en".to_string(),
            ..Default::default()
        }
    }

    pub fn add_layer(&mut self, id: impl Into<String>, floor: i32) -> Result<LayerIdx> {
        let id = id.into();
        if self.layer_lookup.contains_key(&id) {
            return Err(NavError::GraphIntegrity(format!("duplicate layer id {}", id)));
        }
        let idx = LayerIdx(self.layers.len());
        self.layer_lookup.insert(id.clone(), idx);
        self.layers.push(Layer {
            id,
            floor,
            nodes: Vec::new(),
            edges: Vec::new(),
            node_ids: HashMap::new(),
            edge_ids: HashMap::new(),
        });
        Ok(idx)
    }

    pub fn add_node(&mut self, layer: LayerIdx, data: NodeData) -> Result<NodeIdx> {
        self.ensure_no_temporaries()?;
        self.push_node(layer, data, false)
    }

    pub fn add_edge(&mut self, layer: LayerIdx, data: EdgeData) -> Result<EdgeIdx> {
        self.ensure_no_temporaries()?;
        let floor = self.layer_ref(layer)?.floor;
        let node1 = self.resolve_endpoint(layer, &data.id, &data.node1)?;
        let node2 = self.resolve_endpoint(layer, &data.id, &data.node2)?;

        let mut points = data.path.clone();
        if points.len() < 2 {
            points = vec![self.nodes[node1.0].position, self.nodes[node2.0].position];
        }
        let ori1 = data.ori1.unwrap_or_else(|| {
            bearing_deg(points[0].vec(), points[points.len() - 1].vec())
        });
        let ori2 = data.ori2.unwrap_or(wrap_deg(ori1 + 180.0));
        let path = EdgePath::from_points(data.id.clone(), &points, ori1, ori2, floor);
        let len = data.len.unwrap_or_else(|| path.length().round() as u32);

        let edge = Edge {
            id: data.id,
            kind: data.kind,
            len,
            ori1,
            ori2,
            min_knn_dist: data.min_knn_dist,
            max_knn_dist: data.max_knn_dist,
            node1,
            node2,
            node1_id: data.node1,
            node2_id: data.node2,
            layer,
            floor,
            info1: data.info1,
            info2: data.info2,
            path,
            localizer: data.localizer,
            temporary: false,
        };
        self.push_edge(edge)
    }

    pub fn add_beacon(&mut self, beacon: Beacon) {
        self.beacons.push(beacon);
    }

    pub fn beacons(&self) -> &[Beacon] {
        &self.beacons
    }

    pub fn beacons_on_floor(&self, floor: i32) -> Vec<Beacon> {
        self.beacons.iter().filter(|b| b.floor == floor).cloned().collect()
    }

    pub fn layer(&self, idx: LayerIdx) -> Option<&Layer> {
        self.layers.get(idx.0)
    }

    pub fn node(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx.0)
    }

    pub fn edge(&self, idx: EdgeIdx) -> Option<&Edge> {
        self.edges.get(idx.0)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeIdx(i), n))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIdx, &Edge)> {
        self.edges.iter().enumerate().map(|(i, e)| (EdgeIdx(i), e))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn layer_by_id(&self, id: &str) -> Option<LayerIdx> {
        self.layer_lookup.get(id).copied()
    }

    pub fn layer_for_floor(&self, floor: i32) -> Option<LayerIdx> {
        self.layers
            .iter()
            .position(|l| l.floor == floor)
            .map(LayerIdx)
    }

    pub fn node_in_layer(&self, layer: LayerIdx, id: &str) -> Option<NodeIdx> {
        self.layer(layer)?.node_ids.get(id).copied()
    }

    pub fn edge_in_layer(&self, layer: LayerIdx, id: &str) -> Option<EdgeIdx> {
        self.layer(layer)?.edge_ids.get(id).copied()
    }

    pub fn node_by_id(&self, id: &str) -> Option<NodeIdx> {
        self.node_lookup.get(id).copied()
    }

    pub fn edge_by_id(&self, id: &str) -> Option<EdgeIdx> {
        self.edge_lookup.get(id).copied()
    }

    /// Resolve a user-facing location name, falling back to the node id
    pub fn node_by_name(&self, name: &str) -> Option<NodeIdx> {
        self.nodes
            .iter()
            .position(|n| !n.temporary && n.name == name)
            .map(NodeIdx)
            .or_else(|| self.node_by_id(name))
    }

    pub fn edges_on_floor(&self, floor: i32) -> impl Iterator<Item = (EdgeIdx, &Edge)> {
        self.edges().filter(move |(_, e)| e.floor == floor)
    }

    pub fn connecting_edges(&self, node: NodeIdx) -> &[EdgeIdx] {
        self.node(node).map(|n| n.edges.as_slice()).unwrap_or(&[])
    }

    pub fn edge_between(&self, a: NodeIdx, b: NodeIdx) -> Option<EdgeIdx> {
        self.connecting_edges(a)
            .iter()
            .copied()
            .find(|&e| self.edges[e.0].other_node(a) == Some(b))
    }

    pub fn unit_to_feet(&self, value: f64) -> f64 {
        match self.unit {
            MapUnit::Feet => value,
            MapUnit::Meter => value * FEET_PER_METER,
        }
    }

    pub fn feet_to_unit(&self, value: f64) -> f64 {
        match self.unit {
            MapUnit::Feet => value,
            MapUnit::Meter => value / FEET_PER_METER,
        }
    }

    pub fn unit_to_meter(&self, value: f64) -> f64 {
        match self.unit {
            MapUnit::Feet => value / FEET_PER_METER,
            MapUnit::Meter => value,
        }
    }

    pub fn meter_to_unit(&self, value: f64) -> f64 {
        match self.unit {
            MapUnit::Feet => value * FEET_PER_METER,
            MapUnit::Meter => value,
        }
    }

    /// Names of all named locations, in map order or sorted
    pub fn all_location_names(&self, sorted: bool) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for node in self.nodes.iter().filter(|n| !n.temporary && !n.name.is_empty()) {
            if !names.contains(&node.name) {
                names.push(node.name.clone());
            }
        }
        if sorted {
            names.sort();
        }
        names
    }

    /// Check cross references that cannot be checked while nodes are still being added
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            for link in &node.transits {
                let target = self.node_by_id(&link.target).ok_or_else(|| {
                    NavError::GraphIntegrity(format!(
                        "node {} has transit link to missing node {}",
                        node.id, link.target
                    ))
                })?;
                if !link.enabled {
                    continue;
                }
                if !node.kind.is_vertical_transit() {
                    return Err(NavError::GraphIntegrity(format!(
                        "node {} is not a transit node but links to {}",
                        node.id, link.target
                    )));
                }
                if self.nodes[target.0].floor == node.floor {
                    return Err(NavError::GraphIntegrity(format!(
                        "transit link {} -> {} stays on floor {}",
                        node.id, link.target, node.floor
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn has_temporaries(&self) -> bool {
        self.nodes.last().map(|n| n.temporary).unwrap_or(false)
            || self.edges.last().map(|e| e.temporary).unwrap_or(false)
    }

    /// Split `edge` at the projection of `point` with a temporary node
    ///
    /// Two temporary edges connect the new node to the edge's endpoints. The
    /// returned handle is valid until [`TopoMap::clean_temporary_nodes_and_edges`].
    pub fn add_temporary_node_on_edge(&mut self, edge: EdgeIdx, point: Point2D) -> Result<NodeIdx> {
        let base = self
            .edge(edge)
            .cloned()
            .ok_or_else(|| NavError::GraphIntegrity(format!("no edge with handle {}", edge.0)))?;
        let arc = base.path.arc_position(&point);
        let total = base.path.length();
        let foot = base.path.nearest_point(&point).unwrap_or(point);
        let scale = base.len_per_path_unit();

        self.temp_counter += 1;
        let node_id = format!("__tmp_node_{}", self.temp_counter);
        let template = &self.nodes[base.node1.0];
        let data = NodeData {
            id: node_id.clone(),
            x: foot.x,
            y: foot.y,
            lat: foot.lat,
            lng: foot.lng,
            knn_dist_threshold: template.knn_dist_threshold,
            pos_dist_threshold: template.pos_dist_threshold,
            ..NodeData::default()
        };
        let tmp = self.push_node(base.layer, data, true)?;

        let halves = [
            (base.node1, base.path.slice("", arc, 0.0), arc),
            (base.node2, base.path.slice("", arc, total), total - arc),
        ];
        for (n, (end, path, length)) in halves.into_iter().enumerate() {
            let mut half = base.clone_as(format!("__tmp_edge_{}_{}", self.temp_counter, n));
            let end_id = self.nodes[end.0].id.clone();
            half.path = EdgePath::new(half.id.clone(), path.segments, base.floor);
            half.len = (length * scale).round() as u32;
            half.node1 = tmp;
            half.node1_id = node_id.clone();
            half.node2 = end;
            half.node2_id = end_id;
            if end == base.node1 {
                half.ori1 = base.ori2;
                half.ori2 = base.ori1;
                half.info1 = base.info2.clone();
                half.info2 = base.info1.clone();
            }
            self.push_edge(half)?;
        }
        Ok(tmp)
    }

    /// Drop every temporary node and edge and unlink them from permanent nodes
    pub fn clean_temporary_nodes_and_edges(&mut self) {
        let keep_nodes = self.nodes.iter().take_while(|n| !n.temporary).count();
        let keep_edges = self.edges.iter().take_while(|e| !e.temporary).count();
        if keep_nodes == self.nodes.len() && keep_edges == self.edges.len() {
            return;
        }
        for node in self.nodes.drain(keep_nodes..) {
            self.node_lookup.remove(&node.id);
            if let Some(layer) = self.layers.get_mut(node.layer.0) {
                layer.node_ids.remove(&node.id);
                layer.nodes.retain(|n| n.0 < keep_nodes);
            }
        }
        for edge in self.edges.drain(keep_edges..) {
            self.edge_lookup.remove(&edge.id);
            if let Some(layer) = self.layers.get_mut(edge.layer.0) {
                layer.edge_ids.remove(&edge.id);
                layer.edges.retain(|e| e.0 < keep_edges);
            }
        }
        for node in &mut self.nodes {
            node.edges.retain(|e| e.0 < keep_edges);
        }
        debug!(
            "cleaned temporaries, {} nodes and {} edges remain",
            keep_nodes, keep_edges
        );
    }

    fn ensure_no_temporaries(&self) -> Result<()> {
        if self.has_temporaries() {
            return Err(NavError::InvalidState(
                "clean temporary nodes and edges before extending the map".to_string(),
            ));
        }
        Ok(())
    }

    fn layer_ref(&self, layer: LayerIdx) -> Result<&Layer> {
        self.layer(layer)
            .ok_or_else(|| NavError::GraphIntegrity(format!("no layer with handle {}", layer.0)))
    }

    fn resolve_endpoint(&self, layer: LayerIdx, edge_id: &str, node_id: &str) -> Result<NodeIdx> {
        self.node_in_layer(layer, node_id).ok_or_else(|| {
            NavError::GraphIntegrity(format!(
                "edge {} references node {} which is not on layer {}",
                edge_id,
                node_id,
                self.layers[layer.0].id
            ))
        })
    }

    fn push_node(&mut self, layer: LayerIdx, data: NodeData, temporary: bool) -> Result<NodeIdx> {
        let floor = self.layer_ref(layer)?.floor;
        if self.node_lookup.contains_key(&data.id) {
            return Err(NavError::GraphIntegrity(format!("duplicate node id {}", data.id)));
        }
        let idx = NodeIdx(self.nodes.len());
        let position = match (data.lat, data.lng) {
            (Some(lat), Some(lng)) => Point2D::with_geo(data.x, data.y, lat, lng),
            _ => Point2D::new(data.x, data.y),
        };
        self.node_lookup.insert(data.id.clone(), idx);
        let l = &mut self.layers[layer.0];
        l.node_ids.insert(data.id.clone(), idx);
        l.nodes.push(idx);
        self.nodes.push(Node {
            id: data.id,
            name: data.name,
            building: data.building,
            kind: data.kind,
            position,
            floor,
            layer,
            knn_dist_threshold: data.knn_dist_threshold,
            pos_dist_threshold: data.pos_dist_threshold,
            edges: Vec::new(),
            edge_info: data.edge_info,
            transits: data.transits,
            temporary,
        });
        Ok(idx)
    }

    fn push_edge(&mut self, edge: Edge) -> Result<EdgeIdx> {
        if self.edge_lookup.contains_key(&edge.id) {
            return Err(NavError::GraphIntegrity(format!("duplicate edge id {}", edge.id)));
        }
        let idx = EdgeIdx(self.edges.len());
        self.edge_lookup.insert(edge.id.clone(), idx);
        let l = &mut self.layers[edge.layer.0];
        l.edge_ids.insert(edge.id.clone(), idx);
        l.edges.push(idx);
        self.nodes[edge.node1.0].edges.push(idx);
        if edge.node2 != edge.node1 {
            self.nodes[edge.node2.0].edges.push(idx);
        }
        self.edges.push(edge);
        Ok(idx)
    }
}
