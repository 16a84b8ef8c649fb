//! Serialized map documents
//!
//! `MapData` mirrors the in-memory model one-to-one: layers carry their nodes
//! and edges, beacons are listed per floor. Parsing richer source formats is
//! left to whoever produces these documents.

use super::{MapUnit, NodeEdgeInfo, NodeKind, TopoMap, TransitLink};
use super::EdgeKind;
use crate::error::{NavError, Result};
use crate::geometry::Point2D;
use crate::localization::{Beacon, LocalizerDescriptor};
use flate2::read::GzDecoder;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MapData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub major_id: u16,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub unit: MapUnit,
    pub layers: Vec<LayerData>,
    #[serde(default)]
    pub beacons: Vec<Beacon>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayerData {
    pub id: String,
    pub floor: i32,
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub edges: Vec<EdgeData>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub building: String,
    #[serde(default)]
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default = "default_knn_dist_threshold")]
    pub knn_dist_threshold: f64,
    #[serde(default = "default_pos_dist_threshold")]
    pub pos_dist_threshold: f64,
    /// Keyed by incident edge id
    #[serde(default)]
    pub edge_info: HashMap<String, NodeEdgeInfo>,
    #[serde(default)]
    pub transits: Vec<TransitLink>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EdgeData {
    pub id: String,
    pub node1: String,
    pub node2: String,
    #[serde(default)]
    pub kind: EdgeKind,
    /// Defaults to the rounded path length
    #[serde(default)]
    pub len: Option<u32>,
    /// Defaults to the bearing from the first to the last path point
    #[serde(default)]
    pub ori1: Option<f64>,
    #[serde(default)]
    pub ori2: Option<f64>,
    #[serde(default)]
    pub min_knn_dist: f64,
    #[serde(default)]
    pub max_knn_dist: f64,
    #[serde(default)]
    pub info1: String,
    #[serde(default)]
    pub info2: String,
    /// Full walking path including both endpoints; straight line when empty
    #[serde(default)]
    pub path: Vec<Point2D>,
    #[serde(default)]
    pub localizer: Option<LocalizerDescriptor>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_knn_dist_threshold() -> f64 {
    6.0
}

fn default_pos_dist_threshold() -> f64 {
    4.0
}

impl Default for NodeData {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            building: String::new(),
            kind: NodeKind::Normal,
            x: 0.0,
            y: 0.0,
            lat: None,
            lng: None,
            knn_dist_threshold: default_knn_dist_threshold(),
            pos_dist_threshold: default_pos_dist_threshold(),
            edge_info: HashMap::new(),
            transits: Vec::new(),
        }
    }
}

impl NodeData {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            ..Default::default()
        }
    }
}

impl EdgeData {
    pub fn new(id: impl Into<String>, node1: impl Into<String>, node2: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node1: node1.into(),
            node2: node2.into(),
            ..Default::default()
        }
    }
}

impl TopoMap {
    /// Build a map from a document, enforcing globally unique ids
    pub fn from_data(data: MapData) -> Result<TopoMap> {
        let mut map = TopoMap::new(data.name);
        map.uuid = data.uuid;
        map.major_id = data.major_id;
        map.language = data.language;
        map.unit = data.unit;

        for layer_data in data.layers {
            let layer = map.add_layer(layer_data.id, layer_data.floor)?;
            for node in layer_data.nodes {
                map.add_node(layer, node)?;
            }
            for edge in layer_data.edges {
                map.add_edge(layer, edge)?;
            }
        }
        for beacon in data.beacons {
            map.add_beacon(beacon);
        }
        map.validate()?;
        Ok(map)
    }
}

pub fn parse_map_json(json: &str) -> Result<TopoMap> {
    let data: MapData = serde_json::from_str(json)?;
    TopoMap::from_data(data)
}

/// Load a map document from `.json` or `.json.gz`
pub fn load_map(path: &Path) -> Result<TopoMap> {
    let file = File::open(path)?;
    let data: MapData = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    let map = TopoMap::from_data(data)?;
    info!(
        "loaded map '{}' ({} layers, {} nodes, {} edges)",
        map.name,
        map.layers().len(),
        map.node_count(),
        map.edge_count()
    );
    if map.node_count() == 0 {
        return Err(NavError::GraphIntegrity(format!(
            "{} contains no nodes",
            path.display()
        )));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_MAP: &str = r#"{
        "name": "test building",
        "uuid": "F7826DA6-4FA2-4E98-8024-BC5B71E0893E",
        "major_id": 12,
        "unit": "meter",
        "layers": [
            {
                "id": "L1",
                "floor": 1,
                "nodes": [
                    {"id": "n1", "name": "Entrance", "x": 0.0, "y": 0.0},
                    {"id": "n2", "kind": "ElevatorTransit", "x": 10.0, "y": 0.0,
                     "transits": [{"target": "n3", "info": "Take the elevator to floor 2"}]}
                ],
                "edges": [
                    {"id": "e1", "node1": "n1", "node2": "n2", "info1": "Walk east",
                     "localizer": {"id": "pf-e1", "kind": "particle_filter_1d"}}
                ]
            },
            {
                "id": "L2",
                "floor": 2,
                "nodes": [
                    {"id": "n3", "kind": "ElevatorTransit", "x": 10.0, "y": 0.0,
                     "transits": [{"target": "n2"}]},
                    {"id": "n4", "name": "Office", "x": 10.0, "y": 8.0}
                ],
                "edges": [
                    {"id": "e2", "node1": "n3", "node2": "n4",
                     "path": [{"x": 10.0, "y": 0.0}, {"x": 12.0, "y": 4.0}, {"x": 10.0, "y": 8.0}]}
                ]
            }
        ],
        "beacons": [
            {"id": {"major": 12, "minor": 1}, "x": 5.0, "y": 2.0, "floor": 1}
        ]
    }"#;

    #[test]
    fn test_parse_small_map() {
        let map = parse_map_json(SMALL_MAP).unwrap();
        assert_eq!(map.major_id, 12);
        assert_eq!(map.unit, MapUnit::Meter);
        assert_eq!(map.language, "en");
        assert_eq!(map.node_count(), 4);
        assert_eq!(map.edge_count(), 2);
        assert_eq!(map.beacons_on_floor(1).len(), 1);
        assert!(map.beacons_on_floor(2).is_empty());

        let n2 = map.node(map.node_by_id("n2").unwrap()).unwrap();
        assert!(n2.transit_enabled_to_node("n3"));

        let e1 = map.edge(map.edge_by_id("e1").unwrap()).unwrap();
        assert_eq!(e1.len, 10);
        assert!(e1.localizer.is_some());

        let e2 = map.edge(map.edge_by_id("e2").unwrap()).unwrap();
        assert_eq!(e2.path.segments.len(), 2);
        assert_eq!(e2.floor, 2);
    }

    #[test]
    fn test_duplicate_id_across_layers_rejected() {
        let json = SMALL_MAP.replace(r#""id": "n4""#, r#""id": "n1""#).replace(
            r#""node2": "n4""#,
            r#""node2": "n1""#,
        );
        let err = parse_map_json(&json).unwrap_err();
        assert!(matches!(err, NavError::GraphIntegrity(_)));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(parse_map_json("{\"layers\": 3}"), Err(NavError::Json(_))));
    }

    #[test]
    fn test_missing_map_file() {
        let err = load_map(Path::new("/nonexistent/map.json")).unwrap_err();
        assert!(matches!(err, NavError::Io(_)));
    }
}
