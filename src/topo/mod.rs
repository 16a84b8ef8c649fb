//! Topological map model and route planning
//!
//! The map is an arena: layers, nodes and edges live in flat tables owned by
//! [`TopoMap`] and refer to each other through index handles.

pub mod edge;
pub mod edge_index;
pub mod heap;
pub mod location;
pub mod map;
pub mod map_data;
pub mod node;
pub mod planner;

#[cfg(test)]
pub(crate) mod fixtures;

pub use edge::{Edge, EdgeKind};
pub use edge_index::EdgeIndex;
pub use heap::IndexedMinHeap;
pub use location::Location;
pub use map::{Layer, MapUnit, TopoMap};
pub use map_data::{load_map, parse_map_json, EdgeData, LayerData, MapData, NodeData};
pub use node::{Node, NodeEdgeInfo, NodeKind, TransitLink};
pub use planner::{
    find_shortest_path, find_shortest_path_by_name, find_shortest_path_from_location, Hop,
    PlannedPath,
};

use serde::{Deserialize, Serialize};

/// Handle of a node in [`TopoMap`]'s node table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdx(pub usize);

/// Handle of an edge in [`TopoMap`]'s edge table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeIdx(pub usize);

/// Handle of a layer (floor) in [`TopoMap`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerIdx(pub usize);
