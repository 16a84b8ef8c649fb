//! Small hand-built maps shared by unit tests

use super::map_data::{EdgeData, NodeData};
use super::{EdgeKind, NodeKind, TopoMap, TransitLink};
use crate::localization::Beacon;
use crate::types::BeaconId;

/// One floor: Lobby(A) -E1- Cafe(B) -E2- Library(C), plus a service edge A -E3- D
///
/// ```text
///            C (30,20)
///            |
///            E2
///            |
/// A ---E1--- B
/// (0,0)      (30,0)
/// |
/// E3 (non-navigational)
/// |
/// D (0,-10)
/// ```
pub(crate) fn corridor_map() -> TopoMap {
    let mut map = TopoMap::new("corridor");
    map.major_id = 7;
    let layer = map.add_layer("floor1", 1).unwrap();

    let mut a = NodeData::new("A", 0.0, 0.0);
    a.name = "Lobby".to_string();
    let mut b = NodeData::new("B", 30.0, 0.0);
    b.name = "Cafe".to_string();
    b.edge_info.insert(
        "E1".to_string(),
        super::NodeEdgeInfo {
            info: "You are at the cafe".to_string(),
            surround_info: "The cafe is on your right".to_string(),
            accessibility_info: "Automatic door".to_string(),
            ..Default::default()
        },
    );
    let mut c = NodeData::new("C", 30.0, 20.0);
    c.name = "Library".to_string();
    c.kind = NodeKind::Destination;
    c.edge_info.insert(
        "E2".to_string(),
        super::NodeEdgeInfo {
            dest_info: "The library entrance is in front of you".to_string(),
            ..Default::default()
        },
    );
    let d = NodeData::new("D", 0.0, -10.0);
    for node in [a, b, c, d] {
        map.add_node(layer, node).unwrap();
    }

    let mut e1 = EdgeData::new("E1", "A", "B");
    e1.info1 = "Walk along the main corridor".to_string();
    e1.max_knn_dist = 10.0;
    let mut e2 = EdgeData::new("E2", "B", "C");
    e2.info1 = "Walk towards the library".to_string();
    let mut e3 = EdgeData::new("E3", "A", "D");
    e3.kind = EdgeKind::NonNavigational;
    for edge in [e1, e2, e3] {
        map.add_edge(layer, edge).unwrap();
    }

    for (minor, x, y) in [(1, 0.0, 3.0), (2, 15.0, -3.0), (3, 30.0, 3.0), (4, 33.0, 12.0), (5, 27.0, 20.0)] {
        map.add_beacon(Beacon {
            id: BeaconId::new(7, minor),
            x,
            y,
            floor: 1,
        });
    }
    map
}

/// Two floors joined by an elevator: A -E1- B ~elevator~ G -E3- F
pub(crate) fn two_floor_map_with_transit(enabled: bool) -> TopoMap {
    let mut map = TopoMap::new("two floors");
    let f1 = map.add_layer("floor1", 1).unwrap();
    let f2 = map.add_layer("floor2", 2).unwrap();

    let link = |target: &str| TransitLink {
        target: target.to_string(),
        enabled,
        info: format!("Take the elevator to {}", target),
        length: 5.0,
    };

    map.add_node(f1, NodeData::new("A", 0.0, 0.0)).unwrap();
    let mut b = NodeData::new("B", 20.0, 0.0);
    b.kind = NodeKind::ElevatorTransit;
    b.transits.push(link("G"));
    map.add_node(f1, b).unwrap();

    let mut g = NodeData::new("G", 20.0, 0.0);
    g.kind = NodeKind::ElevatorTransit;
    g.transits.push(link("B"));
    map.add_node(f2, g).unwrap();
    let mut f = NodeData::new("F", 20.0, 15.0);
    f.name = "Office".to_string();
    map.add_node(f2, f).unwrap();

    map.add_edge(f1, EdgeData::new("E1", "A", "B")).unwrap();
    map.add_edge(f2, EdgeData::new("E3", "G", "F")).unwrap();
    map.validate().unwrap();
    map
}

pub(crate) fn two_floor_map() -> TopoMap {
    two_floor_map_with_transit(true)
}
