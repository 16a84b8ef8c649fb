//! Navigation session: planner, location tracker and instruction machine
//!
//! The session owns the map and the localizer factory and is the single
//! entry point a UI layer drives: start a route, feed samples (live or from
//! a log), receive [`NavEvent`]s.

use super::machine::{NavEvent, NavMachine};
use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::localization::LocalizerFactory;
use crate::location::{LocationTracker, TrackerEvent, TrackerState};
use crate::replay::SampleSource;
use crate::topo::{
    find_shortest_path_by_name, find_shortest_path_from_location, Hop, Location, PlannedPath,
    TopoMap,
};
use crate::types::SensorSample;
use log::{info, warn};

pub struct NavSession {
    map: TopoMap,
    factory: LocalizerFactory,
    tracker: LocationTracker,
    machine: Option<NavMachine>,
    config: NavConfig,
}

impl NavSession {
    pub fn new(map: TopoMap, config: NavConfig) -> Result<Self> {
        config.validate()?;
        map.validate()?;
        let factory = LocalizerFactory::new(&map, config.clone());
        Ok(Self::with_factory(map, factory))
    }

    /// Session over a pre-configured factory (e.g. with registered model files)
    pub fn with_factory(map: TopoMap, factory: LocalizerFactory) -> Self {
        let config = factory.config().clone();
        Self {
            tracker: LocationTracker::new(config.tracking.clone()),
            map,
            factory,
            machine: None,
            config,
        }
    }

    pub fn map(&self) -> &TopoMap {
        &self.map
    }

    pub fn factory(&self) -> &LocalizerFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut LocalizerFactory {
        &mut self.factory
    }

    pub fn tracker(&self) -> &LocationTracker {
        &self.tracker
    }

    pub fn machine(&self) -> Option<&NavMachine> {
        self.machine.as_ref()
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.tracker.current_location()
    }

    pub fn is_finished(&self) -> bool {
        self.machine.as_ref().map(|m| m.is_finished()).unwrap_or(false)
    }

    /// Plan `from -> to` and start localizing on the route's first edge
    ///
    /// Instructions begin once localization locks; a route that is already
    /// at its destination finishes immediately.
    pub fn start(&mut self, from: &str, to: &str) -> Result<Vec<NavEvent>> {
        let path = find_shortest_path_by_name(&self.map, from, to)?;
        let mut machine = NavMachine::new(&self.map, &path, self.config.navigation.clone())?;
        let route = machine.route_edge_ids(&self.map);
        info!("navigation {} -> {}: {} states", from, to, machine.states().len());

        self.tracker.reset();
        let Some(first_edge) = route.first().cloned() else {
            let events = machine.start();
            self.machine = Some(machine);
            return Ok(events);
        };
        self.tracker.set_preferred_edges(route);
        if let Err(e) = self.tracker.init_localization_on_edge(&self.factory, &first_edge) {
            warn!("edge localizer unavailable ({}), searching the floor", e);
            let floor = route_floor(&self.map, &path)?;
            self.tracker.init_localization(&self.factory, floor)?;
        }
        self.machine = Some(machine);
        Ok(Vec::new())
    }

    /// Explicit floor-wide relocalization
    pub fn relocalize(&mut self, floor: i32) -> Result<()> {
        self.tracker.init_localization(&self.factory, floor)
    }

    pub fn feed(&mut self, sample: &SensorSample) -> Vec<NavEvent> {
        let tracker_events = self.tracker.consume_sample(&self.map, &self.factory, sample);
        let mut out = Vec::new();
        for event in tracker_events {
            route_tracker_event(self.machine.as_mut(), &self.map, event, &mut out);
        }
        if self.is_finished() && *self.tracker.state() != TrackerState::Stopped {
            self.tracker.stop();
        }
        out
    }

    /// Drive the session from `source` until it is exhausted or navigation ends
    pub fn simulate(&mut self, source: &mut impl SampleSource) -> Vec<NavEvent> {
        let mut out = Vec::new();
        while let Some(sample) = source.next_sample() {
            out.extend(self.feed(&sample));
            if self.is_finished() {
                break;
            }
        }
        out
    }

    pub fn stop(&mut self) {
        self.tracker.stop();
        if let Some(machine) = self.machine.as_mut() {
            machine.stop();
        }
    }

    pub fn repeat_instruction(&self) -> Option<NavEvent> {
        self.machine.as_ref()?.repeat_instruction(&self.map)
    }

    pub fn announce_surround_info(&self) -> Option<NavEvent> {
        self.machine.as_ref()?.announce_surround_info()
    }

    pub fn announce_accessibility_info(&self) -> Option<NavEvent> {
        self.machine.as_ref()?.announce_accessibility_info()
    }

    /// Replace the route with one from the current location to `to`
    pub fn replan_from_current(&mut self, to: &str) -> Result<Vec<NavEvent>> {
        let location = self
            .tracker
            .current_location()
            .cloned()
            .ok_or_else(|| NavError::InvalidState("no current location to plan from".to_string()))?;
        let target = self
            .map
            .node_by_name(to)
            .ok_or_else(|| NavError::UnknownLocation(to.to_string()))?;

        let planned = find_shortest_path_from_location(&mut self.map, &location, target)
            .and_then(|path| anchor_on_edge(&self.map, &location, path));
        self.map.clean_temporary_nodes_and_edges();
        let path = planned?;

        let mut machine = NavMachine::new(&self.map, &path, self.config.navigation.clone())?;
        self.tracker.set_preferred_edges(machine.route_edge_ids(&self.map));
        let mut events = machine.start();
        events.extend(machine.check_state_status(&self.map, &location));
        info!("replanned from edge {} to {}", location.edge_id, to);
        self.machine = Some(machine);
        Ok(events)
    }
}

/// Hand one tracker event to the instruction machine
pub(super) fn route_tracker_event(
    machine: Option<&mut NavMachine>,
    map: &TopoMap,
    event: TrackerEvent,
    out: &mut Vec<NavEvent>,
) {
    match event {
        TrackerEvent::Ready(_) => {
            if let Some(machine) = machine {
                out.extend(machine.navigation_ready());
                out.extend(machine.start());
            }
        }
        TrackerEvent::Location(location) => {
            if let Some(machine) = machine {
                out.extend(machine.check_state_status(map, &location));
            }
        }
        TrackerEvent::Lost { reason } => out.push(NavEvent::Lost { reason }),
        TrackerEvent::LowConfidence { seconds } => {
            info!("localization uncertain for {:.1}s", seconds)
        }
        TrackerEvent::EdgeChanged { .. } | TrackerEvent::Orientation(_) => {}
    }
}

/// Start floor of a planned route
pub(super) fn route_floor(map: &TopoMap, path: &PlannedPath) -> Result<i32> {
    path.start()
        .and_then(|n| map.node(n))
        .map(|n| n.floor)
        .ok_or_else(|| NavError::GraphIntegrity("route without start node".to_string()))
}

/// Rewrite a route that starts at a temporary node so it walks the
/// location's real edge instead; the distance then covers the whole edge
pub(super) fn anchor_on_edge(map: &TopoMap, location: &Location, path: PlannedPath) -> Result<PlannedPath> {
    let (edge_idx, edge) = location.edge(map)?;
    if path.nodes.len() < 2 {
        return Err(NavError::InvalidState(
            "route ends at the current location".to_string(),
        ));
    }
    let entry = path.nodes[1];
    let behind = edge.other_node(entry).ok_or_else(|| {
        NavError::GraphIntegrity(format!("route leaves edge {} through a foreign node", edge.id))
    })?;
    let mut nodes = vec![behind];
    nodes.extend_from_slice(&path.nodes[1..]);
    let partial = match path.hops.first() {
        Some(Hop::Edge(e)) => map.edge(*e).map(|e| e.len as f64).unwrap_or(0.0),
        _ => 0.0,
    };
    let mut hops = vec![Hop::Edge(edge_idx)];
    hops.extend_from_slice(&path.hops[1..]);
    Ok(PlannedPath {
        nodes,
        hops,
        distance: path.distance - partial + edge.len as f64,
    })
}
