//! Current-location state machine
//!
//! ```text
//! Idle -> Initializing(floor | edge) -> Tracking(edge)
//!                                        |        ^
//!                                        v        |
//!                          TransitioningCandidate(candidates)
//! any -> Stopped
//! ```
//!
//! The tracker is synchronous: the caller feeds samples and receives the
//! resulting events. At most two localizers run at once (the primary plus one
//! candidate while a transition is pending).

use crate::config::TrackingConfig;
use crate::error::{NavError, Result};
use crate::localization::{LocalizeResult, Localizer, LocalizerFactory};
use crate::topo::{EdgeIdx, Location, NodeIdx, TopoMap};
use crate::types::{heading_deg, wrap_deg, SensorSample};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Floor-wide 2-D search
    Floor(i32),
    /// 1-D localizer locked to a hinted edge
    Edge(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrackerState {
    Idle,
    Initializing {
        mode: SearchMode,
        since: Option<f64>,
    },
    Tracking {
        edge_id: String,
    },
    TransitioningCandidate {
        from_edge: String,
        node: NodeIdx,
        candidates: Vec<String>,
        current: usize,
    },
    Stopped,
}

impl TrackerState {
    pub fn name(&self) -> &'static str {
        match self {
            TrackerState::Idle => "idle",
            TrackerState::Initializing { .. } => "initializing",
            TrackerState::Tracking { .. } => "tracking",
            TrackerState::TransitioningCandidate { .. } => "transitioning",
            TrackerState::Stopped => "stopped",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationUpdate {
    pub timestamp: f64,
    /// Compass heading in degrees [0, 360)
    pub orientation: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    Location(Location),
    Orientation(OrientationUpdate),
    EdgeChanged {
        from: Option<String>,
        to: String,
        timestamp: f64,
    },
    /// First lock after initialization
    Ready(Location),
    LowConfidence {
        seconds: f64,
    },
    Lost {
        reason: String,
    },
}

pub struct LocationTracker {
    config: TrackingConfig,
    state: TrackerState,
    primary: Option<Localizer>,
    candidate: Option<Localizer>,
    streak: usize,
    candidate_samples: usize,
    ready_sent: bool,
    current: Option<Location>,
    latest_by_edge: HashMap<String, Location>,
    preferred_edges: Vec<String>,
    /// Latest known heading (compass degrees), handed to every new localizer
    orientation: Option<f64>,
}

impl LocationTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            state: TrackerState::Idle,
            primary: None,
            candidate: None,
            streak: 0,
            candidate_samples: 0,
            ready_sent: false,
            current: None,
            latest_by_edge: HashMap::new(),
            preferred_edges: Vec::new(),
            orientation: None,
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Edges tried first when several candidates follow a node (e.g. the planned route)
    pub fn set_preferred_edges(&mut self, edges: Vec<String>) {
        self.preferred_edges = edges;
    }

    pub fn active_localizers(&self) -> usize {
        self.primary.is_some() as usize + self.candidate.is_some() as usize
    }

    /// Start a floor-wide search; on failure the tracker stays where it was
    pub fn init_localization(&mut self, factory: &LocalizerFactory, floor: i32) -> Result<()> {
        let localizer = factory.create_pf_2d_on_floor(floor)?;
        self.begin(localizer, SearchMode::Floor(floor));
        Ok(())
    }

    /// Start with a 1-D localizer locked to `edge_id`
    pub fn init_localization_on_edge(&mut self, factory: &LocalizerFactory, edge_id: &str) -> Result<()> {
        let localizer = factory.localizer_for_edge(edge_id)?;
        self.begin(localizer, SearchMode::Edge(edge_id.to_string()));
        Ok(())
    }

    /// Seed the heading from a known orientation (compass degrees)
    ///
    /// Running localizers report it until the next inertial reading, and
    /// localizers created later start from it.
    pub fn initialize_orientation(&mut self, orientation: f64, timestamp: f64) -> TrackerEvent {
        let orientation = wrap_deg(orientation);
        self.orientation = Some(orientation);
        for localizer in self.primary.iter_mut().chain(self.candidate.iter_mut()) {
            localizer.set_orientation(orientation);
        }
        debug!("orientation seeded at {:.1}", orientation);
        TrackerEvent::Orientation(OrientationUpdate { timestamp, orientation })
    }

    pub fn orientation(&self) -> Option<f64> {
        self.orientation
    }

    fn adopt(&self, mut localizer: Localizer) -> Localizer {
        if let Some(orientation) = self.orientation {
            localizer.set_orientation(orientation);
        }
        localizer
    }

    fn begin(&mut self, localizer: Localizer, mode: SearchMode) {
        self.clear();
        info!("tracker initializing with {} ({:?})", localizer.name(), mode);
        self.primary = Some(self.adopt(localizer));
        self.state = TrackerState::Initializing { mode, since: None };
    }

    fn clear(&mut self) {
        self.primary = None;
        self.candidate = None;
        self.streak = 0;
        self.candidate_samples = 0;
        self.ready_sent = false;
        self.current = None;
        self.latest_by_edge.clear();
    }

    /// Back to Idle; safe to call repeatedly
    pub fn reset(&mut self) {
        if self.state != TrackerState::Idle {
            debug!("tracker reset from {}", self.state.name());
        }
        self.clear();
        self.orientation = None;
        self.state = TrackerState::Idle;
    }

    pub fn stop(&mut self) {
        self.clear();
        self.state = TrackerState::Stopped;
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.current.as_ref()
    }

    /// Latest location, starting a floor search when nothing is running yet
    pub fn current_location_with_init(
        &mut self,
        factory: &LocalizerFactory,
        floor: i32,
    ) -> Result<Option<Location>> {
        if let Some(location) = &self.current {
            return Ok(Some(location.clone()));
        }
        if matches!(self.state, TrackerState::Idle | TrackerState::Stopped) {
            self.init_localization(factory, floor)?;
        }
        Ok(None)
    }

    /// Latest estimate computed on `edge_id` by the primary or the candidate localizer
    pub fn location_on_edge(&self, edge_id: &str) -> Option<&Location> {
        self.latest_by_edge.get(edge_id)
    }

    /// Most confident recent estimate among `edges` within `knn_threshold`
    pub fn location_in_edges(&self, edges: &[&str], knn_threshold: f64) -> Option<&Location> {
        edges
            .iter()
            .filter_map(|e| self.latest_by_edge.get(*e))
            .filter(|l| l.knn_dist <= knn_threshold)
            .min_by(|a, b| a.knn_dist.total_cmp(&b.knn_dist))
    }

    pub fn localizer_name_for_edge(&self, factory: &LocalizerFactory, edge_id: &str) -> String {
        [self.primary.as_ref(), self.candidate.as_ref()]
            .into_iter()
            .flatten()
            .find(|l| l.edge_id() == Some(edge_id))
            .map(|l| l.name().to_string())
            .unwrap_or_else(|| factory.localizer_name_for_edge(edge_id))
    }

    pub fn consume_sample(
        &mut self,
        map: &TopoMap,
        factory: &LocalizerFactory,
        sample: &SensorSample,
    ) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        if matches!(self.state, TrackerState::Idle | TrackerState::Stopped) {
            return events;
        }
        if let SensorSample::Inertial(reading) = sample {
            let orientation = heading_deg(reading.heading);
            self.orientation = Some(orientation);
            events.push(TrackerEvent::Orientation(OrientationUpdate {
                timestamp: reading.timestamp,
                orientation,
            }));
        }

        let primary = self.primary.as_mut().and_then(|l| l.consume_sample(sample));
        let candidate = self.candidate.as_mut().and_then(|l| l.consume_sample(sample));

        match self.state.clone() {
            TrackerState::Initializing { mode, since } => {
                self.step_initializing(map, factory, mode, since, sample.timestamp(), primary, &mut events)
            }
            TrackerState::Tracking { edge_id } => {
                if let Some(result) = primary {
                    self.step_tracking(map, factory, &edge_id, &result, &mut events);
                }
            }
            TrackerState::TransitioningCandidate {
                from_edge,
                node,
                candidates,
                current,
            } => self.step_transition(
                map, factory, &from_edge, node, &candidates, current, primary, candidate, &mut events,
            ),
            TrackerState::Idle | TrackerState::Stopped => {}
        }
        events
    }

    #[allow(clippy::too_many_arguments)]
    fn step_initializing(
        &mut self,
        map: &TopoMap,
        factory: &LocalizerFactory,
        mode: SearchMode,
        since: Option<f64>,
        now: f64,
        result: Option<LocalizeResult>,
        events: &mut Vec<TrackerEvent>,
    ) {
        let since = since.unwrap_or(now);
        self.state = TrackerState::Initializing {
            mode: mode.clone(),
            since: Some(since),
        };

        if let Some(result) = result {
            if result.is_confident(self.config.confidence_threshold) {
                self.streak += 1;
            } else {
                self.streak = 0;
            }
            if self.streak >= self.config.sustained_samples {
                if self.lock_on(map, factory, &mode, &result, events) {
                    return;
                }
                self.streak = 0;
            }
        }

        let waited = now - since;
        if waited >= self.config.init_timeout_secs {
            let err = NavError::LowConfidenceTimeout { seconds: waited };
            warn!("{}", err);
            events.push(TrackerEvent::LowConfidence { seconds: waited });
            self.streak = 0;
            match mode {
                SearchMode::Edge(edge_id) => self.widen_search(factory, &edge_id, now, events),
                SearchMode::Floor(floor) => {
                    events.push(TrackerEvent::Lost {
                        reason: format!("no confident position on floor {}", floor),
                    });
                    self.state = TrackerState::Initializing {
                        mode: SearchMode::Floor(floor),
                        since: Some(now),
                    };
                }
            }
        }
    }

    /// Commit the first edge; false when no 1-D localizer could be bound
    fn lock_on(
        &mut self,
        map: &TopoMap,
        factory: &LocalizerFactory,
        mode: &SearchMode,
        result: &LocalizeResult,
        events: &mut Vec<TrackerEvent>,
    ) -> bool {
        let edge_id = match mode {
            SearchMode::Edge(edge_id) => edge_id.clone(),
            SearchMode::Floor(_) => {
                let Some(edge_id) = result.edge_id.clone() else {
                    return false;
                };
                match factory.localizer_for_edge(&edge_id) {
                    Ok(mut localizer) => {
                        let point = crate::geometry::Point2D::new(result.x, result.y);
                        localizer.focus(&point, result.knn_dist.max(1.0));
                        self.primary = Some(self.adopt(localizer));
                    }
                    Err(e) => {
                        warn!("cannot lock onto edge {}: {}", edge_id, e);
                        return false;
                    }
                }
                edge_id
            }
        };
        let Some(location) = to_location(map, &edge_id, result) else {
            return false;
        };
        info!("tracker locked onto edge {}", edge_id);
        self.state = TrackerState::Tracking {
            edge_id: edge_id.clone(),
        };
        self.streak = 0;
        events.push(TrackerEvent::EdgeChanged {
            from: None,
            to: edge_id,
            timestamp: result.timestamp,
        });
        if !self.ready_sent {
            self.ready_sent = true;
            events.push(TrackerEvent::Ready(location.clone()));
        }
        self.publish(location, events);
        true
    }

    fn widen_search(
        &mut self,
        factory: &LocalizerFactory,
        edge_id: &str,
        now: f64,
        events: &mut Vec<TrackerEvent>,
    ) {
        let floor = factory.edge_path(edge_id).map(|p| p.floor);
        let widened = floor
            .ok_or_else(|| NavError::UnknownLocation(edge_id.to_string()))
            .and_then(|f| factory.create_pf_2d_on_floor(f).map(|l| (f, l)));
        match widened {
            Ok((floor, localizer)) => {
                info!("widening search from edge {} to floor {}", edge_id, floor);
                self.primary = Some(self.adopt(localizer));
                self.state = TrackerState::Initializing {
                    mode: SearchMode::Floor(floor),
                    since: Some(now),
                };
            }
            Err(e) => {
                events.push(TrackerEvent::Lost {
                    reason: e.to_string(),
                });
                self.reset();
            }
        }
    }

    fn step_tracking(
        &mut self,
        map: &TopoMap,
        factory: &LocalizerFactory,
        edge_id: &str,
        result: &LocalizeResult,
        events: &mut Vec<TrackerEvent>,
    ) {
        let Some(location) = to_location(map, edge_id, result) else {
            return;
        };
        let end = map
            .edge_by_id(edge_id)
            .and_then(|e| map.edge(e).map(|edge| (e, edge)))
            .and_then(|(e, edge)| edge.check_valid_end_node_at_location(map, &location).map(|n| (e, n)));
        self.publish(location, events);

        let Some((edge, node)) = end else {
            return;
        };
        let candidates = self.candidate_edges(map, edge, node);
        if candidates.is_empty() {
            return;
        }
        for (i, candidate) in candidates.iter().enumerate() {
            if self.start_candidate(map, factory, node, candidate) {
                debug!("edge {}: near node {}, trying {:?}", edge_id, node.0, candidates);
                self.state = TrackerState::TransitioningCandidate {
                    from_edge: edge_id.to_string(),
                    node,
                    candidates,
                    current: i,
                };
                return;
            }
        }
    }

    /// Edges reachable past `node`, preferred (route) edges first
    fn candidate_edges(&self, map: &TopoMap, from: EdgeIdx, node: NodeIdx) -> Vec<String> {
        let mut nodes = vec![node];
        if let Some(n) = map.node(node) {
            if n.kind.is_vertical_transit() {
                nodes.extend(
                    n.transits
                        .iter()
                        .filter(|t| t.enabled)
                        .filter_map(|t| map.node_by_id(&t.target)),
                );
            }
        }
        let mut out: Vec<String> = Vec::new();
        for n in nodes {
            for &e in map.connecting_edges(n) {
                if e == from {
                    continue;
                }
                if let Some(edge) = map.edge(e) {
                    if edge.is_navigational() && !edge.temporary && !out.contains(&edge.id) {
                        out.push(edge.id.clone());
                    }
                }
            }
        }
        let rank = |id: &String| {
            self.preferred_edges
                .iter()
                .position(|p| p == id)
                .unwrap_or(usize::MAX)
        };
        out.sort_by_key(rank);
        out
    }

    fn start_candidate(
        &mut self,
        map: &TopoMap,
        factory: &LocalizerFactory,
        node: NodeIdx,
        edge_id: &str,
    ) -> bool {
        let Some(primary) = self.primary.as_ref() else {
            return false;
        };
        match factory.clone_localizer_for_edge(primary, edge_id) {
            Ok(mut localizer) => {
                if let Some(n) = map.node(node) {
                    localizer.focus(&n.position_in_edge(edge_id), n.pos_dist_threshold.max(1.0));
                }
                self.candidate = Some(self.adopt(localizer));
                self.streak = 0;
                self.candidate_samples = 0;
                true
            }
            Err(e) => {
                warn!("candidate edge {} unavailable: {}", edge_id, e);
                false
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step_transition(
        &mut self,
        map: &TopoMap,
        factory: &LocalizerFactory,
        from_edge: &str,
        node: NodeIdx,
        candidates: &[String],
        current: usize,
        primary: Option<LocalizeResult>,
        candidate: Option<LocalizeResult>,
        events: &mut Vec<TrackerEvent>,
    ) {
        if let Some(result) = primary {
            if let Some(location) = to_location(map, from_edge, &result) {
                let retreated = map.node(node).map(|n| {
                    n.position_in_edge(from_edge).distance_to(&location.point())
                        > n.pos_dist_threshold * self.config.exit_distance_factor
                });
                self.publish(location, events);
                if retreated == Some(true) {
                    debug!("left node {} along {}, transition abandoned", node.0, from_edge);
                    self.candidate = None;
                    self.streak = 0;
                    self.state = TrackerState::Tracking {
                        edge_id: from_edge.to_string(),
                    };
                    return;
                }
            }
        }

        let Some(result) = candidate else {
            return;
        };
        let Some(target) = candidates.get(current) else {
            return;
        };
        let Some(location) = to_location(map, target, &result) else {
            return;
        };
        self.latest_by_edge.insert(target.clone(), location.clone());
        self.candidate_samples += 1;
        if result.is_confident(self.config.confidence_threshold) {
            self.streak += 1;
        } else {
            self.streak = 0;
        }

        if self.streak >= self.config.sustained_samples {
            info!("edge transition {} -> {}", from_edge, target);
            self.primary = self.candidate.take();
            self.streak = 0;
            self.state = TrackerState::Tracking {
                edge_id: target.clone(),
            };
            events.push(TrackerEvent::EdgeChanged {
                from: Some(from_edge.to_string()),
                to: target.clone(),
                timestamp: result.timestamp,
            });
            self.publish(location, events);
            return;
        }

        if self.candidate_samples >= self.config.candidate_patience && candidates.len() > 1 {
            let next = (current + 1) % candidates.len();
            if self.start_candidate(map, factory, node, &candidates[next]) {
                debug!("rotating candidate {} -> {}", target, candidates[next]);
                self.state = TrackerState::TransitioningCandidate {
                    from_edge: from_edge.to_string(),
                    node,
                    candidates: candidates.to_vec(),
                    current: next,
                };
            }
        } else if self.candidate_samples >= self.config.candidate_patience {
            self.candidate_samples = 0;
        }
    }

    fn publish(&mut self, location: Location, events: &mut Vec<TrackerEvent>) {
        self.latest_by_edge
            .insert(location.edge_id.clone(), location.clone());
        self.current = Some(location.clone());
        events.push(TrackerEvent::Location(location));
    }
}

fn to_location(map: &TopoMap, edge_id: &str, result: &LocalizeResult) -> Option<Location> {
    let edge = map.edge(map.edge_by_id(edge_id)?)?;
    let mut location = Location::on_edge(edge, result.x, result.y, result.knn_dist, result.timestamp);
    location.orientation = result.orientation;
    Some(location)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::NavConfig;
    use crate::localization::factory::tests::{synthetic_rssi, write_knn_model};
    use crate::localization::{LocalizerDescriptor, LocalizerKind};
    use crate::topo::fixtures;
    use crate::types::{BeaconReading, BeaconScan, InertialReading};
    use approx::assert_relative_eq;

    /// Corridor map plus a factory using KNN localizers on E1 and E2
    pub(crate) fn knn_setup(tag: &str) -> (TopoMap, LocalizerFactory) {
        let map = fixtures::corridor_map();
        let mut config = NavConfig::default();
        config.particles.seed = 5;
        config.particles.count_2d = 200;
        let mut factory = LocalizerFactory::new(&map, config);
        for edge in ["E1", "E2"] {
            let model = write_knn_model(&map, edge, tag);
            factory.register_descriptor(
                edge,
                LocalizerDescriptor {
                    id: format!("knn-{}", edge),
                    kind: LocalizerKind::Knn1d,
                    model: Some(model),
                    floor: None,
                },
            );
        }
        (map, factory)
    }

    pub(crate) fn scan_at(map: &TopoMap, t: f64, x: f64, y: f64) -> SensorSample {
        SensorSample::Beacon(BeaconScan {
            timestamp: t,
            readings: synthetic_rssi(map, x, y)
                .into_iter()
                .zip(map.beacons())
                .map(|((id, rssi), b)| BeaconReading {
                    id,
                    rssi,
                    distance: (b.x - x).hypot(b.y - y),
                })
                .collect(),
        })
    }

    fn garbage_scan(map: &TopoMap, t: f64) -> SensorSample {
        SensorSample::Beacon(BeaconScan {
            timestamp: t,
            readings: map
                .beacons()
                .iter()
                .map(|b| BeaconReading { id: b.id, rssi: -100.0, distance: -1.0 })
                .collect(),
        })
    }

    fn locations(events: &[TrackerEvent]) -> Vec<&Location> {
        events
            .iter()
            .filter_map(|e| match e {
                TrackerEvent::Location(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    fn tracking_on_e1(tag: &str) -> (TopoMap, LocalizerFactory, LocationTracker) {
        let (map, factory) = knn_setup(tag);
        let mut tracker = LocationTracker::new(TrackingConfig::default());
        tracker.init_localization_on_edge(&factory, "E1").unwrap();
        for (i, x) in [4.0, 8.0, 12.0].into_iter().enumerate() {
            tracker.consume_sample(&map, &factory, &scan_at(&map, i as f64, x, 0.0));
        }
        (map, factory, tracker)
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (map, factory) = knn_setup("reset");
        let mut tracker = LocationTracker::new(TrackingConfig::default());
        tracker.reset();
        assert_eq!(tracker.state(), &TrackerState::Idle);
        tracker.reset();
        assert_eq!(tracker.state(), &TrackerState::Idle);

        tracker.init_localization_on_edge(&factory, "E1").unwrap();
        tracker.reset();
        tracker.reset();
        assert_eq!(tracker.state(), &TrackerState::Idle);
        assert_eq!(tracker.active_localizers(), 0);
        assert!(tracker
            .consume_sample(&map, &factory, &scan_at(&map, 0.0, 4.0, 0.0))
            .is_empty());
    }

    #[test]
    fn test_initialized_orientation_reaches_locations() {
        let (map, factory) = knn_setup("orientation");
        let mut tracker = LocationTracker::new(TrackingConfig::default());
        match tracker.initialize_orientation(450.0, 0.0) {
            TrackerEvent::Orientation(update) => assert_relative_eq!(update.orientation, 90.0),
            other => panic!("unexpected {:?}", other),
        }
        tracker.init_localization_on_edge(&factory, "E1").unwrap();
        let mut events = Vec::new();
        for (i, x) in [4.0, 8.0, 12.0, 16.0].into_iter().enumerate() {
            events.extend(tracker.consume_sample(&map, &factory, &scan_at(&map, i as f64, x, 0.0)));
        }
        let last = *locations(&events).last().unwrap();
        assert_relative_eq!(last.orientation, 90.0, epsilon = 1e-9);

        let turn = SensorSample::Inertial(InertialReading {
            timestamp: 4.5,
            acceleration: [0.0; 3],
            heading: std::f64::consts::PI,
            heading_delta: 0.0,
            step: false,
        });
        tracker.consume_sample(&map, &factory, &turn);
        assert_relative_eq!(tracker.orientation().unwrap(), 180.0, epsilon = 1e-9);
        let events = tracker.consume_sample(&map, &factory, &scan_at(&map, 5.0, 18.0, 0.0));
        assert_relative_eq!(locations(&events)[0].orientation, 180.0, epsilon = 1e-9);

        tracker.reset();
        assert_eq!(tracker.orientation(), None);
    }

    #[test]
    fn test_sustained_confidence_locks_edge() {
        let (map, factory) = knn_setup("lock");
        let mut tracker = LocationTracker::new(TrackingConfig::default());
        tracker.init_localization_on_edge(&factory, "E1").unwrap();

        let first = tracker.consume_sample(&map, &factory, &scan_at(&map, 0.0, 4.0, 0.0));
        let second = tracker.consume_sample(&map, &factory, &scan_at(&map, 1.0, 8.0, 0.0));
        assert!(locations(&first).is_empty());
        assert!(locations(&second).is_empty());
        assert!(matches!(tracker.state(), TrackerState::Initializing { .. }));

        let third = tracker.consume_sample(&map, &factory, &scan_at(&map, 2.0, 12.0, 0.0));
        assert!(matches!(
            &third[0],
            TrackerEvent::EdgeChanged { from: None, to, .. } if to == "E1"
        ));
        assert!(matches!(third[1], TrackerEvent::Ready(_)));
        let locs = locations(&third);
        assert_eq!(locs.len(), 1);
        assert!((locs[0].x - 12.0).abs() < 1e-9);
        assert_eq!(
            tracker.state(),
            &TrackerState::Tracking { edge_id: "E1".to_string() }
        );
    }

    #[test]
    fn test_transition_to_next_edge() {
        let (map, factory, mut tracker) = tracking_on_e1("transition");
        tracker.set_preferred_edges(vec!["E2".to_string()]);
        for (i, x) in [16.0, 20.0, 24.0].into_iter().enumerate() {
            let events = tracker.consume_sample(&map, &factory, &scan_at(&map, 3.0 + i as f64, x, 0.0));
            assert_eq!(locations(&events).len(), 1);
        }
        tracker.consume_sample(&map, &factory, &scan_at(&map, 6.0, 28.0, 0.0));
        assert!(matches!(tracker.state(), TrackerState::TransitioningCandidate { .. }));
        assert_eq!(tracker.active_localizers(), 2);
        assert_eq!(tracker.localizer_name_for_edge(&factory, "E2"), "knn-E2");

        let a = tracker.consume_sample(&map, &factory, &scan_at(&map, 7.0, 30.0, 2.0));
        let b = tracker.consume_sample(&map, &factory, &scan_at(&map, 8.0, 30.0, 4.0));
        assert!(locations(&a).iter().all(|l| l.edge_id == "E1"));
        assert!(locations(&b).iter().all(|l| l.edge_id == "E1"));
        assert!(tracker.location_on_edge("E2").is_some());

        let c = tracker.consume_sample(&map, &factory, &scan_at(&map, 9.0, 30.0, 6.0));
        let changed = c
            .iter()
            .position(|e| matches!(e, TrackerEvent::EdgeChanged { to, .. } if to == "E2"))
            .unwrap();
        // old-edge notifications come first, the new edge after the switch
        assert!(c[..changed]
            .iter()
            .all(|e| !matches!(e, TrackerEvent::Location(l) if l.edge_id == "E2")));
        let after = locations(&c[changed..]);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].edge_id, "E2");
        assert_eq!(
            tracker.state(),
            &TrackerState::Tracking { edge_id: "E2".to_string() }
        );
        assert_eq!(tracker.active_localizers(), 1);
        assert_eq!(tracker.current_location().unwrap().edge_id, "E2");

        let best = tracker.location_in_edges(&["E1", "E2"], 1.0).unwrap();
        assert_eq!(best.edge_id, "E2");
    }

    #[test]
    fn test_transition_abandoned_on_retreat() {
        let (map, factory, mut tracker) = tracking_on_e1("retreat");
        tracker.consume_sample(&map, &factory, &scan_at(&map, 3.0, 28.0, 0.0));
        assert!(matches!(tracker.state(), TrackerState::TransitioningCandidate { .. }));
        tracker.consume_sample(&map, &factory, &scan_at(&map, 4.0, 18.0, 0.0));
        assert_eq!(
            tracker.state(),
            &TrackerState::Tracking { edge_id: "E1".to_string() }
        );
        assert_eq!(tracker.active_localizers(), 1);
    }

    #[test]
    fn test_timeout_widens_to_floor_search() {
        let (map, factory) = knn_setup("timeout");
        let mut tracker = LocationTracker::new(TrackingConfig::default());
        tracker.init_localization_on_edge(&factory, "E1").unwrap();
        let mut low = false;
        for t in 0..=16 {
            let events = tracker.consume_sample(&map, &factory, &garbage_scan(&map, t as f64));
            low |= events.iter().any(|e| matches!(e, TrackerEvent::LowConfidence { .. }));
        }
        assert!(low);
        assert!(matches!(
            tracker.state(),
            TrackerState::Initializing { mode: SearchMode::Floor(1), .. }
        ));
    }

    #[test]
    fn test_construction_failure_keeps_idle() {
        let (_, factory) = knn_setup("failure");
        let mut tracker = LocationTracker::new(TrackingConfig::default());
        let err = tracker.init_localization_on_edge(&factory, "missing").unwrap_err();
        assert!(matches!(err, NavError::LocalizerConstruction { .. }));
        assert_eq!(tracker.state(), &TrackerState::Idle);
        assert!(tracker.init_localization(&factory, 9).is_err());
        assert_eq!(tracker.state(), &TrackerState::Idle);
    }

    #[test]
    fn test_orientation_updates_and_stop() {
        let (map, factory, mut tracker) = tracking_on_e1("orientation");
        let inertial = SensorSample::Inertial(InertialReading {
            timestamp: 3.0,
            acceleration: [0.0; 3],
            heading: std::f64::consts::FRAC_PI_2,
            heading_delta: 0.0,
            step: false,
        });
        let events = tracker.consume_sample(&map, &factory, &inertial);
        match &events[0] {
            TrackerEvent::Orientation(o) => assert!((o.orientation - 90.0).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        tracker.stop();
        assert_eq!(tracker.state(), &TrackerState::Stopped);
        assert!(tracker.consume_sample(&map, &factory, &inertial).is_empty());
        assert!(tracker.current_location().is_none());
    }

    #[test]
    fn test_current_location_with_init_starts_search() {
        let (_, factory) = knn_setup("withinit");
        let mut tracker = LocationTracker::new(TrackingConfig::default());
        assert_eq!(tracker.current_location_with_init(&factory, 1).unwrap(), None);
        assert!(matches!(
            tracker.state(),
            TrackerState::Initializing { mode: SearchMode::Floor(1), .. }
        ));
    }
}
