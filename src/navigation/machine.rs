//! Per-instruction navigation state machine
//!
//! Built once from a planned route. Every location update is checked against
//! the current state; arriving at a state's target node (or confirming the
//! next edge during a transition) advances to the next state and yields the
//! announcements the UI layer should render.

use super::instructions::{
    capitalize, distance_text, floor_name, transit_instruction, walk_instruction, Turn,
};
use super::state::{NavState, StateKind};
use crate::config::NavigationConfig;
use crate::error::{NavError, Result};
use crate::topo::{Edge, EdgeIdx, Hop, Location, Node, NodeIdx, NodeKind, PlannedPath, TopoMap};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NavEvent {
    StateStart { state: usize, text: String },
    Approaching { state: usize, text: String },
    Arrived { state: usize, text: String },
    Tricky { state: usize, text: String },
    Repeat { text: String },
    Surround { text: String },
    Accessibility { text: String },
    NavigationReady,
    NavigationFinished,
    Lost { reason: String },
}

pub struct NavMachine {
    states: Vec<NavState>,
    path_nodes: Vec<NodeIdx>,
    current: Option<usize>,
    started: bool,
    finished: bool,
    ready_announced: bool,
    config: NavigationConfig,
    previous_instruction: String,
    last_location: Option<Location>,
}

fn node_at(map: &TopoMap, idx: NodeIdx) -> Result<&Node> {
    map.node(idx)
        .ok_or_else(|| NavError::GraphIntegrity(format!("route references missing node {}", idx.0)))
}

fn edge_at(map: &TopoMap, idx: EdgeIdx) -> Result<&Edge> {
    map.edge(idx)
        .ok_or_else(|| NavError::GraphIntegrity(format!("route references missing edge {}", idx.0)))
}

impl NavMachine {
    pub fn new(map: &TopoMap, path: &PlannedPath, config: NavigationConfig) -> Result<Self> {
        if path.nodes.len() != path.hops.len() + 1 {
            return Err(NavError::InvalidState(format!(
                "route has {} nodes for {} hops",
                path.nodes.len(),
                path.hops.len()
            )));
        }

        let mut states: Vec<NavState> = Vec::new();
        let mut pending_transit: Option<(NodeIdx, NodeIdx)> = None;
        for (i, hop) in path.hops.iter().enumerate() {
            let (from, to) = (path.nodes[i], path.nodes[i + 1]);
            match hop {
                Hop::Transit => {
                    let start = pending_transit.map(|(s, _)| s).unwrap_or(from);
                    pending_transit = Some((start, to));
                }
                Hop::Edge(edge) => {
                    let transition = match pending_transit.take() {
                        Some((s, t)) => Some(NavState::new(StateKind::Transition, s, t)),
                        None if !states.is_empty() => {
                            Some(NavState::new(StateKind::Transition, from, from))
                        }
                        None => None,
                    };
                    if let Some(mut t) = transition {
                        t.target_edge = Some(*edge);
                        states.push(t);
                    }
                    let mut walking = NavState::new(StateKind::Walking, from, to);
                    walking.walking_edge = Some(*edge);
                    states.push(walking);
                }
            }
        }
        if let Some((s, t)) = pending_transit {
            states.push(NavState::new(StateKind::Transition, s, t));
        }

        let count = states.len();
        for (i, state) in states.iter_mut().enumerate() {
            state.prev = i.checked_sub(1);
            state.next = (i + 1 < count).then_some(i + 1);
            state.is_first = i == 0;
            state.is_meter = config.use_meters;
        }
        for i in 0..count {
            describe(map, &mut states, i)?;
        }
        debug!("navigation machine built with {} states", count);

        Ok(Self {
            states,
            path_nodes: path.nodes.clone(),
            current: None,
            started: false,
            finished: false,
            ready_announced: false,
            config,
            previous_instruction: String::new(),
            last_location: None,
        })
    }

    /// Announce the first state; a route of zero hops finishes immediately
    pub fn start(&mut self) -> Vec<NavEvent> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        if self.states.is_empty() {
            self.finished = true;
            info!("navigation finished: already at destination");
            return vec![NavEvent::NavigationFinished];
        }
        self.current = Some(0);
        let text = self.states[0].start_info.clone();
        self.previous_instruction = text.clone();
        vec![NavEvent::StateStart { state: 0, text }]
    }

    pub fn stop(&mut self) {
        if !self.finished {
            info!("navigation stopped");
        }
        self.current = None;
        self.finished = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn states(&self) -> &[NavState] {
        &self.states
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_state(&self) -> Option<&NavState> {
        self.current.and_then(|i| self.states.get(i))
    }

    pub fn path_nodes(&self) -> &[NodeIdx] {
        &self.path_nodes
    }

    /// The state being walked, or the one that follows the current transition
    pub fn walking_state(&self) -> Option<&NavState> {
        let state = self.current_state()?;
        if state.is_walking() {
            Some(state)
        } else {
            state.next.and_then(|n| self.states.get(n))
        }
    }

    /// The current transition, or the one that ends the current walk
    pub fn transition_state(&self) -> Option<&NavState> {
        let state = self.current_state()?;
        if state.is_walking() {
            state.next.and_then(|n| self.states.get(n))
        } else {
            Some(state)
        }
    }

    /// Edge ids in route order
    pub fn route_edge_ids(&self, map: &TopoMap) -> Vec<String> {
        self.states
            .iter()
            .filter_map(|s| s.walking_edge)
            .filter_map(|e| map.edge(e))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Emitted once, when localization first locks after `start`
    pub fn navigation_ready(&mut self) -> Option<NavEvent> {
        if self.ready_announced {
            return None;
        }
        self.ready_announced = true;
        Some(NavEvent::NavigationReady)
    }

    /// "12 feet to turn left" for the walking state and `location`
    pub fn next_action_text(&self, map: &TopoMap, location: &Location) -> Option<String> {
        let state = self.current_state()?;
        if !state.is_walking() || !state.is_on_walking_edge(map, location) {
            return None;
        }
        let feet = map.unit_to_feet(state.target_distance(map, location));
        Some(format!(
            "{} to {}",
            distance_text(feet, state.is_meter),
            state.next_action_info
        ))
    }

    pub fn repeat_instruction(&self, map: &TopoMap) -> Option<NavEvent> {
        let live = self
            .last_location
            .as_ref()
            .and_then(|loc| self.next_action_text(map, loc))
            .map(|t| capitalize(&t));
        let text = live.or_else(|| {
            (!self.previous_instruction.is_empty()).then(|| self.previous_instruction.clone())
        })?;
        Some(NavEvent::Repeat { text })
    }

    pub fn announce_surround_info(&self) -> Option<NavEvent> {
        let text = self.walking_state()?.surround_info.clone();
        (!text.is_empty()).then_some(NavEvent::Surround { text })
    }

    pub fn announce_accessibility_info(&self) -> Option<NavEvent> {
        let text = self.walking_state()?.accessibility_info.clone();
        (!text.is_empty()).then_some(NavEvent::Accessibility { text })
    }

    /// Feed one location update; returns the announcements it triggers
    pub fn check_state_status(&mut self, map: &TopoMap, location: &Location) -> Vec<NavEvent> {
        let mut events = Vec::new();
        if !self.started || self.finished {
            return events;
        }
        self.last_location = Some(location.clone());
        let Some(i) = self.current else {
            return events;
        };
        if self.states[i].started_at.is_none() {
            self.states[i].started_at = Some(location.timestamp);
        }
        match self.states[i].kind {
            StateKind::Walking => self.check_walking(map, i, location, &mut events),
            StateKind::Transition => self.check_transition(i, location, &mut events),
        }
        events
    }

    fn check_walking(&mut self, map: &TopoMap, i: usize, location: &Location, events: &mut Vec<NavEvent>) {
        if !self.states[i].is_on_walking_edge(map, location) {
            // localization already committed to the edge after the next turn
            let skipped = self.states[i].next.filter(|&n| {
                self.states[n].kind == StateKind::Transition
                    && self.states[n].target_edge_id.as_deref() == Some(location.edge_id.as_str())
            });
            if let Some(n) = skipped {
                debug!("state {} passed without arrival, joining edge {}", i, location.edge_id);
                self.advance(i, location.timestamp, events);
                self.advance(n, location.timestamp, events);
            }
            return;
        }

        let approach = map.feet_to_unit(self.config.approach_distance);
        let arrive = map.feet_to_unit(self.config.arrive_distance);
        let edge = self.states[i].walking_edge.and_then(|e| map.edge(e));
        let edge_len = edge.map(|e| e.len as f64).unwrap_or(0.0);
        let max_knn = edge.map(|e| e.max_knn_dist).unwrap_or(0.0);
        let dist = self.states[i].target_distance(map, location);

        let state = &mut self.states[i];
        let closing_in = dist < state.closest_distance;
        state.closest_distance = state.closest_distance.min(dist);

        let tricky = max_knn > 0.0 && location.knn_dist > max_knn;
        if tricky && !state.is_tricky {
            state.is_tricky = true;
            events.push(NavEvent::Tricky {
                state: i,
                text: state.tricky_info.clone(),
            });
        }
        if !tricky {
            state.is_tricky = false;
        }
        if state.is_tricky {
            return;
        }

        // only a new closest distance can announce the approach
        if closing_in
            && !state.approach_announced
            && dist <= approach
            && dist > arrive
            && edge_len > approach
        {
            state.approach_announced = true;
            let text = state.approaching_info.clone();
            self.previous_instruction = text.clone();
            events.push(NavEvent::Approaching { state: i, text });
        }
        if dist <= arrive {
            self.advance(i, location.timestamp, events);
        }
    }

    fn check_transition(&mut self, i: usize, location: &Location, events: &mut Vec<NavEvent>) {
        let state = &self.states[i];
        let confirmed = match &state.target_edge_id {
            Some(edge_id) => &location.edge_id == edge_id,
            None => location.floor == state.floor,
        };
        let waited = location.timestamp - state.started_at.unwrap_or(location.timestamp);
        let timed_out = waited >= self.config.transition_timeout_secs;
        if !confirmed && timed_out {
            warn!(
                "transition {} not confirmed after {:.1}s, advancing",
                i, waited
            );
        }
        if confirmed || timed_out {
            self.advance(i, location.timestamp, events);
        }
    }

    fn advance(&mut self, i: usize, timestamp: f64, events: &mut Vec<NavEvent>) {
        events.push(NavEvent::Arrived {
            state: i,
            text: self.states[i].arrived_info.clone(),
        });
        match self.states[i].next {
            Some(n) => {
                self.current = Some(n);
                let next = &mut self.states[n];
                next.started_at = Some(timestamp);
                let text = next.start_info.clone();
                info!("navigation state {} -> {} ({:?})", i, n, next.kind);
                self.previous_instruction = text.clone();
                events.push(NavEvent::StateStart { state: n, text });
            }
            None => {
                info!("navigation finished");
                self.current = None;
                self.finished = true;
                events.push(NavEvent::NavigationFinished);
            }
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn transit_word(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::StairTransit => "stairs",
        NodeKind::DoorTransit => "door",
        _ => "elevator",
    }
}

/// Action announced before leaving the walking state `i`
fn next_action(map: &TopoMap, states: &[NavState], i: usize) -> Result<String> {
    let state = &states[i];
    let target = node_at(map, state.target_node)?;
    let Some(next) = state.next.map(|n| &states[n]) else {
        return Ok(format!("arrive at {}", target.display_name()));
    };
    if next.start_node != next.target_node {
        let dest = node_at(map, next.target_node)?;
        let text = transit_instruction(
            target.transit_info_to_node(&dest.id),
            transit_word(target.kind),
            dest.floor,
        );
        let mut chars = text.chars();
        return Ok(match chars.next() {
            Some(c) => c.to_lowercase().chain(chars).collect(),
            None => text,
        });
    }
    let ori_in = state.ori;
    let ori_out = match next.target_edge {
        Some(e) => edge_at(map, e)?.ori_from_node(next.start_node),
        None => ori_in,
    };
    Ok(Turn::between(ori_in, ori_out).phrase().to_string())
}

fn describe(map: &TopoMap, states: &mut [NavState], i: usize) -> Result<()> {
    match states[i].kind {
        StateKind::Walking => describe_walking(map, states, i),
        StateKind::Transition => describe_transition(map, states, i),
    }
}

fn describe_walking(map: &TopoMap, states: &mut [NavState], i: usize) -> Result<()> {
    let Some(edge_idx) = states[i].walking_edge else {
        return Err(NavError::InvalidState(format!("walking state {} has no edge", i)));
    };
    let edge = edge_at(map, edge_idx)?;
    let start = node_at(map, states[i].start_node)?;
    let target = node_at(map, states[i].target_node)?;
    {
        let state = &mut states[i];
        let s = start.position_in_edge(&edge.id);
        let t = target.position_in_edge(&edge.id);
        state.ori = edge.ori_from_node(state.start_node);
        (state.sx, state.sy, state.tx, state.ty) = (s.x, s.y, t.x, t.y);
        state.floor = edge.floor;
    }
    let action = next_action(map, states, i)?;
    let is_last = states[i].next.is_none();
    let state = &mut states[i];
    let name = target.display_name();
    let feet = map.unit_to_feet(edge.len as f64);

    state.start_info = walk_instruction(
        edge.info_from_node(state.start_node),
        &distance_text(feet, state.is_meter),
        name,
    );
    state.approaching_info = if is_last {
        format!("Approaching {}", name)
    } else {
        format!("Approaching {}, prepare to {}", name, action)
    };
    state.arrived_info = if is_last {
        non_empty(target.dest_info_coming_from_edge(&edge.id))
            .or_else(|| non_empty(target.info_coming_from_edge(&edge.id)))
            .unwrap_or_else(|| format!("You have arrived at {}", name))
    } else {
        non_empty(target.info_coming_from_edge(&edge.id))
            .unwrap_or_else(|| format!("You are at {}", name))
    };
    state.next_action_info = action;
    if let Some(info) = target.info_from_edge(&edge.id) {
        state.surround_info = info.surround_info.clone();
        state.accessibility_info = info.accessibility_info.clone();
    }
    state.tricky_info = if target.is_tricky_coming_from_edge(&edge.id) {
        target.tricky_info_coming_from_edge(&edge.id).to_string()
    } else {
        String::new()
    };
    if state.tricky_info.is_empty() {
        state.tricky_info = format!("Position uncertain, keep walking towards {}", name);
    }
    Ok(())
}

fn describe_transition(map: &TopoMap, states: &mut [NavState], i: usize) -> Result<()> {
    let start = node_at(map, states[i].start_node)?;
    let target = node_at(map, states[i].target_node)?;
    let target_edge = match states[i].target_edge {
        Some(e) => Some(edge_at(map, e)?),
        None => None,
    };
    let incoming_ori = states[i]
        .prev
        .map(|p| states[p].ori)
        .unwrap_or_default();
    let state = &mut states[i];
    state.target_edge_id = target_edge.map(|e| e.id.clone());
    state.floor = target.floor;
    let s = start.position;
    let t = target.position;
    (state.sx, state.sy, state.tx, state.ty) = (s.x, s.y, t.x, t.y);
    state.ori = target_edge
        .map(|e| e.ori_from_node(state.target_node))
        .unwrap_or(incoming_ori);

    if state.start_node != state.target_node {
        state.start_info = match start.kind {
            NodeKind::DoorTransit => non_empty(start.transit_info_to_node(&target.id).unwrap_or(""))
                .unwrap_or_else(|| "Go through the door".to_string()),
            kind => transit_instruction(
                start.transit_info_to_node(&target.id),
                transit_word(kind),
                target.floor,
            ),
        };
        state.arrived_info = if start.floor != target.floor {
            format!("You are on the {}", floor_name(target.floor))
        } else {
            format!("You are at {}", target.display_name())
        };
    } else {
        state.start_info = capitalize(Turn::between(incoming_ori, state.ori).phrase());
    }
    state.surround_info = start
        .info_from_edge(state.target_edge_id.as_deref().unwrap_or(""))
        .map(|i| i.surround_info.clone())
        .unwrap_or_default();
    Ok(())
}
