use crate::location::TrackerState;
use crate::navigation::{LiveNavSession, NavEvent, NavMachine, NavSession};
use crate::topo::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What a status snapshot reads from a running session
pub trait SessionView {
    fn tracker_state(&self) -> TrackerState;
    fn current_location(&self) -> Option<&Location>;
    fn machine(&self) -> Option<&NavMachine>;
}

impl SessionView for NavSession {
    fn tracker_state(&self) -> TrackerState {
        self.tracker().state().clone()
    }

    fn current_location(&self) -> Option<&Location> {
        NavSession::current_location(self)
    }

    fn machine(&self) -> Option<&NavMachine> {
        NavSession::machine(self)
    }
}

impl SessionView for LiveNavSession {
    fn tracker_state(&self) -> TrackerState {
        LiveNavSession::tracker_state(self)
    }

    fn current_location(&self) -> Option<&Location> {
        LiveNavSession::current_location(self)
    }

    fn machine(&self) -> Option<&NavMachine> {
        LiveNavSession::machine(self)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NavStatus {
    pub updated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub map_name: String,
    pub from: String,
    pub to: String,
    pub samples_processed: u64,
    pub tracker_state: String,
    pub current_edge: Option<String>,
    pub location: Option<Location>,
    // Route progress
    pub current_state: Option<usize>,
    pub total_states: usize,
    pub finished: bool,
    pub last_instruction: Option<String>,
    pub events: Vec<NavEvent>,
}

impl NavStatus {
    pub fn new(map_name: &str, from: &str, to: &str) -> Self {
        let now = Utc::now();
        Self {
            updated_at: now,
            started_at: now,
            map_name: map_name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            samples_processed: 0,
            tracker_state: TrackerState::Idle.name().to_string(),
            current_edge: None,
            location: None,
            current_state: None,
            total_states: 0,
            finished: false,
            last_instruction: None,
            events: Vec::new(),
        }
    }

    /// Refresh from the session after `new_events` were produced
    pub fn update(&mut self, session: &impl SessionView, samples: u64, new_events: &[NavEvent]) {
        self.updated_at = Utc::now();
        self.samples_processed = samples;
        self.tracker_state = session.tracker_state().name().to_string();
        self.location = session.current_location().cloned();
        self.current_edge = self.location.as_ref().map(|l| l.edge_id.clone());
        if let Some(machine) = session.machine() {
            self.current_state = machine.current_index();
            self.total_states = machine.states().len();
            self.finished = machine.is_finished();
        }
        for event in new_events {
            match event {
                NavEvent::StateStart { text, .. }
                | NavEvent::Approaching { text, .. }
                | NavEvent::Arrived { text, .. }
                | NavEvent::Tricky { text, .. }
                    if !text.is_empty() =>
                {
                    self.last_instruction = Some(text.clone())
                }
                _ => {}
            }
        }
        self.events.extend_from_slice(new_events);
    }

    pub fn elapsed_seconds(&self) -> i64 {
        self.updated_at
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
