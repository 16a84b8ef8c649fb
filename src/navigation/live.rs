//! Navigation session driven by the background location service
//!
//! Samples go to a [`LocationService`] worker; the tracker's events come back
//! on a subscription and are turned into [`NavEvent`]s by [`LiveNavSession::poll`].
//! Starting a new route resets the service, so samples queued for the old
//! route are discarded instead of steering the new one.

use super::machine::{NavEvent, NavMachine};
use super::session::{anchor_on_edge, route_floor, route_tracker_event};
use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::localization::LocalizerFactory;
use crate::location::{LocationService, Subscription, TrackerEvent, TrackerSnapshot, TrackerState};
use crate::topo::{find_shortest_path_by_name, find_shortest_path_from_location, Location, TopoMap};
use crate::types::SensorSample;
use log::{info, warn};
use std::sync::Arc;

pub struct LiveNavSession {
    map: Arc<TopoMap>,
    service: LocationService,
    events: Subscription<TrackerEvent>,
    machine: Option<NavMachine>,
    config: NavConfig,
    location: Option<Location>,
    stopped: bool,
}

impl LiveNavSession {
    /// Validate inputs and start the location worker; needs a tokio runtime
    pub fn new(map: TopoMap, config: NavConfig) -> Result<Self> {
        config.validate()?;
        map.validate()?;
        let factory = LocalizerFactory::new(&map, config.clone());
        Ok(Self::with_factory(map, factory))
    }

    pub fn with_factory(map: TopoMap, factory: LocalizerFactory) -> Self {
        let config = factory.config().clone();
        let map = Arc::new(map);
        let service = LocationService::spawn(map.clone(), Arc::new(factory), config.tracking.clone());
        let events = service.subscribe_events();
        Self {
            map,
            service,
            events,
            machine: None,
            config,
            location: None,
            stopped: false,
        }
    }

    pub fn map(&self) -> &TopoMap {
        &self.map
    }

    pub fn service(&self) -> &LocationService {
        &self.service
    }

    pub fn machine(&self) -> Option<&NavMachine> {
        self.machine.as_ref()
    }

    /// Latest location seen by [`LiveNavSession::poll`]
    pub fn current_location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Tracker state as last reported by the worker
    pub fn tracker_state(&self) -> TrackerState {
        self.service
            .snapshot()
            .map(|snapshot| snapshot.state)
            .unwrap_or(TrackerState::Idle)
    }

    pub fn snapshot(&self) -> Result<TrackerSnapshot> {
        self.service.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.machine.as_ref().map(|m| m.is_finished()).unwrap_or(false)
    }

    /// Plan `from -> to` and restart localization on the route's first edge
    pub async fn start(&mut self, from: &str, to: &str) -> Result<Vec<NavEvent>> {
        if self.stopped {
            return Err(NavError::InvalidState("session already stopped".to_string()));
        }
        let path = find_shortest_path_by_name(&self.map, from, to)?;
        let mut machine = NavMachine::new(&self.map, &path, self.config.navigation.clone())?;
        let route = machine.route_edge_ids(&self.map);
        info!("live navigation {} -> {}: {} states", from, to, machine.states().len());

        self.service.reset()?;
        self.location = None;
        // events of the previous route are stale
        while self.events.receiver.try_recv().is_ok() {}

        let Some(first_edge) = route.first().cloned() else {
            let events = machine.start();
            self.machine = Some(machine);
            return Ok(events);
        };
        self.service.set_preferred_edges(route).await?;
        if let Err(e) = self.service.init_localization_on_edge(&first_edge).await {
            warn!("edge localizer unavailable ({}), searching the floor", e);
            let floor = route_floor(&self.map, &path)?;
            self.service.init_localization(floor).await?;
        }
        self.machine = Some(machine);
        Ok(Vec::new())
    }

    pub async fn relocalize(&self, floor: i32) -> Result<()> {
        self.service.init_localization(floor).await
    }

    pub async fn initialize_orientation(&self, orientation: f64, timestamp: f64) -> Result<()> {
        self.service.initialize_orientation(orientation, timestamp).await
    }

    /// Hand a live sample to the worker; false when the queue was full
    pub fn submit(&self, sample: SensorSample) -> Result<bool> {
        self.service.submit(sample)
    }

    /// Hand a replayed sample to the worker, waiting for queue space
    pub async fn queue(&self, sample: SensorSample) -> Result<()> {
        self.service.queue(sample).await
    }

    /// Turn the tracker events published so far into navigation events
    pub async fn poll(&mut self) -> Result<Vec<NavEvent>> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.receiver.try_recv() {
            if let TrackerEvent::Location(location) = &event {
                self.location = Some(location.clone());
            }
            route_tracker_event(self.machine.as_mut(), &self.map, event, &mut out);
        }
        if self.is_finished() && !self.stopped {
            self.shutdown().await?;
        }
        Ok(out)
    }

    /// Wait for the worker to catch up, then poll
    pub async fn settle(&mut self) -> Result<Vec<NavEvent>> {
        if !self.stopped {
            self.service.sync().await?;
        }
        self.poll().await
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(machine) = self.machine.as_mut() {
            machine.stop();
        }
        if !self.stopped {
            self.shutdown().await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stopped = true;
        self.service.unsubscribe_events(self.events.id);
        self.service.stop().await
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

    /// Replace the route with one from the latest location to `to`
    ///
    /// Planning splits the current edge on a scratch copy of the map; the
    /// shared map the worker reads is never modified.
    pub async fn replan_from_current(&mut self, to: &str) -> Result<Vec<NavEvent>> {
        let location = self
            .location
            .clone()
            .ok_or_else(|| NavError::InvalidState("no current location to plan from".to_string()))?;
        let target = self
            .map
            .node_by_name(to)
            .ok_or_else(|| NavError::UnknownLocation(to.to_string()))?;

        let mut scratch = (*self.map).clone();
        let path = find_shortest_path_from_location(&mut scratch, &location, target)
            .and_then(|path| anchor_on_edge(&scratch, &location, path))?;

        let mut machine = NavMachine::new(&self.map, &path, self.config.navigation.clone())?;
        self.service
            .set_preferred_edges(machine.route_edge_ids(&self.map))
            .await?;
        let mut events = machine.start();
        events.extend(machine.check_state_status(&self.map, &location));
        info!("replanned from edge {} to {}", location.edge_id, to);
        self.machine = Some(machine);
        Ok(events)
    }
}
