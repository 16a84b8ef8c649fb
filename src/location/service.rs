//! Background location service
//!
//! Samples are queued to a tokio task that owns the [`LocationTracker`].
//! Samples and initialization requests carry the epoch current when they
//! were queued; `reset` and `stop` bump the epoch immediately, so work queued
//! before them is dropped and results computed across a reset are never
//! published. The worker notices a new epoch before handling its next
//! command and returns the tracker to Idle then, so a reset is never lost to
//! a full queue. Localizer updates run on the blocking pool.

use super::events::{Broadcast, Subscription};
use super::tracker::{LocationTracker, OrientationUpdate, TrackerEvent, TrackerState};
use crate::config::TrackingConfig;
use crate::error::{NavError, Result};
use crate::localization::LocalizerFactory;
use crate::topo::{Location, TopoMap};
use crate::types::SensorSample;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const QUEUE_CAPACITY: usize = 500;

/// Point-in-time view of the worker, readable from any thread
#[derive(Clone, Debug, Serialize)]
pub struct TrackerSnapshot {
    pub state: TrackerState,
    pub location: Option<Location>,
    pub epoch: u64,
    pub samples: u64,
    pub dropped: u64,
}

enum Command {
    Sample { epoch: u64, sample: SensorSample },
    InitFloor { epoch: u64, floor: i32, reply: oneshot::Sender<Result<()>> },
    InitEdge { epoch: u64, edge_id: String, reply: oneshot::Sender<Result<()>> },
    Orientation { orientation: f64, timestamp: f64 },
    Prefer(Vec<String>),
    /// Wakes an idle worker so it applies the new epoch
    Reset,
    Sync(oneshot::Sender<()>),
    Stop,
}

struct Shared {
    epoch: AtomicU64,
    snapshot: Mutex<TrackerSnapshot>,
    locations: Broadcast<Location>,
    orientations: Broadcast<OrientationUpdate>,
    events: Broadcast<TrackerEvent>,
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut TrackerSnapshot)) {
        match self.snapshot.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

pub struct LocationService {
    tx: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl LocationService {
    /// Start the worker task; must be called from within a tokio runtime
    pub fn spawn(map: Arc<TopoMap>, factory: Arc<LocalizerFactory>, config: TrackingConfig) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let shared = Arc::new(Shared {
            epoch: AtomicU64::new(0),
            snapshot: Mutex::new(TrackerSnapshot {
                state: TrackerState::Idle,
                location: None,
                epoch: 0,
                samples: 0,
                dropped: 0,
            }),
            locations: Broadcast::new(),
            orientations: Broadcast::new(),
            events: Broadcast::new(),
        });
        let tracker = LocationTracker::new(config);
        let handle = tokio::spawn(worker(rx, tracker, map, factory, shared.clone()));
        info!("location service started");
        Self {
            tx,
            shared,
            handle: Some(handle),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    /// Queue a sample; returns false when the queue is full and the sample was dropped
    pub fn submit(&self, sample: SensorSample) -> Result<bool> {
        let epoch = self.epoch();
        match self.tx.try_send(Command::Sample { epoch, sample }) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.shared.update(|s| s.dropped += 1);
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(closed()),
        }
    }

    /// Queue a sample, waiting for room instead of dropping it
    pub async fn queue(&self, sample: SensorSample) -> Result<()> {
        let epoch = self.epoch();
        self.send(Command::Sample { epoch, sample }).await
    }

    pub async fn init_localization(&self, floor: i32) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let epoch = self.epoch();
        self.send(Command::InitFloor { epoch, floor, reply }).await?;
        rx.await.map_err(|_| closed())?
    }

    pub async fn init_localization_on_edge(&self, edge_id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let epoch = self.epoch();
        let edge_id = edge_id.to_string();
        self.send(Command::InitEdge { epoch, edge_id, reply }).await?;
        rx.await.map_err(|_| closed())?
    }

    /// Seed the tracker's heading from a known orientation (compass degrees)
    pub async fn initialize_orientation(&self, orientation: f64, timestamp: f64) -> Result<()> {
        self.send(Command::Orientation { orientation, timestamp }).await
    }

    pub async fn set_preferred_edges(&self, edges: Vec<String>) -> Result<()> {
        self.send(Command::Prefer(edges)).await
    }

    /// Invalidate queued work and return the tracker to Idle
    ///
    /// Never blocks: when the queue is full the worker is busy and applies
    /// the new epoch before its next command.
    pub fn reset(&self) -> Result<()> {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("location service reset, epoch {}", epoch);
        match self.tx.try_send(Command::Reset) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(closed()),
        }
    }

    /// Wait until every command queued so far has been handled
    pub async fn sync(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Sync(tx)).await?;
        rx.await.map_err(|_| closed())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        // the worker may already be gone
        let _ = self.tx.send(Command::Stop).await;
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| NavError::InvalidState(format!("location worker failed: {}", e)))?;
        }
        info!("location service stopped");
        Ok(())
    }

    pub fn snapshot(&self) -> Result<TrackerSnapshot> {
        self.shared
            .snapshot
            .lock()
            .map(|s| s.clone())
            .map_err(|_| NavError::InvalidState("tracker snapshot lock poisoned".to_string()))
    }

    pub fn subscribe_locations(&self) -> Subscription<Location> {
        self.shared.locations.subscribe()
    }

    pub fn subscribe_orientations(&self) -> Subscription<OrientationUpdate> {
        self.shared.orientations.subscribe()
    }

    pub fn subscribe_events(&self) -> Subscription<TrackerEvent> {
        self.shared.events.subscribe()
    }

    pub fn unsubscribe_locations(&self, id: u64) -> bool {
        self.shared.locations.unsubscribe(id)
    }

    pub fn unsubscribe_orientations(&self, id: u64) -> bool {
        self.shared.orientations.unsubscribe(id)
    }

    pub fn unsubscribe_events(&self, id: u64) -> bool {
        self.shared.events.unsubscribe(id)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| closed())
    }
}

impl Drop for LocationService {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn closed() -> NavError {
    NavError::InvalidState("location service is not running".to_string())
}

async fn worker(
    mut rx: mpsc::Receiver<Command>,
    mut tracker: LocationTracker,
    map: Arc<TopoMap>,
    factory: Arc<LocalizerFactory>,
    shared: Arc<Shared>,
) {
    let mut applied = shared.epoch.load(Ordering::SeqCst);
    while let Some(command) = rx.recv().await {
        let current = shared.epoch.load(Ordering::SeqCst);
        if current != applied {
            debug!("applying epoch {} (was {})", current, applied);
            applied = current;
            tracker.reset();
            sync_state(&shared, &tracker);
        }
        match command {
            Command::Sample { epoch, sample } => {
                if epoch != current {
                    let stale = NavError::StaleResultDiscarded { epoch, current };
                    debug!("{}", stale);
                    shared.update(|s| s.dropped += 1);
                    continue;
                }
                let (step_map, step_factory) = (map.clone(), factory.clone());
                let step = tokio::task::spawn_blocking(move || {
                    let events = tracker.consume_sample(&step_map, &step_factory, &sample);
                    (tracker, events)
                })
                .await;
                let events = match step {
                    Ok((returned, events)) => {
                        tracker = returned;
                        events
                    }
                    Err(e) => {
                        warn!("localization step failed, stopping worker: {}", e);
                        break;
                    }
                };
                let current = shared.epoch.load(Ordering::SeqCst);
                if epoch != current {
                    debug!("{}", NavError::StaleResultDiscarded { epoch, current });
                    shared.update(|s| s.dropped += 1);
                    continue;
                }
                publish(&shared, &events);
                shared.update(|s| {
                    s.samples += 1;
                    s.epoch = epoch;
                    s.state = tracker.state().clone();
                    s.location = tracker.current_location().cloned();
                });
            }
            Command::InitFloor { epoch, floor, reply } => {
                let result = if epoch != current {
                    Err(NavError::StaleResultDiscarded { epoch, current })
                } else {
                    tracker.init_localization(&factory, floor)
                };
                if let Err(e) = &result {
                    warn!("floor {} search not started: {}", floor, e);
                }
                sync_state(&shared, &tracker);
                let _ = reply.send(result);
            }
            Command::InitEdge { epoch, edge_id, reply } => {
                let result = if epoch != current {
                    Err(NavError::StaleResultDiscarded { epoch, current })
                } else {
                    tracker.init_localization_on_edge(&factory, &edge_id)
                };
                if let Err(e) = &result {
                    warn!("edge {} search not started: {}", edge_id, e);
                }
                sync_state(&shared, &tracker);
                let _ = reply.send(result);
            }
            Command::Orientation { orientation, timestamp } => {
                let event = tracker.initialize_orientation(orientation, timestamp);
                publish(&shared, &[event]);
            }
            Command::Prefer(edges) => tracker.set_preferred_edges(edges),
            // the epoch check above did the work
            Command::Reset => {}
            Command::Sync(reply) => {
                let _ = reply.send(());
            }
            Command::Stop => {
                tracker.stop();
                sync_state(&shared, &tracker);
                break;
            }
        }
    }
}

fn sync_state(shared: &Shared, tracker: &LocationTracker) {
    let epoch = shared.epoch.load(Ordering::SeqCst);
    shared.update(|s| {
        s.epoch = epoch;
        s.state = tracker.state().clone();
        s.location = tracker.current_location().cloned();
    });
}

fn publish(shared: &Shared, events: &[TrackerEvent]) {
    for event in events {
        match event {
            TrackerEvent::Location(location) => {
                shared.locations.publish(location);
            }
            TrackerEvent::Orientation(update) => {
                shared.orientations.publish(update);
            }
            _ => {}
        }
        shared.events.publish(event);
    }
}
