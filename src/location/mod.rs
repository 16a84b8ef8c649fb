//! Current-location tracking on top of the per-edge localizers

pub mod events;
pub mod service;
pub mod tracker;

pub use events::{Broadcast, Subscription};
pub use service::{LocationService, TrackerSnapshot};
pub use tracker::{LocationTracker, OrientationUpdate, SearchMode, TrackerEvent, TrackerState};
