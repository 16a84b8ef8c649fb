//! Indoor turn-by-turn navigation engine
//!
//! A topological map of walkable edges, per-edge localizers fed by beacon
//! and inertial samples, a current-location state machine that follows the
//! user from edge to edge, and an instruction state machine that turns a
//! planned route into announcements.

pub mod config;
pub mod error;
pub mod geometry;
pub mod localization;
pub mod location;
pub mod navigation;
pub mod replay;
pub mod status;
pub mod topo;
pub mod types;

pub use config::NavConfig;
pub use error::{NavError, Result};
pub use navigation::{NavEvent, NavSession};
pub use topo::{Location, TopoMap};
