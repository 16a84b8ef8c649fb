//! Error types for the navigation engine

use thiserror::Error;

/// Navigation engine error type
#[derive(Error, Debug)]
pub enum NavError {
    /// A node or edge referenced by the graph does not exist, or ids collide.
    #[error("Graph integrity error: {0}")]
    GraphIntegrity(String),

    #[error("No route from {from} to {to}")]
    NotReachable { from: String, to: String },

    #[error("Heap is empty")]
    EmptyHeap,

    #[error("Failed to build localizer {id}: {reason}")]
    LocalizerConstruction { id: String, reason: String },

    #[error("Localization confidence stayed low for {seconds:.1}s")]
    LowConfidenceTimeout { seconds: f64 },

    #[error("Stale result discarded (epoch {epoch}, current {current})")]
    StaleResultDiscarded { epoch: u64, current: u64 },

    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NavError {
    pub(crate) fn localizer(id: &str, reason: impl Into<String>) -> Self {
        NavError::LocalizerConstruction {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the caller can fall back (replan, widen search) instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NavError::NotReachable { .. }
                | NavError::LocalizerConstruction { .. }
                | NavError::LowConfidenceTimeout { .. }
                | NavError::StaleResultDiscarded { .. }
                | NavError::UnknownLocation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
