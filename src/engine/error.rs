use ulid::Ulid;

use crate::model::{ReservationId, ReservationStatus};
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Referenced reservation or space does not exist.
    NotFound(Ulid),
    /// Malformed input; the caller must correct it, never retry as-is.
    Validation(&'static str),
    /// Requested window overlaps an active reservation for the same space.
    /// `conflicting` is the blocking reservation when known.
    Conflict { conflicting: Option<ReservationId> },
    /// The operation is not legal from the reservation's current status.
    InvalidTransition {
        from: ReservationStatus,
        action: &'static str,
    },
    /// Cancellation attempted inside the configured lead-time window.
    /// Distinct from `InvalidTransition`: the status allows cancelling,
    /// the policy clock does not.
    CancelLeadTime { minutes: i64 },
    /// Space exists but is not open for booking.
    SpaceDisabled(Ulid),
    /// Transient persistence failure; safe to retry with backoff.
    StoreUnavailable(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::Conflict { conflicting: Some(id) } => {
                write!(f, "window conflicts with reservation {id}")
            }
            EngineError::Conflict { conflicting: None } => {
                write!(f, "window conflicts with an existing reservation")
            }
            EngineError::InvalidTransition { from, action } => {
                write!(f, "cannot {action} a {from} reservation")
            }
            EngineError::CancelLeadTime { minutes } => {
                write!(f, "cancellation closes {minutes} minutes before start")
            }
            EngineError::SpaceDisabled(id) => write!(f, "space {id} is disabled"),
            EngineError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            // The store-level exclusion backstop surfaces as the same kind
            // as the engine's own pre-check.
            StoreError::Exclusion { conflicting } => EngineError::Conflict {
                conflicting: Some(conflicting),
            },
            // A lost compare-and-set means another writer changed the status
            // first; report the transition against what the row holds now.
            StoreError::StaleStatus { actual } => EngineError::InvalidTransition {
                from: actual,
                action: "update",
            },
            StoreError::AlreadyExists(id) => {
                EngineError::StoreUnavailable(format!("duplicate id {id}"))
            }
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
        }
    }
}
