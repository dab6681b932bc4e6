mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::store::{ReservationStore, SpaceDirectory};

/// Business policy knobs. Programmatic construction is the primary path;
/// `from_env` exists for binaries that configure through the environment.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Minutes after a reservation's end before the ticker auto-confirms it.
    pub grace_minutes: i64,
    /// Minimum minutes before start by which a scheduled reservation must be
    /// cancelled. 0 disables the restriction.
    pub cancel_lead_minutes: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            grace_minutes: 30,
            cancel_lead_minutes: 0,
        }
    }
}

impl Policy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            grace_minutes: std::env::var("SALAS_GRACE_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.grace_minutes),
            cancel_lead_minutes: std::env::var("SALAS_CANCEL_LEAD_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cancel_lead_minutes),
        }
    }

    pub fn grace(&self) -> Duration {
        Duration::minutes(self.grace_minutes)
    }

    pub fn cancel_lead(&self) -> Duration {
        Duration::minutes(self.cancel_lead_minutes)
    }
}

/// Reservation orchestrator: validates input, runs the conflict pre-check,
/// consults the transition table, and persists through the store. The store
/// is the authoritative guard against racing writers; the engine's own
/// conflict check is a fast pre-flight.
pub struct Engine {
    pub(crate) store: Arc<dyn ReservationStore>,
    pub(crate) spaces: Arc<dyn SpaceDirectory>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: Policy,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        spaces: Arc<dyn SpaceDirectory>,
        clock: Arc<dyn Clock>,
        policy: Policy,
    ) -> Self {
        Self {
            store,
            spaces,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}
