use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::store::StoreError;

use super::conflict::{find_conflict, validate_purpose, validate_window};
use super::{Engine, EngineError};

impl Engine {
    /// Create a new reservation. Rejects past dates, inverted windows,
    /// disabled spaces, and overlapping windows; on success the reservation
    /// starts out Scheduled.
    pub async fn create(
        &self,
        space_id: SpaceId,
        professor_id: ProfessorId,
        window: Window,
        purpose: Option<String>,
    ) -> Result<Reservation, EngineError> {
        let now = self.clock.now();
        validate_window(&window, now)?;
        validate_purpose(purpose.as_deref())?;

        if !self.spaces.is_enabled(space_id).await? {
            return Err(EngineError::SpaceDisabled(space_id));
        }

        // Best-effort pre-flight; the store's exclusion constraint is the
        // authoritative check under concurrency.
        if let Some(conflicting) = find_conflict(&*self.store, space_id, &window, None).await? {
            metrics::counter!(observability::CONFLICTS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                conflicting: Some(conflicting),
            });
        }

        let reservation = Reservation {
            id: Ulid::new(),
            space_id,
            professor_id,
            window,
            purpose,
            status: ReservationStatus::Scheduled,
            created_at: now,
            updated_at: None,
            used_at: None,
        };

        if let Err(e) = self.store.insert(reservation.clone()).await {
            let e: EngineError = e.into();
            if matches!(e, EngineError::Conflict { .. }) {
                metrics::counter!(observability::CONFLICTS_REJECTED_TOTAL).increment(1);
            }
            return Err(e);
        }

        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            id = %reservation.id,
            space = %space_id,
            date = %window.date,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Reschedule a reservation that has not started yet. Runs the same
    /// validation as `create`, with the reservation's own id excluded from
    /// the conflict check.
    pub async fn edit(
        &self,
        id: ReservationId,
        window: Window,
        purpose: Option<String>,
    ) -> Result<Reservation, EngineError> {
        let current = self
            .store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;

        if !current.status.can_edit() {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                action: "edit",
            });
        }

        let now = self.clock.now();
        validate_window(&window, now)?;
        validate_purpose(purpose.as_deref())?;

        if !self.spaces.is_enabled(current.space_id).await? {
            return Err(EngineError::SpaceDisabled(current.space_id));
        }

        if let Some(conflicting) =
            find_conflict(&*self.store, current.space_id, &window, Some(id)).await?
        {
            metrics::counter!(observability::CONFLICTS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                conflicting: Some(conflicting),
            });
        }

        let updated = self.store.update_window(id, window, purpose, now).await?;
        info!(id = %id, date = %window.date, "reservation rescheduled");
        Ok(updated)
    }

    /// Cancel a reservation. The transition table decides from which states;
    /// the lead-time policy can additionally close cancellation shortly
    /// before start, surfaced as its own error kind.
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let current = self
            .store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;

        let Some(next) = current.status.next(Trigger::UserCancel) else {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                action: "cancel",
            });
        };

        let now = self.clock.now();
        if self.policy.cancel_lead_minutes > 0
            && current.status == ReservationStatus::Scheduled
            && now + self.policy.cancel_lead() > current.window.start_at()
        {
            return Err(EngineError::CancelLeadTime {
                minutes: self.policy.cancel_lead_minutes,
            });
        }

        let updated = match self.store.update_status(id, current.status, next, now, None).await {
            Err(StoreError::StaleStatus { actual }) => {
                return Err(EngineError::InvalidTransition {
                    from: actual,
                    action: "cancel",
                });
            }
            other => other?,
        };
        info!(id = %id, from = %current.status, "reservation cancelled");
        Ok(updated)
    }

    /// Explicit usage confirmation, legal while in use or awaiting
    /// confirmation. Sets `used_at`.
    pub async fn confirm_usage(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let current = self
            .store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;

        let Some(next) = current.status.next(Trigger::UserConfirm) else {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                action: "confirm usage",
            });
        };

        let now = self.clock.now();
        let updated = match self
            .store
            .update_status(id, current.status, next, now, Some(now))
            .await
        {
            Err(StoreError::StaleStatus { actual }) => {
                return Err(EngineError::InvalidTransition {
                    from: actual,
                    action: "confirm usage",
                });
            }
            other => other?,
        };
        info!(id = %id, from = %current.status, "usage confirmed");
        Ok(updated)
    }
}
