use chrono::NaiveDateTime;

use crate::limits::*;
use crate::model::*;
use crate::store::ReservationStore;

use super::EngineError;

/// Shape checks for a requested window. Inverted or empty windows are
/// rejected here, never silently corrected.
pub(crate) fn validate_window(window: &Window, now: NaiveDateTime) -> Result<(), EngineError> {
    if window.start >= window.end {
        return Err(EngineError::Validation("start must be before end"));
    }
    if window.date < now.date() {
        return Err(EngineError::Validation("date is in the past"));
    }
    if (window.date - now.date()).num_days() > MAX_BOOKING_HORIZON_DAYS {
        return Err(EngineError::Validation("date beyond booking horizon"));
    }
    Ok(())
}

pub(crate) fn validate_purpose(purpose: Option<&str>) -> Result<(), EngineError> {
    if let Some(p) = purpose
        && p.len() > MAX_PURPOSE_LEN
    {
        return Err(EngineError::Validation("purpose too long"));
    }
    Ok(())
}

/// First active reservation whose window overlaps the candidate, or None.
/// Assumes a well-formed window — shape validation happens in the caller.
/// `exclude` drops one reservation from the candidate set (the edit path,
/// so a reservation never conflicts with itself).
pub(crate) async fn find_conflict(
    store: &dyn ReservationStore,
    space: SpaceId,
    window: &Window,
    exclude: Option<ReservationId>,
) -> Result<Option<ReservationId>, EngineError> {
    let candidates = store.list_active_for_space_date(space, window.date).await?;
    Ok(candidates
        .iter()
        .find(|r| Some(r.id) != exclude && r.window.overlaps(window))
        .map(|r| r.id))
}
