use chrono::NaiveDate;

use crate::model::*;

use super::conflict::find_conflict;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Pre-flight for create/edit: is the window free for this space?
    /// Pass `exclude` when checking on behalf of an existing reservation.
    pub async fn check_availability(
        &self,
        space: SpaceId,
        window: Window,
        exclude: Option<ReservationId>,
    ) -> Result<bool, EngineError> {
        if window.start >= window.end {
            return Err(EngineError::Validation("start must be before end"));
        }
        Ok(find_conflict(&*self.store, space, &window, exclude)
            .await?
            .is_none())
    }

    /// Active reservations that would block a professor from being booked
    /// elsewhere in the same window. Informational — create does not
    /// enforce it.
    pub async fn professor_has_conflict(
        &self,
        professor: ProfessorId,
        window: Window,
    ) -> Result<bool, EngineError> {
        let rows = self.store.list_active_by_professor(professor).await?;
        Ok(rows.iter().any(|r| r.window.overlaps(&window)))
    }

    /// All non-cancelled reservations, ordered by date then start time.
    pub async fn list_active(&self) -> Result<Vec<Reservation>, EngineError> {
        Ok(self.store.list_active().await?)
    }

    pub async fn list_by_professor(
        &self,
        professor: ProfessorId,
    ) -> Result<Vec<Reservation>, EngineError> {
        Ok(self.store.list_active_by_professor(professor).await?)
    }

    pub async fn list_for_space_date(
        &self,
        space: SpaceId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        Ok(self.store.list_active_for_space_date(space, date).await?)
    }
}
