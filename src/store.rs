use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

/// Errors raised at the persistence boundary.
#[derive(Debug)]
pub enum StoreError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The exclusion constraint rejected a write that would leave two
    /// overlapping active reservations on one (space, date).
    Exclusion { conflicting: ReservationId },
    /// Status compare-and-set failed: the row's current status is `actual`,
    /// not the one the writer expected. A concurrent writer got there first.
    StaleStatus { actual: ReservationStatus },
    /// Transient infrastructure failure; safe to retry.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            StoreError::Exclusion { conflicting } => {
                write!(f, "exclusion constraint violated by reservation {conflicting}")
            }
            StoreError::StaleStatus { actual } => {
                write!(f, "status changed concurrently, now {actual}")
            }
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persisted collection of reservations.
///
/// Contract beyond plain CRUD: `insert` and `update_window` must enforce the
/// no-overlap exclusion for the affected `(space, date)` atomically — the
/// engine's conflict pre-check is best-effort only, and two racing writers
/// must not both succeed with overlapping windows.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Insert a new reservation under the exclusion guarantee.
    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError>;

    /// Replace window and purpose of an existing reservation, enforcing the
    /// exclusion guarantee while ignoring the reservation itself.
    async fn update_window(
        &self,
        id: ReservationId,
        window: Window,
        purpose: Option<String>,
        updated_at: NaiveDateTime,
    ) -> Result<Reservation, StoreError>;

    /// Atomic compare-and-set status update. Writes only when the row's
    /// current status equals `from`; otherwise fails with `StaleStatus` and
    /// leaves the row untouched, so a writer holding a stale snapshot can
    /// never move a status backward. `used_at` is written only when Some.
    async fn update_status(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
        updated_at: NaiveDateTime,
        used_at: Option<NaiveDateTime>,
    ) -> Result<Reservation, StoreError>;

    /// Non-cancelled reservations for a space on a date, any order.
    async fn list_active_for_space_date(
        &self,
        space: SpaceId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Reservations whose status is in `statuses` (the ticker scan).
    async fn list_by_status(
        &self,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Non-cancelled reservations for one professor, ordered by date then start.
    async fn list_active_by_professor(
        &self,
        professor: ProfessorId,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// All non-cancelled reservations, ordered by date then start.
    async fn list_active(&self) -> Result<Vec<Reservation>, StoreError>;
}

/// External collaborator that knows which spaces exist and whether they are
/// open for booking.
#[async_trait]
pub trait SpaceDirectory: Send + Sync {
    /// Whether the space is enabled for booking. `NotFound` for unknown ids.
    async fn is_enabled(&self, space: SpaceId) -> Result<bool, StoreError>;
}

type DayKey = (SpaceId, NaiveDate);
type DayBucket = Arc<RwLock<Vec<ReservationId>>>;

/// In-memory store. The per-`(space, date)` bucket RwLock is the exclusion
/// mechanism: every write that can change a day's active windows runs under
/// that bucket's write lock and re-checks overlap inside the critical
/// section, so a conflicting writer that slipped past the engine's pre-check
/// is still rejected here.
pub struct MemoryStore {
    rows: DashMap<ReservationId, Reservation>,
    days: DashMap<DayKey, DayBucket>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            days: DashMap::new(),
        }
    }

    fn bucket(&self, key: DayKey) -> DayBucket {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .clone()
    }

    /// Overlap re-check against a locked bucket. Caller holds the write lock.
    fn check_exclusion(
        &self,
        bucket_ids: &[ReservationId],
        window: &Window,
        exclude: Option<ReservationId>,
    ) -> Result<(), StoreError> {
        for id in bucket_ids {
            if Some(*id) == exclude {
                continue;
            }
            if let Some(existing) = self.rows.get(id)
                && existing.is_active()
                && existing.window.overlaps(window)
            {
                return Err(StoreError::Exclusion { conflicting: *id });
            }
        }
        Ok(())
    }

    fn sorted_active(&self, mut rows: Vec<Reservation>) -> Vec<Reservation> {
        rows.sort_by_key(|r| (r.window.date, r.window.start));
        rows
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.rows.get(&id).map(|r| r.value().clone()))
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError> {
        if self.rows.contains_key(&reservation.id) {
            return Err(StoreError::AlreadyExists(reservation.id));
        }
        let key = (reservation.space_id, reservation.window.date);
        let bucket = self.bucket(key);
        let mut guard = bucket.write().await;

        self.check_exclusion(&guard, &reservation.window, None)?;

        guard.push(reservation.id);
        self.rows.insert(reservation.id, reservation);
        Ok(())
    }

    async fn update_window(
        &self,
        id: ReservationId,
        window: Window,
        purpose: Option<String>,
        updated_at: NaiveDateTime,
    ) -> Result<Reservation, StoreError> {
        let current = self
            .rows
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(id))?;

        let old_key = (current.space_id, current.window.date);
        let new_key = (current.space_id, window.date);

        // The overlap re-check and the row mutation form one critical
        // section; the bucket lock stays held across both.
        if old_key == new_key {
            let bucket = self.bucket(new_key);
            let _guard = bucket.write().await;
            self.check_exclusion(&_guard, &window, Some(id))?;
            let mut entry = self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            entry.window = window;
            entry.purpose = purpose;
            entry.updated_at = Some(updated_at);
            Ok(entry.clone())
        } else {
            // Crossing day buckets: take both locks in key order so two
            // concurrent cross-day edits cannot deadlock.
            let (first_key, second_key) = if old_key < new_key {
                (old_key, new_key)
            } else {
                (new_key, old_key)
            };
            let first = self.bucket(first_key);
            let second = self.bucket(second_key);
            let mut first_guard = first.write().await;
            let mut second_guard = second.write().await;

            let new_guard = if new_key == first_key {
                &mut first_guard
            } else {
                &mut second_guard
            };
            self.check_exclusion(new_guard, &window, Some(id))?;
            new_guard.push(id);

            let old_guard = if old_key == first_key {
                &mut first_guard
            } else {
                &mut second_guard
            };
            old_guard.retain(|r| *r != id);

            let mut entry = self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            entry.window = window;
            entry.purpose = purpose;
            entry.updated_at = Some(updated_at);
            Ok(entry.clone())
        }
    }

    async fn update_status(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
        updated_at: NaiveDateTime,
        used_at: Option<NaiveDateTime>,
    ) -> Result<Reservation, StoreError> {
        let mut entry = self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if entry.status != from {
            return Err(StoreError::StaleStatus {
                actual: entry.status,
            });
        }
        entry.status = to;
        entry.updated_at = Some(updated_at);
        if used_at.is_some() {
            entry.used_at = used_at;
        }
        Ok(entry.clone())
    }

    async fn list_active_for_space_date(
        &self,
        space: SpaceId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError> {
        let Some(bucket) = self.days.get(&(space, date)).map(|b| b.value().clone()) else {
            return Ok(Vec::new());
        };
        let guard = bucket.read().await;
        Ok(guard
            .iter()
            .filter_map(|id| self.rows.get(id).map(|r| r.value().clone()))
            .filter(|r| r.is_active())
            .collect())
    }

    async fn list_by_status(
        &self,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|r| statuses.contains(&r.status))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn list_active_by_professor(
        &self,
        professor: ProfessorId,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = self
            .rows
            .iter()
            .filter(|r| r.professor_id == professor && r.is_active())
            .map(|r| r.value().clone())
            .collect();
        Ok(self.sorted_active(rows))
    }

    async fn list_active(&self) -> Result<Vec<Reservation>, StoreError> {
        let rows = self
            .rows
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.value().clone())
            .collect();
        Ok(self.sorted_active(rows))
    }
}

/// In-memory space directory for tests and embedders without a real one.
pub struct MemorySpaces {
    spaces: DashMap<SpaceId, bool>,
}

impl MemorySpaces {
    pub fn new() -> Self {
        Self {
            spaces: DashMap::new(),
        }
    }

    pub fn add(&self, space: SpaceId, enabled: bool) {
        self.spaces.insert(space, enabled);
    }

    pub fn set_enabled(&self, space: SpaceId, enabled: bool) {
        if let Some(mut e) = self.spaces.get_mut(&space) {
            *e = enabled;
        }
    }
}

impl Default for MemorySpaces {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpaceDirectory for MemorySpaces {
    async fn is_enabled(&self, space: SpaceId) -> Result<bool, StoreError> {
        self.spaces
            .get(&space)
            .map(|e| *e)
            .ok_or(StoreError::NotFound(space))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn reservation(space: SpaceId, sh: u32, eh: u32) -> Reservation {
        Reservation {
            id: Ulid::new(),
            space_id: space,
            professor_id: Ulid::new(),
            window: Window::new(date(), t(sh, 0), t(eh, 0)),
            purpose: None,
            status: ReservationStatus::Scheduled,
            created_at: date().and_time(t(8, 0)),
            updated_at: None,
            used_at: None,
        }
    }

    #[tokio::test]
    async fn insert_rejects_overlap() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        store.insert(reservation(space, 9, 10)).await.unwrap();

        let err = store.insert(reservation(space, 9, 11)).await.unwrap_err();
        assert!(matches!(err, StoreError::Exclusion { .. }));
    }

    #[tokio::test]
    async fn insert_allows_touching() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        store.insert(reservation(space, 9, 10)).await.unwrap();
        store.insert(reservation(space, 10, 11)).await.unwrap();
    }

    #[tokio::test]
    async fn insert_allows_other_space() {
        let store = MemoryStore::new();
        store.insert(reservation(Ulid::new(), 9, 10)).await.unwrap();
        store.insert(reservation(Ulid::new(), 9, 10)).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_frees_the_slot() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        let first = reservation(space, 9, 10);
        let first_id = first.id;
        store.insert(first).await.unwrap();

        store
            .update_status(
                first_id,
                ReservationStatus::Scheduled,
                ReservationStatus::Cancelled,
                date().and_time(t(8, 30)),
                None,
            )
            .await
            .unwrap();

        store.insert(reservation(space, 9, 10)).await.unwrap();
    }

    #[tokio::test]
    async fn update_window_excludes_self() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        let r = reservation(space, 9, 10);
        let id = r.id;
        let window = r.window;
        store.insert(r).await.unwrap();

        // Same window: must not conflict with itself.
        let updated = store
            .update_window(id, window, Some("seminar".into()), date().and_time(t(8, 30)))
            .await
            .unwrap();
        assert_eq!(updated.purpose.as_deref(), Some("seminar"));
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn update_window_rejects_overlap_with_other() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        store.insert(reservation(space, 9, 10)).await.unwrap();
        let second = reservation(space, 10, 11);
        let second_id = second.id;
        store.insert(second).await.unwrap();

        let err = store
            .update_window(
                second_id,
                Window::new(date(), t(9, 30), t(10, 30)),
                None,
                date().and_time(t(8, 30)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Exclusion { .. }));
    }

    #[tokio::test]
    async fn update_window_moves_across_dates() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        let r = reservation(space, 9, 10);
        let id = r.id;
        store.insert(r).await.unwrap();

        let other_date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        store
            .update_window(
                id,
                Window::new(other_date, t(9, 0), t(10, 0)),
                None,
                date().and_time(t(8, 30)),
            )
            .await
            .unwrap();

        // Old slot is free again, new date is taken.
        store.insert(reservation(space, 9, 10)).await.unwrap();
        assert_eq!(
            store
                .list_active_for_space_date(space, other_date)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn concurrent_inserts_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let space = Ulid::new();
        let a = reservation(space, 9, 10);
        let b = reservation(space, 9, 10);

        let (ra, rb) = tokio::join!(store.insert(a), store.insert(b));
        assert_eq!(
            ra.is_ok() as u8 + rb.is_ok() as u8,
            1,
            "exactly one of two racing inserts must win"
        );
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        let r = reservation(space, 9, 10);
        let id = r.id;
        store.insert(r).await.unwrap();
        store.insert(reservation(space, 11, 12)).await.unwrap();

        store
            .update_status(
                id,
                ReservationStatus::Scheduled,
                ReservationStatus::InUse,
                date().and_time(t(9, 0)),
                None,
            )
            .await
            .unwrap();

        let in_use = store
            .list_by_status(&[ReservationStatus::InUse])
            .await
            .unwrap();
        assert_eq!(in_use.len(), 1);
        assert_eq!(in_use[0].id, id);

        let scanned = store
            .list_by_status(&[ReservationStatus::Scheduled, ReservationStatus::InUse])
            .await
            .unwrap();
        assert_eq!(scanned.len(), 2);
    }

    #[tokio::test]
    async fn update_status_unknown_id() {
        let store = MemoryStore::new();
        let err = store
            .update_status(
                Ulid::new(),
                ReservationStatus::Scheduled,
                ReservationStatus::Cancelled,
                date().and_time(t(9, 0)),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_status_is_compare_and_set() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        let r = reservation(space, 9, 10);
        let id = r.id;
        store.insert(r).await.unwrap();

        store
            .update_status(
                id,
                ReservationStatus::Scheduled,
                ReservationStatus::Cancelled,
                date().and_time(t(8, 30)),
                None,
            )
            .await
            .unwrap();

        // A writer still holding the Scheduled snapshot loses the race.
        let err = store
            .update_status(
                id,
                ReservationStatus::Scheduled,
                ReservationStatus::InUse,
                date().and_time(t(9, 0)),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleStatus {
                actual: ReservationStatus::Cancelled
            }
        ));

        let row = store.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, ReservationStatus::Cancelled);
        assert_eq!(row.updated_at, Some(date().and_time(t(8, 30))));
    }

    #[tokio::test]
    async fn list_active_ordered() {
        let store = MemoryStore::new();
        let space = Ulid::new();
        store.insert(reservation(space, 14, 15)).await.unwrap();
        store.insert(reservation(space, 9, 10)).await.unwrap();

        let all = store.list_active().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].window.start < all[1].window.start);
    }
}
