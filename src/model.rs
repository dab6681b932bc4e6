use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type ReservationId = Ulid;
pub type SpaceId = Ulid;
pub type ProfessorId = Ulid;

/// Half-open booking window `[start, end)` on a single calendar date.
/// All times are naive local time — the system is single-timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Window {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { date, start, end }
    }

    /// Two windows conflict iff they are on the same date and the half-open
    /// time ranges intersect. A window ending exactly when another starts
    /// does not overlap.
    pub fn overlaps(&self, other: &Window) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }

    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start)
    }

    pub fn end_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end)
    }
}

/// Reservation lifecycle. `Scheduled` is initial; `Used` and `Cancelled`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Scheduled,
    InUse,
    AwaitingConfirmation,
    Used,
    Cancelled,
}

/// What causes a status change. Time triggers fire from the ticker;
/// user triggers fire from explicit engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// now >= window.start
    ReachedStart,
    /// now >= window.end
    ReachedEnd,
    /// now >= window.end + grace period
    GraceElapsed,
    UserCancel,
    UserConfirm,
}

/// The full legal-transition table. Every status predicate and every
/// transition applied anywhere in the crate derives from this table —
/// nothing else encodes which moves are legal.
pub const TRANSITIONS: &[(ReservationStatus, Trigger, ReservationStatus)] = &[
    (ReservationStatus::Scheduled, Trigger::ReachedStart, ReservationStatus::InUse),
    (ReservationStatus::Scheduled, Trigger::UserCancel, ReservationStatus::Cancelled),
    (ReservationStatus::InUse, Trigger::ReachedEnd, ReservationStatus::AwaitingConfirmation),
    (ReservationStatus::InUse, Trigger::UserCancel, ReservationStatus::Cancelled),
    (ReservationStatus::InUse, Trigger::UserConfirm, ReservationStatus::Used),
    (ReservationStatus::AwaitingConfirmation, Trigger::UserConfirm, ReservationStatus::Used),
    (ReservationStatus::AwaitingConfirmation, Trigger::GraceElapsed, ReservationStatus::Used),
];

impl ReservationStatus {
    /// Target state for `trigger` from this state, or None if the table
    /// has no such row.
    pub fn next(self, trigger: Trigger) -> Option<ReservationStatus> {
        TRANSITIONS
            .iter()
            .find(|(from, t, _)| *from == self && *t == trigger)
            .map(|(_, _, to)| *to)
    }

    /// A state is terminal when no table row leaves it.
    pub fn is_terminal(self) -> bool {
        TRANSITIONS.iter().all(|(from, _, _)| *from != self)
    }

    /// Active = counts for conflict detection (everything except Cancelled).
    pub fn is_active(self) -> bool {
        self != ReservationStatus::Cancelled
    }

    pub fn can_cancel(self) -> bool {
        self.next(Trigger::UserCancel).is_some()
    }

    pub fn can_confirm(self) -> bool {
        self.next(Trigger::UserConfirm).is_some()
    }

    /// The window is immutable once the reservation has started.
    pub fn can_edit(self) -> bool {
        self == ReservationStatus::Scheduled
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReservationStatus::Scheduled => "scheduled",
            ReservationStatus::InUse => "in_use",
            ReservationStatus::AwaitingConfirmation => "awaiting_confirmation",
            ReservationStatus::Used => "used",
            ReservationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Time-triggered step for one reservation, at most one per call.
/// Guarded by the current state rather than elapsed-time deltas, so
/// re-applying with an unchanged reservation is a no-op.
pub fn due_transition(
    status: ReservationStatus,
    window: &Window,
    now: NaiveDateTime,
    grace: Duration,
) -> Option<ReservationStatus> {
    let trigger = match status {
        ReservationStatus::Scheduled if now >= window.start_at() => Trigger::ReachedStart,
        ReservationStatus::InUse if now >= window.end_at() => Trigger::ReachedEnd,
        ReservationStatus::AwaitingConfirmation if now >= window.end_at() + grace => {
            Trigger::GraceElapsed
        }
        _ => return None,
    };
    status.next(trigger)
}

/// A space reservation. Timestamps are set by the engine, never by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub space_id: SpaceId,
    pub professor_id: ProfessorId,
    pub window: Window,
    pub purpose: Option<String>,
    pub status: ReservationStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub used_at: Option<NaiveDateTime>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
