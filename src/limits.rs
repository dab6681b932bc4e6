//! Input-size guards. Kept in one place so every validation path agrees.

/// Longest accepted free-text purpose (mirrors the 500-char storage column).
pub const MAX_PURPOSE_LEN: usize = 500;

/// How far into the future a reservation may be placed, in days.
pub const MAX_BOOKING_HORIZON_DAYS: i64 = 365;

/// Upper bound on reservations one ticker scan will process. A batch larger
/// than this is truncated and picked up again on the next tick.
pub const MAX_TICK_BATCH: usize = 10_000;
