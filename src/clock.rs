use std::sync::RwLock;

use chrono::NaiveDateTime;

/// Injectable time source. The engine and ticker never read the wall clock
/// directly, so tests can drive time without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall-clock time in the local timezone.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
pub struct ManualClock {
    now: RwLock<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.write().expect("clock poisoned") = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.write().expect("clock poisoned");
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read().expect("clock poisoned")
    }
}
