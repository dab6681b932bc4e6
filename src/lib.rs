//! Core of an academic-space reservation system: conflict detection over
//! half-open booking windows, a table-driven status lifecycle, and a
//! background ticker that advances reservations as wall-clock time passes.
//!
//! Routing, authentication, and user/space CRUD live outside this crate;
//! they talk to the [`engine::Engine`] and implement the
//! [`store::ReservationStore`] / [`store::SpaceDirectory`] traits.

pub mod clock;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod store;
pub mod ticker;

pub use engine::{Engine, EngineError, Policy};
pub use model::{Reservation, ReservationStatus, Window};
