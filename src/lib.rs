//! Booking availability and conflict resolution for per-day rentals.
//!
//! Owners list items, renters reserve date ranges, paying per night. The
//! engine keeps one calendar per item (owner blackout periods plus
//! bookings in every lifecycle status), answers availability queries,
//! rejects overlapping reservations under concurrent access, and drives
//! each booking from request through payment or owner approval to
//! completion. Every accepted change is event-sourced to a write-ahead
//! log and replayed on startup.
//!
//! The item catalog and the payment processor are external collaborators
//! behind the [`catalog::ItemCatalog`] and [`payment::PaymentGateway`]
//! traits. Long-running concerns (time-driven status transitions, WAL
//! compaction) are spawnable tasks in [`sweep`].

pub mod catalog;
pub mod engine;
mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod payment;
pub mod sweep;
pub mod wal;
