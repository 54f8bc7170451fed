//! deskbook — office space-booking engine.
//!
//! Decides whether a requested time slot for a space can be booked, computes
//! the free/busy breakdown of a space's day, and drives the check-in /
//! check-out lifecycle of a reservation. State lives in memory behind
//! per-space locks and is made durable through an append-only WAL; every
//! occupancy change is announced through a pluggable notification sink.

pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod wal;
