//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod entities;
pub mod errors;
pub mod recurrence;
pub mod views;

pub use entities::{
    Broadcast, BroadcastId, BroadcastSpec, BroadcastStatus, Chat, ChatFailure, ChatId, ChatKind,
    DeliveryMode, DeliveryStats, Identity, MAX_RUN_HISTORY, Outcome, Recurrence, RunRecord,
    RunStatus,
};
pub use errors::{DomainError, TransportError};
pub use recurrence::{compute_next_run, next_run_after};
pub use views::{ChatQuery, ListFilter, ListOrder, Overview, ScheduledEntry};
