//! Application use cases. Orchestrate domain logic via ports.

pub mod broadcast_service;
pub mod broadcast_store;
pub mod dispatcher;
pub mod scheduler;
pub mod scheduler_driver;

pub use broadcast_service::BroadcastService;
pub use broadcast_store::BroadcastStore;
pub use dispatcher::{DispatchPolicy, Dispatcher};
pub use scheduler::{Scheduler, is_overdue};
pub use scheduler_driver::{CycleReport, SchedulerDriver};
