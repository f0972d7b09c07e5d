//! Port traits. API boundaries for the hexagon.
//!
//! - Inbound: Called by the presentation layer into the application
//! - Outbound: Called by application into infrastructure

pub mod inbound;
pub mod outbound;

pub use inbound::DashboardPort;
pub use outbound::{AuthPort, ChatDirectory, Clock, MessageTransport, SnapshotPort};
