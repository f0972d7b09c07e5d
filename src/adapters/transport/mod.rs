//! Message transport adapters. Implement MessageTransport.
//!
//! No real messenger client here: a local outbox for development and a scripted double.

pub mod outbox;
pub mod scripted;

pub use outbox::{OutboxEntry, OutboxTransport};
pub use scripted::{ScriptedTransport, SendScript};
