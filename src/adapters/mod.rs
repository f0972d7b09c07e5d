//! Infrastructure adapters. Implement outbound ports.
//!
//! Identity, chat directory, transport, persistence, clock. Map errors to DomainError.

pub mod auth;
pub mod clock;
pub mod directory;
pub mod persistence;
pub mod transport;
