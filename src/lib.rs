//! tg-broadcaster: broadcast scheduling and delivery tracking with Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
