//! Persistence adapters. Implement SnapshotPort.

pub mod json_snapshot;

pub use json_snapshot::JsonSnapshot;
