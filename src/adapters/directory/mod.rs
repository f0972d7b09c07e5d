//! Chat directory adapters. Implement ChatDirectory.

pub mod cached;
pub mod catalog;

pub use cached::CachedChatDirectory;
pub use catalog::{JsonChatDirectory, StaticChatDirectory};
