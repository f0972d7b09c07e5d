//! Identity adapters. Implement AuthPort.

pub mod static_token;

pub use static_token::StaticTokenAuth;
