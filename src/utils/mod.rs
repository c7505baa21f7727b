//!
//! Utility module for the multi-wallet sync engine.
//!
//! Re-exports time, formatting and locking helpers used throughout the codebase.
/// Clock, formatting and mutex helpers
pub mod index;

pub use index::{format_seconds, lock, unix_now};
