//! sesslock Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all sesslock components:
//! - Error type and result alias
//! - Storage key derivation for session and lock records
//! - Session settings

pub mod error;
pub mod keys;
pub mod settings;

// Re-exports for convenience
pub use error::{Result, SessionError};
pub use keys::{lock_key, md5_hex, record_key};
pub use settings::{ArrayCompat, SessionSettings};
