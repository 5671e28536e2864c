//! sesslock Consistency - advisory locking over a shared store
//!
//! Locks are advisory: the store enforces nothing, every writer is expected to
//! take the lock guarding a field before mutating it.

pub mod lock;

// Re-export lock types
pub use lock::{LockOptions, LockService, LockStats, LockValue, default_owner};
