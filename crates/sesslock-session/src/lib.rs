//! sesslock Session - lock-aware session access by dotted path
//!
//! [`SessionCoordinator`] ties a host's session lifecycle to a shared record:
//! values are addressed by path, stored per top-level field, and guarded by
//! per-field advisory locks so concurrent requests on one session do not
//! clobber each other.

pub mod host;
mod coordinator;

pub use coordinator::{LockedFuture, SessionCoordinator};
pub use host::{SessionHost, StaticSessionHost};
