//! Distributed advisory lock
//!
//! This module provides:
//! - Lock value model and acquire options
//! - Lock service with steal-on-expiry and owner-checked release

mod model;
mod service;

pub use model::*;
pub use service::*;
