//! sesslock Path - nested path addressing
//!
//! Paths are delimiter-separated strings whose first segment names a session
//! field and whose remaining segments walk into that field's value.

mod addressor;
mod segment;

pub use addressor::{DEFAULT_DELIMITER, PathAddressor, is_empty_value};
pub use segment::Segment;
