//! sesslock Store - session records as hashes of encoded fields
//!
//! A session record is one hash keyed `sess:<md5(name)>:<id>`. Each hash field
//! holds one top-level session value packed by a [`Codec`]; a reserved touch
//! marker field tells a freshly created record apart from an existing one.

pub mod codec;
mod field_store;

pub use codec::{Codec, JsonCodec};
pub use field_store::{FieldStore, RecordState, TOUCH_MARKER};
