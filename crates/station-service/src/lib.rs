//! Station Service
//!
//! The two station operations and the classifier that turns storage faults
//! into caller-facing error strings. Failures are returned in-band: every
//! call produces a reply, and callers inspect its `error` field.

mod classifier;
mod service;

pub use classifier::classify;
pub use service::{
    RecordTempsReply, RecordTempsRequest, StationMaxReply, StationMaxRequest, StationService,
};
