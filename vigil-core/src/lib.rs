//! Core pipeline logic for Vigil
//!
//! Turns raw device telemetry (presence/sleep/posture monitors) into
//! deduplicated state records and time-bucketed aggregates. Everything in
//! this crate is pure logic: no sockets, no storage handles, no clocks
//! other than the injectable [`time::TimeSource`].
//!
//! The processing model:
//!
//! ```text
//! Envelope → decode → dedup vs cached state → day rollover → record
//!                                                              ↓
//!                      session report → daily rollup → weekly rollup
//! ```
//!
//! The IO side of the system (MQTT transport, caches, row stores,
//! notification senders) lives in `vigil-connectors` and drives these
//! functions from its worker pool.
//!
//! ```
//! use vigil_core::topic;
//!
//! assert!(topic::matches("device/+/state", "device/mac1/state"));
//! assert!(!topic::matches("device/+/state", "device/mac1/state/extra"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregate;
pub mod dedup;
pub mod envelope;
pub mod errors;
pub mod notify;
pub mod records;
pub mod rollover;
pub mod time;
pub mod topic;

// Public API
pub use envelope::{Command, Envelope, Payload};
pub use errors::{DecodeError, DecodeResult};
pub use records::{
    AttributeSnapshot, DailyRollup, DailyWarningStat, EventRecord, NotificationPreferences,
    RowId, SessionReport, WeeklyRollup, WeeklyWarningStat,
};
pub use rollover::DayBoundary;

/// Crate version, embedded for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
