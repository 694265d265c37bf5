//! Day-boundary rollover for cumulative records
//!
//! Cumulative counters (study-time buckets and the like) accumulate within
//! one calendar day and must restart on the next. The rollover state
//! machine compares the calendar day of the cached record with the day of
//! the incoming message:
//!
//! - `SameDay`: the record is carried forward and mutated in place, its
//!   identity retained, so the later persistence step UPDATEs.
//! - `NewDay`: the identity is reset to [`RowId::Unpersisted`] and the
//!   cumulative buckets are zeroed, so the later persistence step INSERTs.
//!
//! The entity keeps its device id across the boundary; only the storage
//! row identity resets. This yields exactly one durable row per device per
//! day for cumulative counters, with intraday updates coalesced.

use crate::records::{AttributeSnapshot, EventRecord, RowId};
use crate::time::{self, Timestamp};

/// Outcome of comparing a record's day against an incoming message's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBoundary {
    /// Same calendar day: carry the record forward
    SameDay,
    /// New calendar day: start a fresh cumulative record
    NewDay,
}

/// Classify the boundary between a record created at `previous` and a
/// message stamped `incoming`.
pub fn classify(previous: Timestamp, incoming: Timestamp) -> DayBoundary {
    if time::date_of(previous) == time::date_of(incoming) {
        DayBoundary::SameDay
    } else {
        DayBoundary::NewDay
    }
}

/// A record whose cumulative fields are scoped to one calendar day.
pub trait DayScoped {
    /// Timestamp anchoring the record's calendar day.
    fn created_at(&self) -> Timestamp;

    /// Reset identity and cumulative fields for a fresh day starting at `ts`.
    fn start_new_day(&mut self, ts: Timestamp);
}

impl DayScoped for AttributeSnapshot {
    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn start_new_day(&mut self, ts: Timestamp) {
        self.id = RowId::Unpersisted;
        self.created_at = ts;
        self.reset_cumulative();
    }
}

impl DayScoped for EventRecord {
    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn start_new_day(&mut self, ts: Timestamp) {
        self.id = RowId::Unpersisted;
        self.created_at = ts;
        self.warning = 0;
    }
}

/// Roll a record forward to the day of `incoming`, returning the boundary
/// that was crossed.
pub fn roll<R: DayScoped>(record: &mut R, incoming: Timestamp) -> DayBoundary {
    let boundary = classify(record.created_at(), incoming);
    if boundary == DayBoundary::NewDay {
        record.start_new_day(incoming);
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::AttributePayload;
    use crate::time::day_start;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32, h: u64) -> Timestamp {
        day_start(NaiveDate::from_ymd_opt(y, m, d).unwrap()) + h * 3600
    }

    #[test]
    fn same_day_retains_identity_and_counters() {
        let mut snap = AttributeSnapshot::seed("mac1", ts(2024, 1, 10, 8));
        snap.id = RowId::Persisted(42);
        snap.apply(&AttributePayload {
            flow_state: 90,
            study_secs: 30,
            ..Default::default()
        });

        let boundary = roll(&mut snap, ts(2024, 1, 10, 20));
        assert_eq!(boundary, DayBoundary::SameDay);
        assert_eq!(snap.id, RowId::Persisted(42));
        assert_eq!(snap.high_flow_secs, 30);
    }

    #[test]
    fn next_day_resets_identity_and_counters() {
        let mut snap = AttributeSnapshot::seed("mac1", ts(2024, 1, 10, 23));
        snap.id = RowId::Persisted(42);
        snap.apply(&AttributePayload {
            flow_state: 90,
            study_secs: 30,
            ..Default::default()
        });

        let incoming = ts(2024, 1, 11, 0);
        let boundary = roll(&mut snap, incoming);
        assert_eq!(boundary, DayBoundary::NewDay);
        assert_eq!(snap.id, RowId::Unpersisted);
        assert_eq!(snap.created_at, incoming);
        assert_eq!(snap.high_flow_secs, 0);
        // The entity keeps its device across the boundary
        assert_eq!(snap.device_id, "mac1");
    }

    #[test]
    fn event_rollover_clears_warning() {
        let mut event = EventRecord::seed("mac1", ts(2024, 1, 10, 23));
        event.warning = 3;
        event.present = true;

        roll(&mut event, ts(2024, 1, 11, 1));
        assert_eq!(event.warning, 0);
        // Presence is latest-state, not cumulative, and carries over
        assert!(event.present);
    }
}
