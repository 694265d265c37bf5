//! Domain records for the ingestion and aggregation pipeline
//!
//! ## Identity model
//!
//! Every durable record carries a [`RowId`]: either `Unpersisted` (no
//! storage row yet, persistence must INSERT) or `Persisted(id)`
//! (persistence must UPDATE). Making this a proper sum type turns the
//! insert-vs-update decision into an exhaustive match instead of an
//! `id == 0` convention, and the day-rollover machinery resets it
//! explicitly when a new calendar day starts a fresh row.
//!
//! ## Ownership
//!
//! `AttributeSnapshot` and `EventRecord` for a given device are owned by
//! the ingestion pipeline; the executor serializes all messages for one
//! device onto one worker, so no concurrent writer mutates the same
//! device's record. Rollups are owned by the aggregation engine and only
//! read elsewhere.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::envelope::{AttributePayload, EventPayload, ReportPayload};
use crate::time::{self, Timestamp};

/// Storage identity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowId {
    /// Not yet written to durable storage; persistence inserts
    #[default]
    Unpersisted,
    /// Backed by a storage row; persistence updates in place
    Persisted(i64),
}

impl RowId {
    /// Whether this record is backed by a storage row.
    pub fn is_persisted(&self) -> bool {
        matches!(self, RowId::Persisted(_))
    }
}

/// Per-device latest attribute state, cumulative within one calendar day.
///
/// Mutated in place as envelopes arrive; a fresh instance (identity reset)
/// is only created on a day-boundary rollover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
    /// Storage identity
    pub id: RowId,
    /// Owning device
    pub device_id: String,
    /// First message timestamp of the record's calendar day; anchors both
    /// ordering and the day-boundary comparison
    pub created_at: Timestamp,
    /// Breaths per minute
    pub respiratory_rate: i32,
    /// Beats per minute
    pub heart_rate: i32,
    /// Concentration / flow score, 0-100
    pub flow_state: i32,
    /// Posture classification code
    pub posture: i32,
    /// Movement events per minute
    pub activity_freq: i32,
    /// Coarse body status code
    pub body_status: i32,
    /// Cumulative low-concentration study seconds for the day
    pub low_flow_secs: u32,
    /// Cumulative mid-concentration study seconds for the day
    pub mid_flow_secs: u32,
    /// Cumulative high-concentration study seconds for the day
    pub high_flow_secs: u32,
}

impl AttributeSnapshot {
    /// Seed an unpersisted snapshot for a device at `ts`.
    pub fn seed(device_id: &str, ts: Timestamp) -> Self {
        Self {
            id: RowId::Unpersisted,
            device_id: device_id.to_owned(),
            created_at: ts,
            ..Self::default()
        }
    }

    /// Merge one attribute payload into the snapshot.
    ///
    /// Latest-value fields are overwritten; the reported study seconds are
    /// added to the cumulative bucket selected by the sample's flow state.
    pub fn apply(&mut self, payload: &AttributePayload) {
        self.respiratory_rate = payload.respiratory_rate;
        self.heart_rate = payload.heart_rate;
        self.flow_state = payload.flow_state;
        self.posture = payload.posture;
        self.activity_freq = payload.activity_freq;
        self.body_status = payload.body_status;

        if payload.study_secs > 0 {
            match crate::aggregate::FlowBand::classify(payload.flow_state as f32) {
                crate::aggregate::FlowBand::Low => self.low_flow_secs += payload.study_secs,
                crate::aggregate::FlowBand::Mid => self.mid_flow_secs += payload.study_secs,
                crate::aggregate::FlowBand::High => self.high_flow_secs += payload.study_secs,
            }
        }
    }

    /// Zero the cumulative day buckets (day rollover).
    pub fn reset_cumulative(&mut self) {
        self.low_flow_secs = 0;
        self.mid_flow_secs = 0;
        self.high_flow_secs = 0;
    }
}

/// Per-device discrete event state, cumulative within one calendar day.
///
/// Warning codes are non-cumulative: they are reset on every message so a
/// warning fires only for envelopes that carry it, while presence and
/// posture persist across messages within the day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Storage identity
    pub id: RowId,
    /// Owning device
    pub device_id: String,
    /// First message timestamp of the record's calendar day
    pub created_at: Timestamp,
    /// Whether a person is present
    pub present: bool,
    /// Posture classification code
    pub posture_class: i32,
    /// Warning code from the latest message, 0 = none
    pub warning: i32,
}

impl EventRecord {
    /// Seed an unpersisted event record for a device at `ts`.
    pub fn seed(device_id: &str, ts: Timestamp) -> Self {
        Self {
            id: RowId::Unpersisted,
            device_id: device_id.to_owned(),
            created_at: ts,
            ..Self::default()
        }
    }

    /// Merge one event payload into the record.
    ///
    /// The warning field always takes the payload value (0 when absent),
    /// so a stale warning never persists beyond the message that raised it.
    pub fn apply(&mut self, payload: &EventPayload) {
        self.present = payload.present;
        self.posture_class = payload.posture_class;
        self.warning = payload.warning;
    }
}

/// One closed reporting interval for a device.
///
/// Looked up by (device, start, end) so a re-delivered report updates the
/// existing row instead of inserting a duplicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Storage identity
    pub id: RowId,
    /// Owning device
    pub device_id: String,
    /// Interval start, epoch seconds
    pub start: Timestamp,
    /// Interval end, epoch seconds; its calendar day buckets the report
    pub end: Timestamp,
    /// Per-sample flow/concentration scores
    pub flow_samples: Vec<f32>,
    /// Per-sample respiratory rates
    pub respiratory_samples: Vec<f32>,
    /// Per-sample heart rates
    pub heart_rate_samples: Vec<f32>,
    /// Total study time, seconds
    pub study_time: u32,
    /// Scalar concentration score, 0-100
    pub concentration: f32,
    /// Scalar evaluation score, 0-100
    pub evaluation: f32,
}

impl SessionReport {
    /// Build a report record from a decoded payload.
    pub fn from_payload(device_id: &str, payload: &ReportPayload) -> Self {
        Self {
            id: RowId::Unpersisted,
            device_id: device_id.to_owned(),
            start: payload.start,
            end: payload.end,
            flow_samples: payload.flow_samples.clone(),
            respiratory_samples: payload.respiratory_samples.clone(),
            heart_rate_samples: payload.heart_rate_samples.clone(),
            study_time: payload.study_time,
            concentration: payload.concentration,
            evaluation: payload.evaluation,
        }
    }
}

/// One row per (device, calendar day): running totals and averages over
/// every session report whose end falls on that day.
///
/// Invariant: `avg_x == total_x / total_study_nums` after every fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    /// Storage identity
    pub id: RowId,
    /// Owning device
    pub device_id: String,
    /// Calendar day (UTC)
    pub day: NaiveDate,
    /// ISO year the day belongs to
    pub iso_year: i32,
    /// ISO week the day belongs to
    pub iso_week: u32,
    /// Number of session reports folded in
    pub total_study_nums: u32,
    /// Sum of report study times, seconds
    pub total_study_time: u32,
    /// Running average study time per report, seconds
    pub avg_study_time: f32,
    /// Sum of report concentration scores
    pub total_concentration: f32,
    /// Running average concentration
    pub avg_concentration: f32,
    /// Sum of report evaluation scores
    pub total_evaluation: f32,
    /// Running average evaluation
    pub avg_evaluation: f32,
    /// Low-concentration sample count (flow <= 54)
    pub low_flow_nums: u32,
    /// Mid-concentration sample count (55..=75)
    pub mid_flow_nums: u32,
    /// High-concentration sample count (> 75)
    pub high_flow_nums: u32,
}

impl DailyRollup {
    /// Seed an empty rollup for a device and day, with its ISO week bucket.
    pub fn seed(device_id: &str, day: NaiveDate) -> Self {
        let (iso_year, iso_week) = time::iso_week_of(day);
        Self {
            id: RowId::Unpersisted,
            device_id: device_id.to_owned(),
            day,
            iso_year,
            iso_week,
            ..Self::default()
        }
    }
}

/// One row per (device, ISO year, ISO week), recomputed from scratch from
/// the week's daily rollups on every fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRollup {
    /// Storage identity
    pub id: RowId,
    /// Owning device
    pub device_id: String,
    /// ISO year
    pub iso_year: i32,
    /// ISO week
    pub iso_week: u32,
    /// Number of days with at least one study session
    pub study_day_nums: u32,
    /// Sum of daily study times, seconds
    pub total_study_time: u32,
    /// Average study time per study day, seconds
    pub avg_day_study_time: f32,
    /// Maximum daily study time, seconds
    pub max_study_time: u32,
    /// ISO weekday (Mon=1) the study-time maximum fell on
    pub max_study_time_weekday: u32,
    /// Maximum daily average concentration
    pub max_concentration: f32,
    /// ISO weekday the concentration maximum fell on
    pub max_concentration_weekday: u32,
    /// Maximum daily average evaluation
    pub max_evaluation: f32,
    /// ISO weekday the evaluation maximum fell on
    pub max_evaluation_weekday: u32,
    /// Average of daily average concentrations
    pub avg_concentration: f32,
    /// Average of daily average evaluations
    pub avg_evaluation: f32,
    /// Days whose average evaluation reached gold (>= 80)
    pub gold_nums: u32,
    /// Days whose average evaluation reached silver (60..=79)
    pub silver_nums: u32,
    /// Days below silver (< 60)
    pub bronze_nums: u32,
    /// `total_study_time` minus the prior ISO week's (0 when absent)
    pub than_last_study_time: i64,
    /// `study_day_nums` minus the prior ISO week's
    pub than_last_study_days: i64,
    /// `avg_evaluation` minus the prior ISO week's
    pub than_last_avg_evaluation: f32,
}

/// Per-device notification switches and last-sent stamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    /// Owning device
    pub device_id: String,
    /// Notify when a session report closes
    pub report_done: bool,
    /// Notify on warning events
    pub warnings: bool,
    /// Notify on presence changes
    pub presence: bool,
    /// Last session-report notification, epoch seconds
    pub last_report_sent: Option<Timestamp>,
    /// Last warning notification
    pub last_warning_sent: Option<Timestamp>,
    /// Last presence notification
    pub last_presence_sent: Option<Timestamp>,
}

/// How often one discrete warning code fired for a device on a day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyWarningStat {
    /// Storage identity
    pub id: RowId,
    /// Owning device
    pub device_id: String,
    /// Warning code
    pub code: i32,
    /// Calendar day (UTC)
    pub day: NaiveDate,
    /// Times the code fired that day
    pub count: u32,
}

impl DailyWarningStat {
    /// Seed a zero counter for (device, code, day).
    pub fn seed(device_id: &str, code: i32, day: NaiveDate) -> Self {
        Self {
            id: RowId::Unpersisted,
            device_id: device_id.to_owned(),
            code,
            day,
            count: 0,
        }
    }
}

/// Weekly warning counter with its week-over-week delta, recomputed from
/// the week's daily counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyWarningStat {
    /// Storage identity
    pub id: RowId,
    /// Owning device
    pub device_id: String,
    /// Warning code
    pub code: i32,
    /// ISO year
    pub iso_year: i32,
    /// ISO week
    pub iso_week: u32,
    /// Times the code fired that week
    pub count: u32,
    /// `count` minus the prior ISO week's (0 when absent)
    pub than_last: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::AttributePayload;

    #[test]
    fn row_id_defaults_to_unpersisted() {
        assert_eq!(RowId::default(), RowId::Unpersisted);
        assert!(!RowId::Unpersisted.is_persisted());
        assert!(RowId::Persisted(7).is_persisted());
    }

    #[test]
    fn snapshot_accumulates_study_buckets() {
        let mut snap = AttributeSnapshot::seed("mac1", 1000);

        snap.apply(&AttributePayload {
            flow_state: 90,
            study_secs: 30,
            ..Default::default()
        });
        snap.apply(&AttributePayload {
            flow_state: 40,
            study_secs: 10,
            ..Default::default()
        });

        assert_eq!(snap.high_flow_secs, 30);
        assert_eq!(snap.low_flow_secs, 10);
        assert_eq!(snap.flow_state, 40);

        snap.reset_cumulative();
        assert_eq!(snap.high_flow_secs, 0);
        assert_eq!(snap.low_flow_secs, 0);
    }

    #[test]
    fn event_warning_resets_each_message() {
        let mut record = EventRecord::seed("mac1", 1000);

        record.apply(&crate::envelope::EventPayload {
            present: true,
            posture_class: 2,
            warning: 5,
        });
        assert_eq!(record.warning, 5);

        record.apply(&crate::envelope::EventPayload {
            present: true,
            posture_class: 2,
            warning: 0,
        });
        assert_eq!(record.warning, 0);
        assert!(record.present);
    }
}
