//! Durable row-store seams
//!
//! The durable store is row-oriented and keyed by a synthetic integer id;
//! schema management is out of scope. Each record type gets a narrow trait
//! holding exactly the queries the pipeline needs, with an explicit
//! mapping per type instead of any reflection-driven SQL.
//!
//! `save` methods take `&mut` records so an INSERT can write the assigned
//! row id back into the record's [`RowId`]; the insert-vs-update decision
//! is an exhaustive match on that identity, made by the implementation.

use chrono::NaiveDate;
use vigil_core::records::{
    AttributeSnapshot, DailyRollup, DailyWarningStat, EventRecord, NotificationPreferences,
    SessionReport, WeeklyRollup, WeeklyWarningStat,
};
use vigil_core::time::Timestamp;

use crate::ConnectorResult;

/// Durable storage for attribute snapshots.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Most recent snapshot for a device (newest `created_at` first), the
    /// dedup fallback when the cache misses.
    async fn latest(&self, device_id: &str) -> ConnectorResult<Option<AttributeSnapshot>>;

    /// Insert or update by the record's identity, writing back the
    /// assigned row id on insert.
    async fn save(&self, record: &mut AttributeSnapshot) -> ConnectorResult<()>;
}

/// Durable storage for event records.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Most recent event record for a device.
    async fn latest(&self, device_id: &str) -> ConnectorResult<Option<EventRecord>>;

    /// Insert or update by the record's identity.
    async fn save(&self, record: &mut EventRecord) -> ConnectorResult<()>;
}

/// Durable storage for session reports.
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Look up a report by its natural key, for idempotent re-delivery.
    async fn find(
        &self,
        device_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> ConnectorResult<Option<SessionReport>>;

    /// Insert or update by the record's identity.
    async fn save(&self, record: &mut SessionReport) -> ConnectorResult<()>;
}

/// Durable storage for daily and weekly rollups, also the query surface
/// reporting consumers read from.
#[async_trait::async_trait]
pub trait RollupStore: Send + Sync {
    /// Daily rollup for a device and calendar day.
    async fn daily_for(
        &self,
        device_id: &str,
        day: NaiveDate,
    ) -> ConnectorResult<Option<DailyRollup>>;

    /// All daily rollups of a device in one ISO week.
    async fn daily_in_week(
        &self,
        device_id: &str,
        iso_year: i32,
        iso_week: u32,
    ) -> ConnectorResult<Vec<DailyRollup>>;

    /// Weekly rollup for a device and ISO week.
    async fn weekly_for(
        &self,
        device_id: &str,
        iso_year: i32,
        iso_week: u32,
    ) -> ConnectorResult<Option<WeeklyRollup>>;

    /// Insert or update a daily rollup by identity.
    async fn save_daily(&self, record: &mut DailyRollup) -> ConnectorResult<()>;

    /// Insert or update a weekly rollup by identity.
    async fn save_weekly(&self, record: &mut WeeklyRollup) -> ConnectorResult<()>;
}

/// Durable storage for warning counters.
#[async_trait::async_trait]
pub trait WarningStatStore: Send + Sync {
    /// Daily counter for (device, code, day).
    async fn daily_for(
        &self,
        device_id: &str,
        code: i32,
        day: NaiveDate,
    ) -> ConnectorResult<Option<DailyWarningStat>>;

    /// All daily counters for (device, code) in one ISO week.
    async fn daily_in_week(
        &self,
        device_id: &str,
        code: i32,
        iso_year: i32,
        iso_week: u32,
    ) -> ConnectorResult<Vec<DailyWarningStat>>;

    /// Weekly counter for (device, code, ISO week).
    async fn weekly_for(
        &self,
        device_id: &str,
        code: i32,
        iso_year: i32,
        iso_week: u32,
    ) -> ConnectorResult<Option<WeeklyWarningStat>>;

    /// Insert or update a daily counter by identity.
    async fn save_daily(&self, record: &mut DailyWarningStat) -> ConnectorResult<()>;

    /// Insert or update a weekly counter by identity.
    async fn save_weekly(&self, record: &mut WeeklyWarningStat) -> ConnectorResult<()>;
}

/// Durable storage for notification preferences.
#[async_trait::async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Preferences for a device, `None` when the device has none
    /// configured (no notifications fire).
    async fn for_device(
        &self,
        device_id: &str,
    ) -> ConnectorResult<Option<NotificationPreferences>>;

    /// Persist updated preferences (last-sent stamps).
    async fn save(&self, prefs: &NotificationPreferences) -> ConnectorResult<()>;
}
