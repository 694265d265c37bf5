//! In-process cache and store backends
//!
//! Single-node deployments and the test suite run against these instead of
//! an external hash store and a relational backend. They implement the
//! same traits with the same identity discipline: an `Unpersisted` record
//! gets the next synthetic row id on save, a `Persisted` record replaces
//! its row in place.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::sync::Mutex;

use vigil_core::records::{
    AttributeSnapshot, DailyRollup, DailyWarningStat, EventRecord, NotificationPreferences,
    RowId, SessionReport, WeeklyRollup, WeeklyWarningStat,
};
use vigil_core::time::Timestamp;

use crate::cache::CacheStore;
use crate::store::{
    EventStore, PreferencesStore, ReportStore, RollupStore, SnapshotStore, WarningStatStore,
};
use crate::ConnectorResult;

/// In-process [`CacheStore`] with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, String), (String, Instant)>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str, field: &str) -> ConnectorResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let map_key = (key.to_owned(), field.to_owned());

        match entries.get(&map_key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(&map_key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Duration,
    ) -> ConnectorResult<()> {
        self.entries
            .lock()
            .await
            .insert((key.to_owned(), field.to_owned()), (value, Instant::now() + ttl));
        Ok(())
    }
}

fn assign_id<F: FnOnce(RowId)>(next_id: &mut i64, id: RowId, set: F) -> RowId {
    match id {
        RowId::Unpersisted => {
            let assigned = RowId::Persisted(*next_id);
            *next_id += 1;
            set(assigned);
            assigned
        }
        persisted => persisted,
    }
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    snapshots: Vec<AttributeSnapshot>,
    events: Vec<EventRecord>,
    reports: Vec<SessionReport>,
    daily: Vec<DailyRollup>,
    weekly: Vec<WeeklyRollup>,
    warning_daily: Vec<DailyWarningStat>,
    warning_weekly: Vec<WeeklyWarningStat>,
    preferences: Vec<NotificationPreferences>,
}

impl Tables {
    fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }
}

/// In-process row store implementing every store trait.
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::new()),
        }
    }

    /// Seed preferences for a device (provisioning is out of scope).
    pub async fn put_preferences(&self, prefs: NotificationPreferences) {
        let mut tables = self.tables.lock().await;
        tables
            .preferences
            .retain(|p| p.device_id != prefs.device_id);
        tables.preferences.push(prefs);
    }

    /// Number of stored attribute snapshot rows, for assertions.
    pub async fn snapshot_rows(&self) -> usize {
        self.tables.lock().await.snapshots.len()
    }

    /// Number of stored daily rollup rows, for assertions.
    pub async fn daily_rows(&self) -> usize {
        self.tables.lock().await.daily.len()
    }
}

macro_rules! upsert {
    ($tables:expr, $table:ident, $record:expr) => {{
        let tables = &mut *$tables;
        match $record.id {
            RowId::Unpersisted => {
                let _ = assign_id(&mut tables.next_id, $record.id, |id| $record.id = id);
                tables.$table.push($record.clone());
            }
            RowId::Persisted(_) => {
                if let Some(row) = tables.$table.iter_mut().find(|r| r.id == $record.id) {
                    *row = $record.clone();
                } else {
                    tables.$table.push($record.clone());
                }
            }
        }
    }};
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn latest(&self, device_id: &str) -> ConnectorResult<Option<AttributeSnapshot>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .snapshots
            .iter()
            .filter(|s| s.device_id == device_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn save(&self, record: &mut AttributeSnapshot) -> ConnectorResult<()> {
        let mut tables = self.tables.lock().await;
        upsert!(tables, snapshots, record);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryStore {
    async fn latest(&self, device_id: &str) -> ConnectorResult<Option<EventRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.device_id == device_id)
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn save(&self, record: &mut EventRecord) -> ConnectorResult<()> {
        let mut tables = self.tables.lock().await;
        upsert!(tables, events, record);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReportStore for MemoryStore {
    async fn find(
        &self,
        device_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> ConnectorResult<Option<SessionReport>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reports
            .iter()
            .find(|r| r.device_id == device_id && r.start == start && r.end == end)
            .cloned())
    }

    async fn save(&self, record: &mut SessionReport) -> ConnectorResult<()> {
        let mut tables = self.tables.lock().await;
        upsert!(tables, reports, record);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RollupStore for MemoryStore {
    async fn daily_for(
        &self,
        device_id: &str,
        day: NaiveDate,
    ) -> ConnectorResult<Option<DailyRollup>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .daily
            .iter()
            .find(|d| d.device_id == device_id && d.day == day)
            .cloned())
    }

    async fn daily_in_week(
        &self,
        device_id: &str,
        iso_year: i32,
        iso_week: u32,
    ) -> ConnectorResult<Vec<DailyRollup>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .daily
            .iter()
            .filter(|d| {
                d.device_id == device_id && d.iso_year == iso_year && d.iso_week == iso_week
            })
            .cloned()
            .collect())
    }

    async fn weekly_for(
        &self,
        device_id: &str,
        iso_year: i32,
        iso_week: u32,
    ) -> ConnectorResult<Option<WeeklyRollup>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .weekly
            .iter()
            .find(|w| {
                w.device_id == device_id && w.iso_year == iso_year && w.iso_week == iso_week
            })
            .cloned())
    }

    async fn save_daily(&self, record: &mut DailyRollup) -> ConnectorResult<()> {
        let mut tables = self.tables.lock().await;
        upsert!(tables, daily, record);
        Ok(())
    }

    async fn save_weekly(&self, record: &mut WeeklyRollup) -> ConnectorResult<()> {
        let mut tables = self.tables.lock().await;
        upsert!(tables, weekly, record);
        Ok(())
    }
}

#[async_trait::async_trait]
impl WarningStatStore for MemoryStore {
    async fn daily_for(
        &self,
        device_id: &str,
        code: i32,
        day: NaiveDate,
    ) -> ConnectorResult<Option<DailyWarningStat>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .warning_daily
            .iter()
            .find(|w| w.device_id == device_id && w.code == code && w.day == day)
            .cloned())
    }

    async fn daily_in_week(
        &self,
        device_id: &str,
        code: i32,
        iso_year: i32,
        iso_week: u32,
    ) -> ConnectorResult<Vec<DailyWarningStat>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .warning_daily
            .iter()
            .filter(|w| {
                w.device_id == device_id
                    && w.code == code
                    && vigil_core::time::iso_week_of(w.day) == (iso_year, iso_week)
            })
            .cloned()
            .collect())
    }

    async fn weekly_for(
        &self,
        device_id: &str,
        code: i32,
        iso_year: i32,
        iso_week: u32,
    ) -> ConnectorResult<Option<WeeklyWarningStat>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .warning_weekly
            .iter()
            .find(|w| {
                w.device_id == device_id
                    && w.code == code
                    && w.iso_year == iso_year
                    && w.iso_week == iso_week
            })
            .cloned())
    }

    async fn save_daily(&self, record: &mut DailyWarningStat) -> ConnectorResult<()> {
        let mut tables = self.tables.lock().await;
        upsert!(tables, warning_daily, record);
        Ok(())
    }

    async fn save_weekly(&self, record: &mut WeeklyWarningStat) -> ConnectorResult<()> {
        let mut tables = self.tables.lock().await;
        upsert!(tables, warning_weekly, record);
        Ok(())
    }
}

#[async_trait::async_trait]
impl PreferencesStore for MemoryStore {
    async fn for_device(
        &self,
        device_id: &str,
    ) -> ConnectorResult<Option<NotificationPreferences>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .preferences
            .iter()
            .find(|p| p.device_id == device_id)
            .cloned())
    }

    async fn save(&self, prefs: &NotificationPreferences) -> ConnectorResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .preferences
            .retain(|p| p.device_id != prefs.device_id);
        tables.preferences.push(prefs.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .put("attr", "mac1", "{}".into(), Duration::from_millis(10))
            .await
            .unwrap();

        assert!(cache.get("attr", "mac1").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("attr", "mac1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_assigns_id_once() {
        let store = MemoryStore::new();
        let mut snap = AttributeSnapshot::seed("mac1", 1000);

        SnapshotStore::save(&store, &mut snap).await.unwrap();
        let first_id = snap.id;
        assert!(first_id.is_persisted());

        snap.heart_rate = 70;
        SnapshotStore::save(&store, &mut snap).await.unwrap();
        assert_eq!(snap.id, first_id);
        assert_eq!(store.snapshot_rows().await, 1);

        let latest = SnapshotStore::latest(&store, "mac1").await.unwrap().unwrap();
        assert_eq!(latest.heart_rate, 70);
    }

    #[tokio::test]
    async fn latest_orders_by_created_at() {
        let store = MemoryStore::new();
        let mut old = AttributeSnapshot::seed("mac1", 1000);
        let mut new = AttributeSnapshot::seed("mac1", 2000);
        SnapshotStore::save(&store, &mut old).await.unwrap();
        SnapshotStore::save(&store, &mut new).await.unwrap();

        let latest = SnapshotStore::latest(&store, "mac1").await.unwrap().unwrap();
        assert_eq!(latest.created_at, 2000);
    }
}
