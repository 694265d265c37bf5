//! Ingestion service: the handler bodies behind the router
//!
//! ## Data flow
//!
//! ```text
//! dispatch → decode → [delivery task ends here]
//!                 ↓ submit(device_id)
//!           worker task: baseline (cache, else durable)
//!                        → day rollover → dedup
//!                        → publish + persist when novel
//!                        → cache refresh (always)
//!           session report: idempotent save → daily fold
//!                        → weekly recompute → notification gate
//! ```
//!
//! Decoding happens on the transport's delivery task; everything that can
//! touch storage is submitted to the worker pool keyed by device id, so
//! one device's messages are processed in arrival order.
//!
//! ## Failure policy
//!
//! Storage failures abandon the remaining fold for that one message and
//! are logged; the weekly rollup is recomputed from durable daily rows on
//! the next message, so an abandoned fold self-heals. Publish and
//! notification failures never block persistence.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use vigil_core::dedup;
use vigil_core::envelope::{AttributePayload, Envelope, EventPayload, Payload, ReportPayload};
use vigil_core::notify::{self, Category, Decision};
use vigil_core::records::{AttributeSnapshot, DailyRollup, DailyWarningStat, EventRecord, SessionReport};
use vigil_core::rollover::{self, DayBoundary};
use vigil_core::time::{self, TimeSource, Timestamp};

use crate::cache::{DeviceStateCache, CLASS_ATTRIBUTE, CLASS_EVENT};
use crate::executor::WorkerPool;
use crate::router::MessageHandler;
use crate::store::{
    EventStore, PreferencesStore, ReportStore, RollupStore, SnapshotStore, WarningStatStore,
};
use crate::{Notifier, Transport};

/// Topic prefix for downstream state publishes.
const STATE_TOPIC_PREFIX: &str = "vigil/state";

/// Collaborators the ingest service is composed from.
pub struct IngestDeps {
    /// Hot-state cache
    pub cache: DeviceStateCache,
    /// Attribute snapshot rows
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Event record rows
    pub events: Arc<dyn EventStore>,
    /// Session report rows
    pub reports: Arc<dyn ReportStore>,
    /// Daily/weekly rollup rows
    pub rollups: Arc<dyn RollupStore>,
    /// Warning counter rows
    pub warnings: Arc<dyn WarningStatStore>,
    /// Notification preference rows
    pub preferences: Arc<dyn PreferencesStore>,
    /// Downstream pub/sub transport
    pub transport: Arc<dyn Transport>,
    /// User-notification sender
    pub notifier: Arc<dyn Notifier>,
    /// Clock for notification stamps
    pub clock: Arc<dyn TimeSource>,
}

/// Processes decoded envelopes end to end.
pub struct IngestService {
    deps: IngestDeps,
}

impl IngestService {
    /// Compose the service from its collaborators.
    pub fn new(deps: IngestDeps) -> Self {
        Self { deps }
    }

    /// Process one decoded envelope. Runs on a pool worker.
    pub async fn process(&self, envelope: Envelope) {
        match envelope.payload.clone() {
            Payload::Attribute(payload) => self.process_attribute(&envelope, &payload).await,
            Payload::Event(payload) => self.process_event(&envelope, &payload).await,
            Payload::Report(payload) => self.process_report(&envelope, &payload).await,
            Payload::Warning(payload) => {
                self.process_warning(&envelope.device_id, payload.code, envelope.timestamp)
                    .await
            }
        }
    }

    async fn process_attribute(&self, envelope: &Envelope, payload: &AttributePayload) {
        let device = envelope.device_id.as_str();

        let baseline: Option<AttributeSnapshot> =
            match self.deps.cache.get(CLASS_ATTRIBUTE, device).await {
                Some(cached) => Some(cached),
                None => match self.deps.snapshots.latest(device).await {
                    Ok(row) => row,
                    Err(err) => {
                        log::error!("baseline query failed for {device}: {err}");
                        return;
                    }
                },
            };

        let mut current = baseline
            .clone()
            .unwrap_or_else(|| AttributeSnapshot::seed(device, envelope.timestamp));
        let boundary = rollover::roll(&mut current, envelope.timestamp);
        current.apply(payload);

        // A new day always persists: the fresh row must exist even when
        // the significant fields happen to match yesterday's.
        let novel = boundary == DayBoundary::NewDay
            || dedup::is_novel(&current, baseline.as_ref());

        if novel {
            self.publish_state(CLASS_ATTRIBUTE, device, &current).await;
            if let Err(err) = self.deps.snapshots.save(&mut current).await {
                log::error!("snapshot save failed for {device}: {err}");
            }
        } else {
            log::trace!("suppressed unchanged snapshot for {device}");
        }

        // Refresh unconditionally so the next comparison stays in cache.
        self.deps.cache.put(CLASS_ATTRIBUTE, device, &current).await;
    }

    async fn process_event(&self, envelope: &Envelope, payload: &EventPayload) {
        let device = envelope.device_id.as_str();

        let baseline: Option<EventRecord> = match self.deps.cache.get(CLASS_EVENT, device).await {
            Some(cached) => Some(cached),
            None => match self.deps.events.latest(device).await {
                Ok(row) => row,
                Err(err) => {
                    log::error!("baseline query failed for {device}: {err}");
                    return;
                }
            },
        };

        let mut current = baseline
            .clone()
            .unwrap_or_else(|| EventRecord::seed(device, envelope.timestamp));
        let boundary = rollover::roll(&mut current, envelope.timestamp);
        current.apply(payload);

        let novel =
            boundary == DayBoundary::NewDay || dedup::is_novel(&current, baseline.as_ref());

        if novel {
            self.publish_state(CLASS_EVENT, device, &current).await;
            if let Err(err) = self.deps.events.save(&mut current).await {
                log::error!("event save failed for {device}: {err}");
            }
        }

        self.deps.cache.put(CLASS_EVENT, device, &current).await;

        if baseline
            .as_ref()
            .is_some_and(|prev| prev.present != current.present)
        {
            self.trigger(device, Category::Presence, json!({ "present": current.present }))
                .await;
        }

        if current.warning != 0 {
            self.process_warning(device, current.warning, envelope.timestamp)
                .await;
        }
    }

    async fn process_report(&self, envelope: &Envelope, payload: &ReportPayload) {
        let device = envelope.device_id.as_str();
        let mut report = SessionReport::from_payload(device, payload);

        let existing = match self
            .deps
            .reports
            .find(device, report.start, report.end)
            .await
        {
            Ok(existing) => existing,
            Err(err) => {
                log::error!("report lookup failed for {device}: {err}");
                return;
            }
        };

        let redelivery = existing.is_some();
        if let Some(existing) = existing {
            report.id = existing.id;
        }

        if let Err(err) = self.deps.reports.save(&mut report).await {
            log::error!("report save failed for {device}: {err}");
            return;
        }

        if redelivery {
            // Already counted; updating the row is enough.
            log::debug!(
                "re-delivered report for {device} [{}..{}], fold skipped",
                report.start,
                report.end
            );
            return;
        }

        if !self.fold_report_rollups(&report).await {
            return;
        }

        self.trigger(
            device,
            Category::SessionReport,
            json!({
                "start": report.start,
                "end": report.end,
                "study_time": report.study_time,
                "evaluation": report.evaluation,
            }),
        )
        .await;
    }

    /// Fold a freshly-persisted report into its daily and weekly rollups.
    ///
    /// Returns false when a storage failure abandoned the fold.
    async fn fold_report_rollups(&self, report: &SessionReport) -> bool {
        let device = report.device_id.as_str();
        let day = time::date_of(report.end);

        let mut daily = match self.deps.rollups.daily_for(device, day).await {
            Ok(Some(row)) => row,
            Ok(None) => DailyRollup::seed(device, day),
            Err(err) => {
                log::error!("daily lookup failed for {device}: {err}");
                return false;
            }
        };

        vigil_core::aggregate::fold_report(&mut daily, report);
        if let Err(err) = self.deps.rollups.save_daily(&mut daily).await {
            log::error!("daily save failed for {device}: {err}");
            return false;
        }

        self.recompute_weekly(device, daily.iso_year, daily.iso_week).await
    }

    /// Recompute the weekly rollup for one ISO week from durable daily rows.
    async fn recompute_weekly(&self, device: &str, iso_year: i32, iso_week: u32) -> bool {
        let days = match self.deps.rollups.daily_in_week(device, iso_year, iso_week).await {
            Ok(days) => days,
            Err(err) => {
                log::error!("weekly day scan failed for {device}: {err}");
                return false;
            }
        };

        let (prior_year, prior_week) = time::prev_iso_week(iso_year, iso_week);
        let prior = match self.deps.rollups.weekly_for(device, prior_year, prior_week).await {
            Ok(prior) => prior,
            Err(err) => {
                log::error!("prior week lookup failed for {device}: {err}");
                return false;
            }
        };

        let existing = match self.deps.rollups.weekly_for(device, iso_year, iso_week).await {
            Ok(existing) => existing,
            Err(err) => {
                log::error!("weekly lookup failed for {device}: {err}");
                return false;
            }
        };

        let mut weekly = vigil_core::aggregate::recompute_weekly(
            device,
            iso_year,
            iso_week,
            &days,
            prior.as_ref(),
        );
        if let Some(existing) = existing {
            weekly.id = existing.id;
        }

        if let Err(err) = self.deps.rollups.save_weekly(&mut weekly).await {
            log::error!("weekly save failed for {device}: {err}");
            return false;
        }
        true
    }

    /// Count one warning firing into its daily and weekly counters, then
    /// run the notification gate for it.
    async fn process_warning(&self, device: &str, code: i32, ts: Timestamp) {
        let day = time::date_of(ts);

        let mut daily = match self.deps.warnings.daily_for(device, code, day).await {
            Ok(Some(row)) => row,
            Ok(None) => DailyWarningStat::seed(device, code, day),
            Err(err) => {
                log::error!("warning daily lookup failed for {device}: {err}");
                return;
            }
        };
        vigil_core::aggregate::fold_warning(&mut daily);
        if let Err(err) = self.deps.warnings.save_daily(&mut daily).await {
            log::error!("warning daily save failed for {device}: {err}");
            return;
        }

        let (iso_year, iso_week) = time::iso_week_of(day);
        let week_days = match self
            .deps
            .warnings
            .daily_in_week(device, code, iso_year, iso_week)
            .await
        {
            Ok(days) => days,
            Err(err) => {
                log::error!("warning week scan failed for {device}: {err}");
                return;
            }
        };

        let (prior_year, prior_week) = time::prev_iso_week(iso_year, iso_week);
        let prior = match self
            .deps
            .warnings
            .weekly_for(device, code, prior_year, prior_week)
            .await
        {
            Ok(prior) => prior,
            Err(err) => {
                log::error!("prior warning week lookup failed for {device}: {err}");
                return;
            }
        };
        let existing = match self
            .deps
            .warnings
            .weekly_for(device, code, iso_year, iso_week)
            .await
        {
            Ok(existing) => existing,
            Err(err) => {
                log::error!("warning weekly lookup failed for {device}: {err}");
                return;
            }
        };

        let mut weekly = vigil_core::aggregate::recompute_weekly_warnings(
            device,
            code,
            iso_year,
            iso_week,
            &week_days,
            prior.as_ref(),
        );
        if let Some(existing) = existing {
            weekly.id = existing.id;
        }
        if let Err(err) = self.deps.warnings.save_weekly(&mut weekly).await {
            log::error!("warning weekly save failed for {device}: {err}");
            return;
        }

        self.trigger(device, Category::Warning, json!({ "code": code })).await;
    }

    /// Run the notification gate and invoke the sender when it passes.
    async fn trigger(&self, device: &str, category: Category, payload: serde_json::Value) {
        let prefs = match self.deps.preferences.for_device(device).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => {
                log::trace!("no notification preferences for {device}");
                return;
            }
            Err(err) => {
                log::warn!("preference lookup failed for {device}: {err}");
                return;
            }
        };

        let now = self.deps.clock.now();
        match notify::decide(&prefs, category, now) {
            Decision::Send => {
                match self.deps.notifier.notify(device, category, payload).await {
                    Ok(()) => {
                        let mut prefs = prefs;
                        notify::record_sent(&mut prefs, category, now);
                        if let Err(err) = self.deps.preferences.save(&prefs).await {
                            log::warn!("last-sent stamp save failed for {device}: {err}");
                        }
                    }
                    Err(err) => {
                        log::warn!("{} notification failed for {device}: {err}", category.name());
                    }
                }
            }
            Decision::SwitchedOff => {
                log::trace!("{} notifications off for {device}", category.name());
            }
            Decision::RateLimited => {
                log::debug!("{} notification rate-limited for {device}", category.name());
            }
        }
    }

    /// Best-effort downstream publish of a freshly computed record.
    async fn publish_state<T: Serialize>(&self, class: &str, device: &str, record: &T) {
        let topic = format!("{STATE_TOPIC_PREFIX}/{class}/{device}");
        match serde_json::to_vec(record) {
            Ok(bytes) => {
                if let Err(err) = self.deps.transport.publish(&topic, &bytes).await {
                    log::warn!("publish to {topic} failed: {err}");
                }
            }
            Err(err) => log::warn!("encode for {topic} failed: {err}"),
        }
    }
}

/// Router handler that decodes on the delivery task and defers the rest to
/// the worker pool, keyed by device id.
pub struct IngestHandler {
    service: Arc<IngestService>,
    pool: Arc<WorkerPool>,
}

impl IngestHandler {
    /// Wrap a service and pool for registration on the router.
    pub fn new(service: Arc<IngestService>, pool: Arc<WorkerPool>) -> Self {
        Self { service, pool }
    }
}

#[async_trait::async_trait]
impl MessageHandler for IngestHandler {
    async fn handle(&self, topic: &str, payload: &[u8]) {
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("dropping undecodable message on {topic}: {err}");
                return;
            }
        };

        let service = self.service.clone();
        let key = envelope.device_id.clone();
        if let Err(err) = self
            .pool
            .submit(&key, async move { service.process(envelope).await })
            .await
        {
            log::warn!("enqueue failed for {key}: {err}");
        }
    }
}
