//! Notification gating and deduplication
//!
//! Every aggregated result that could notify a user passes through two
//! gates: the device's per-category preference switch, and a last-sent
//! stamp that rate-limits chatty categories. The decision is pure; the
//! connectors crate invokes the external sender and records the stamp only
//! after a successful send.

use crate::records::NotificationPreferences;
use crate::time::Timestamp;

/// Rate limit for warning and presence notifications, seconds.
///
/// Session-report notifications are not interval-limited: one report, one
/// notification, with the stamp kept for auditing.
pub const ALERT_MIN_INTERVAL_SECS: u64 = 600;

/// Outbound notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A session report closed
    SessionReport,
    /// A warning event fired
    Warning,
    /// Presence changed
    Presence,
}

impl Category {
    /// Wire name used in downstream notification payloads.
    pub const fn name(&self) -> &'static str {
        match self {
            Category::SessionReport => "session_report",
            Category::Warning => "warning",
            Category::Presence => "presence",
        }
    }

    fn min_interval_secs(&self) -> u64 {
        match self {
            Category::SessionReport => 0,
            Category::Warning | Category::Presence => ALERT_MIN_INTERVAL_SECS,
        }
    }
}

/// Outcome of the notification gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Invoke the sender
    Send,
    /// The device switched this category off
    SwitchedOff,
    /// Sent too recently
    RateLimited,
}

fn switch(prefs: &NotificationPreferences, category: Category) -> bool {
    match category {
        Category::SessionReport => prefs.report_done,
        Category::Warning => prefs.warnings,
        Category::Presence => prefs.presence,
    }
}

fn last_sent(prefs: &NotificationPreferences, category: Category) -> Option<Timestamp> {
    match category {
        Category::SessionReport => prefs.last_report_sent,
        Category::Warning => prefs.last_warning_sent,
        Category::Presence => prefs.last_presence_sent,
    }
}

/// Decide whether a notification for `category` should fire at `now`.
pub fn decide(prefs: &NotificationPreferences, category: Category, now: Timestamp) -> Decision {
    if !switch(prefs, category) {
        return Decision::SwitchedOff;
    }

    let interval = category.min_interval_secs();
    if interval > 0 {
        if let Some(sent) = last_sent(prefs, category) {
            if now.saturating_sub(sent) < interval {
                return Decision::RateLimited;
            }
        }
    }

    Decision::Send
}

/// Stamp a successful send at `now`.
pub fn record_sent(prefs: &mut NotificationPreferences, category: Category, now: Timestamp) {
    match category {
        Category::SessionReport => prefs.last_report_sent = Some(now),
        Category::Warning => prefs.last_warning_sent = Some(now),
        Category::Presence => prefs.last_presence_sent = Some(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs_all_on() -> NotificationPreferences {
        NotificationPreferences {
            device_id: "mac1".into(),
            report_done: true,
            warnings: true,
            presence: true,
            ..NotificationPreferences::default()
        }
    }

    #[test]
    fn switched_off_category_never_fires() {
        let mut prefs = prefs_all_on();
        prefs.warnings = false;

        assert_eq!(decide(&prefs, Category::Warning, 1000), Decision::SwitchedOff);
        assert_eq!(decide(&prefs, Category::Presence, 1000), Decision::Send);
    }

    #[test]
    fn warning_rate_limited_within_interval() {
        let mut prefs = prefs_all_on();

        assert_eq!(decide(&prefs, Category::Warning, 1000), Decision::Send);
        record_sent(&mut prefs, Category::Warning, 1000);

        assert_eq!(
            decide(&prefs, Category::Warning, 1000 + ALERT_MIN_INTERVAL_SECS - 1),
            Decision::RateLimited
        );
        assert_eq!(
            decide(&prefs, Category::Warning, 1000 + ALERT_MIN_INTERVAL_SECS),
            Decision::Send
        );
    }

    #[test]
    fn session_report_not_interval_limited() {
        let mut prefs = prefs_all_on();
        record_sent(&mut prefs, Category::SessionReport, 1000);

        assert_eq!(decide(&prefs, Category::SessionReport, 1001), Decision::Send);
        assert_eq!(prefs.last_report_sent, Some(1000));
    }
}
