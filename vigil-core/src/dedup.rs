//! Significant-field comparison for write suppression
//!
//! Devices report every few seconds; most messages repeat the previous
//! state. Persisting each one would make write amplification proportional
//! to message rate instead of to meaningful change. Each record type
//! declares a fixed set of *significant* fields, and only a change in one
//! of them makes a record novel enough to publish and persist.
//!
//! Cumulative day counters are deliberately not significant: they change
//! on almost every message and are carried by the same row, which is
//! rewritten whenever a significant field moves or the day rolls over.

use crate::records::{AttributeSnapshot, EventRecord};

/// Comparison over a record type's fixed significant-field set.
pub trait Significant {
    /// Whether the significant fields of both records are equal.
    fn significant_eq(&self, other: &Self) -> bool;
}

impl Significant for AttributeSnapshot {
    fn significant_eq(&self, other: &Self) -> bool {
        self.respiratory_rate == other.respiratory_rate
            && self.heart_rate == other.heart_rate
            && self.flow_state == other.flow_state
            && self.posture == other.posture
            && self.activity_freq == other.activity_freq
            && self.body_status == other.body_status
    }
}

impl Significant for EventRecord {
    fn significant_eq(&self, other: &Self) -> bool {
        self.present == other.present
            && self.posture_class == other.posture_class
            && self.warning == other.warning
    }
}

/// Whether `current` should be published and persisted.
///
/// No baseline means no previous state exists anywhere, which is always
/// novel.
pub fn is_novel<T: Significant>(current: &T, baseline: Option<&T>) -> bool {
    match baseline {
        None => true,
        Some(prev) => !current.significant_eq(prev),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::AttributePayload;

    fn snapshot(flow_state: i32, heart_rate: i32) -> AttributeSnapshot {
        let mut snap = AttributeSnapshot::seed("mac1", 1000);
        snap.apply(&AttributePayload {
            flow_state,
            heart_rate,
            ..Default::default()
        });
        snap
    }

    #[test]
    fn identical_significant_fields_suppress() {
        let first = snapshot(9, 70);
        let second = snapshot(9, 70);

        assert!(is_novel(&first, None));
        assert!(!is_novel(&second, Some(&first)));
    }

    #[test]
    fn any_significant_change_is_novel() {
        let first = snapshot(9, 70);
        let second = snapshot(2, 70);

        assert!(is_novel(&second, Some(&first)));
    }

    #[test]
    fn cumulative_buckets_are_not_significant() {
        let first = snapshot(9, 70);
        let mut second = snapshot(9, 70);
        second.high_flow_secs += 30;

        assert!(!is_novel(&second, Some(&first)));
    }
}
