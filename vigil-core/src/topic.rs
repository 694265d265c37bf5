//! Topic pattern matching for subscription routing
//!
//! Patterns and topics are `/`-delimited segment sequences. A pattern
//! segment of `+` or `#` matches any single topic segment at the same
//! position; every other segment must compare equal.
//!
//! ## Known limitation
//!
//! This matcher is positional: `#` does **not** implement the conventional
//! MQTT multi-level semantics (match all remaining segments regardless of
//! count). `device/#` matches `device/mac1` but not `device/mac1/state`.
//! The behavior is kept deliberately: existing subscriptions in the fleet
//! were written against it, and the router's test suite pins it down.

/// Check whether a subscription `pattern` matches a concrete `topic`.
///
/// ```
/// use vigil_core::topic::matches;
///
/// assert!(matches("device/+/state", "device/mac1/state"));
/// assert!(matches("device/#", "device/mac1"));
/// // Positional matching: segment counts must be equal.
/// assert!(!matches("device/#", "device/mac1/state"));
/// ```
pub fn matches(pattern: &str, topic: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split('/').collect();
    let topic_segs: Vec<&str> = topic.split('/').collect();

    if pattern_segs.len() != topic_segs.len() {
        return false;
    }

    pattern_segs
        .iter()
        .zip(&topic_segs)
        .all(|(p, t)| *p == "+" || *p == "#" || p == t)
}

/// Check whether a pattern contains any wildcard segment.
///
/// Routers use this to separate exact-key lookups from pattern scans.
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.split('/').any(|seg| seg == "+" || seg == "#")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exact_match() {
        assert!(matches("device/mac1/state", "device/mac1/state"));
        assert!(!matches("device/mac1/state", "device/mac2/state"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("device/+/state", "device/mac1/state"));
        assert!(matches("device/+/+", "device/mac1/state"));
        assert!(!matches("device/+/state", "device/mac1/report"));
    }

    #[test]
    fn unequal_lengths_never_match() {
        assert!(!matches("device/+", "device/mac1/state"));
        assert!(!matches("device/mac1/state", "device/mac1"));
        // The documented positional `#` behavior
        assert!(matches("device/#", "device/mac1"));
        assert!(!matches("device/#", "device/mac1/state"));
    }

    #[test]
    fn wildcard_detection() {
        assert!(is_wildcard("device/+/state"));
        assert!(is_wildcard("device/#"));
        assert!(!is_wildcard("device/mac1/state"));
    }

    proptest! {
        /// `+` at any position accepts an arbitrary segment there.
        #[test]
        fn plus_accepts_any_segment(seg in "[a-z0-9_]{1,12}") {
            let topic = format!("device/{seg}/state");
            prop_assert!(matches("device/+/state", &topic));
        }

        /// A pattern always matches itself when wildcard-free.
        #[test]
        fn reflexive_without_wildcards(
            segs in proptest::collection::vec("[a-z0-9_]{1,8}", 1..5)
        ) {
            let topic = segs.join("/");
            prop_assert!(matches(&topic, &topic));
        }
    }
}
