//! Monotonic notification IDs for log correlation across the two processes.

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Prefix of every notification ID.
pub const NOTIFICATION_ID_PREFIX: &str = "ntf-";

/// Generate a unique notification ID: `ntf-<monotonic counter>`.
pub fn generate_notification_id() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{NOTIFICATION_ID_PREFIX}{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_expected_pattern() {
        let id = generate_notification_id();
        assert!(id.starts_with("ntf-"), "expected ntf- prefix, got: {id}");
        let suffix = &id[NOTIFICATION_ID_PREFIX.len()..];
        assert!(suffix.parse::<u64>().is_ok(), "suffix not numeric: {suffix}");
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..100)
                        .map(|_| generate_notification_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}
