//! Capacity-bounded, severity-ordered entry selection.

use crate::normalize::{Entry, Severity};
use tracing::{debug, info};

/// Output of [`prioritize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prioritized {
    pub entries: Vec<Entry>,
    /// True when the input held more entries than the capacity.
    pub truncated: bool,
}

/// Select at most `capacity` entries, most severe first.
///
/// Input that fits is returned untouched, in input order. Otherwise entries
/// are bucketed by severity (each bucket keeps input order), buckets are
/// concatenated Exploit, Bruteforce, Scan, Unclassified, and the first
/// `capacity` are kept. A higher bucket is exhausted before any lower one is
/// considered; there are no per-class quotas.
pub fn prioritize(entries: Vec<Entry>, capacity: usize) -> Prioritized {
    if entries.len() <= capacity {
        return Prioritized {
            entries,
            truncated: false,
        };
    }

    let total = entries.len();
    let mut buckets: [Vec<Entry>; Severity::ORDERED.len()] = std::array::from_fn(|_| Vec::new());
    for entry in entries {
        buckets[entry.severity_index()].push(entry);
    }

    debug!(
        exploit = buckets[0].len(),
        bruteforce = buckets[1].len(),
        scan = buckets[2].len(),
        unclassified = buckets[3].len(),
        "Bucketed entries by severity"
    );

    let selected: Vec<Entry> = buckets.into_iter().flatten().take(capacity).collect();

    info!(
        input = total,
        capacity = capacity,
        selected = selected.len(),
        dropped = total - selected.len(),
        "Truncated entries to capacity (most severe first)"
    );

    Prioritized {
        entries: selected,
        truncated: true,
    }
}
