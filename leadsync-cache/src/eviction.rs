//! Approximate LRU eviction with an access-frequency tie-break.
//!
//! Entries are ranked by last access time, oldest first. Entries whose access
//! times are within the tolerance of the oldest remaining entry are treated as
//! equally old and ranked by access count, fewest first. Victims are picked
//! one at a time so the ranking stays well defined even though "within
//! tolerance" is not transitive.

use std::time::Duration;
use tokio::time::Instant;

/// Ranking input for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub key: String,
    pub last_accessed_at: Instant,
    pub access_count: u64,
}

/// Pick `surplus` keys to evict.
///
/// Each round looks at the oldest remaining access time, takes the entries
/// accessed less than `tolerance` after it, and evicts the one with the
/// lowest access count (older access, then key, break remaining ties).
pub fn select_victims(
    mut candidates: Vec<EvictionCandidate>,
    surplus: usize,
    tolerance: Duration,
) -> Vec<String> {
    let mut victims = Vec::with_capacity(surplus.min(candidates.len()));

    while victims.len() < surplus {
        let Some(oldest) = candidates.iter().map(|c| c.last_accessed_at).min() else {
            break;
        };

        let victim = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.last_accessed_at.saturating_duration_since(oldest) < tolerance)
            .min_by(|(_, a), (_, b)| {
                a.access_count
                    .cmp(&b.access_count)
                    .then(a.last_accessed_at.cmp(&b.last_accessed_at))
                    .then_with(|| a.key.cmp(&b.key))
            })
            .map(|(idx, _)| idx);

        match victim {
            Some(idx) => victims.push(candidates.swap_remove(idx).key),
            None => break,
        }
    }

    victims
}
