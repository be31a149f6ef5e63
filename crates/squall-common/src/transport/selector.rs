//! Backend selection strategies for the replicated transport.

use rand::Rng;

/// Picks which backend connection a transport call lands on.
///
/// Selection is deliberately validity-blind: an invalid connection is
/// expected to surface a transport-level failure on use, which callers
/// treat as retryable. Keeping the choice behind this trait lets a
/// weighted or health-aware selector replace the random one without
/// touching callers.
pub trait BackendSelector: Send + Sync {
    /// Select an index in `0..count`. `count` is always non-zero.
    fn select(&self, count: usize) -> usize;
}

/// Uniform random selection across all configured backends.
///
/// Spreads load across independently-scaled backend instances without
/// coordination overhead; consumers drain every backend's queue, so it
/// does not matter which producer wrote which item.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl BackendSelector for RandomSelector {
    fn select(&self, count: usize) -> usize {
        rand::rng().random_range(0..count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_selector_stays_in_range() {
        let selector = RandomSelector;
        for _ in 0..1000 {
            assert!(selector.select(3) < 3);
        }
    }

    #[test]
    fn random_selector_covers_all_backends() {
        let selector = RandomSelector;
        let mut hits = [0usize; 3];
        for _ in 0..3000 {
            hits[selector.select(3)] += 1;
        }
        // Statistical, not per-call: each backend should land well away
        // from zero over 3000 trials.
        for (backend, count) in hits.iter().enumerate() {
            assert!(
                *count > 700,
                "backend {backend} selected only {count} times"
            );
        }
    }

    #[test]
    fn single_backend_always_selected() {
        let selector = RandomSelector;
        for _ in 0..10 {
            assert_eq!(selector.select(1), 0);
        }
    }
}
