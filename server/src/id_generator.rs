//! Thread-safe source of connection and session ids.

use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU32, Ordering};

const START_ID_RANGE: RangeInclusive<u32> = 1_000_000..=10_000_000;
const INCREMENT_RANGE: RangeInclusive<u32> = 10_000..=100_000;

/// Hands out strictly increasing positive ids.
///
/// The default generator starts at a random offset and advances by a random
/// step, so ids are not trivially guessable by other clients. Ids wrap back
/// to a fresh random start once `u32` space is exhausted; callers that keep
/// ids alive for long check for collisions before using an id.
#[derive(Debug)]
pub struct IdentifierGenerator {
    current: AtomicU32,
    start: RangeInclusive<u32>,
    increment: RangeInclusive<u32>,
}

impl IdentifierGenerator {
    pub fn new() -> Self {
        let start = rand::thread_rng().gen_range(START_ID_RANGE);
        Self {
            current: AtomicU32::new(start),
            start: START_ID_RANGE,
            increment: INCREMENT_RANGE,
        }
    }

    /// Deterministic generator yielding `first`, `first + 1`, ... and
    /// continuing at 1 after `u32::MAX`.
    pub fn sequential(first: u32) -> Self {
        let first = first.max(1);
        Self {
            current: AtomicU32::new(first - 1),
            start: 1..=1,
            increment: 1..=1,
        }
    }

    pub fn generate_id(&self) -> u32 {
        let mut rng = rand::thread_rng();
        let step = rng.gen_range(self.increment.clone());
        let restart = rng.gen_range(self.start.clone());
        let advance = |current: u32| current.checked_add(step).unwrap_or(restart);

        let previous = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(advance(current))
            })
            .unwrap_or_else(|current| current);

        advance(previous)
    }
}

impl Default for IdentifierGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequential_ids() {
        let generator = IdentifierGenerator::sequential(1);
        assert_eq!(generator.generate_id(), 1);
        assert_eq!(generator.generate_id(), 2);
        assert_eq!(generator.generate_id(), 3);
    }

    #[test]
    fn test_sequential_continues_after_overflow() {
        let generator = IdentifierGenerator::sequential(u32::MAX);
        assert_eq!(generator.generate_id(), u32::MAX);
        assert_eq!(generator.generate_id(), 1);
        assert_eq!(generator.generate_id(), 2);
    }

    #[test]
    fn test_random_ids_are_positive_and_increasing() {
        let generator = IdentifierGenerator::new();
        let mut last = 0;

        for _ in 0..1000 {
            let id = generator.generate_id();
            assert!(id > last);
            assert!(id >= *START_ID_RANGE.start() + *INCREMENT_RANGE.start());
            last = id;
        }
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let generator = Arc::new(IdentifierGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..500).map(|_| generator.generate_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }

    #[test]
    fn test_wraps_to_fresh_start_on_overflow() {
        let generator = IdentifierGenerator {
            current: AtomicU32::new(u32::MAX - 1),
            start: 10..=10,
            increment: 5..=5,
        };

        assert_eq!(generator.generate_id(), 10);
        assert_eq!(generator.generate_id(), 15);
    }
}
