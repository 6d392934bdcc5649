//! Session id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

use paizer_protocol::SessionId;

/// Hands out session ids: strictly increasing, starting at 1, never
/// reused.
///
/// `fetch_add` is a single atomic read-modify-write, so any number of
/// accepting handlers can call [`next`](Self::next) concurrently without
/// ever seeing the same value. Running out of `u64` is not a concern at
/// chat-relay scale.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Creates an allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next unused id.
    pub fn next(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_next_starts_above_zero_and_increases() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next(), SessionId(1));
        assert_eq!(ids.next(), SessionId(2));
        assert_eq!(ids.next(), SessionId(3));
    }

    #[test]
    fn test_next_concurrent_callers_get_distinct_ids() {
        let ids = Arc::new(IdAllocator::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..1_000).map(|_| ids.next()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("thread panicked") {
                assert!(seen.insert(id), "id {id} issued twice");
            }
        }
        assert_eq!(seen.len(), 8_000);
        assert!(!seen.contains(&SessionId(0)));
    }
}
