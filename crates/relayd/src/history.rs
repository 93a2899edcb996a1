//! Bounded replay buffer of recent envelopes.
//!
//! Eviction is strictly by insertion order: once the ring is full every
//! append drops the oldest entry. Nothing is ever promoted or removed
//! individually.
//!
//! The ring has no locking of its own; it is owned by the coordinator
//! actor and only touched from that task.

use std::collections::VecDeque;

use relay_protocol::Envelope;

/// Default number of envelopes kept for replay.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Fixed-capacity FIFO of the most recent envelopes.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<Envelope>,
    capacity: usize,
}

impl HistoryRing {
    /// Creates an empty ring holding at most `capacity` envelopes.
    ///
    /// A capacity of zero is allowed and keeps nothing. Storage grows with
    /// the entries actually held, not with `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Appends to the tail, evicting from the head while over capacity.
    pub fn append(&mut self, envelope: Envelope) {
        self.entries.push_back(envelope);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Returns a copy of all entries, oldest first.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.entries.iter().cloned().collect()
    }

    /// Number of stored envelopes (never above capacity).
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Maximum number of stored envelopes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::MessageType;
    use serde_json::json;

    fn envelope(n: usize) -> Envelope {
        Envelope::new(MessageType::ClientMessage, Some(json!(n)))
    }

    fn payloads(ring: &HistoryRing) -> Vec<serde_json::Value> {
        ring.snapshot()
            .into_iter()
            .filter_map(Envelope::into_payload)
            .collect()
    }

    #[test]
    fn test_empty_ring() {
        let ring = HistoryRing::new(3);
        assert!(ring.is_empty());
        assert_eq!(ring.count(), 0);
        assert!(ring.snapshot().is_empty());
    }

    #[test]
    fn test_append_under_capacity_keeps_order() {
        let mut ring = HistoryRing::new(5);
        for n in 0..3 {
            ring.append(envelope(n));
        }
        assert_eq!(ring.count(), 3);
        assert_eq!(payloads(&ring), vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_overflow_evicts_oldest_first() {
        for capacity in [1usize, 2, 7, 50] {
            for total in [0usize, 1, capacity, capacity + 1, capacity * 3 + 2] {
                let mut ring = HistoryRing::new(capacity);
                for n in 0..total {
                    ring.append(envelope(n));
                    assert!(ring.count() <= capacity);
                }

                let expected: Vec<_> = (total.saturating_sub(capacity)..total).map(|n| json!(n)).collect();
                assert_eq!(ring.count(), total.min(capacity));
                assert_eq!(payloads(&ring), expected, "capacity={capacity} total={total}");
            }
        }
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut ring = HistoryRing::new(0);
        ring.append(envelope(1));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut ring = HistoryRing::new(2);
        ring.append(envelope(1));
        let before = ring.snapshot();

        ring.append(envelope(2));
        ring.append(envelope(3));

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].payload(), Some(&json!(1)));
    }

    #[test]
    fn test_huge_capacity_does_not_preallocate() {
        let mut ring = HistoryRing::new(usize::MAX);
        ring.append(envelope(1));

        assert_eq!(ring.count(), 1);
        assert_eq!(ring.capacity(), usize::MAX);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(HistoryRing::default().capacity(), DEFAULT_HISTORY_CAPACITY);
    }
}
