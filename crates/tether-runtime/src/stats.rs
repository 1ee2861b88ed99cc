//! In-memory message counters reported in heartbeat frames.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use tether_core::{Counters, StatsProvider};

/// Process-lifetime message counters.
#[derive(Debug, Default)]
pub struct MemoryStats {
    message_received: AtomicU64,
    message_sent: AtomicU64,
    last_message_time: AtomicI64,
}

impl MemoryStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one message broadcast to peers.
    pub fn record_sent(&self) {
        self.message_sent.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Counts one reply received from a peer.
    pub fn record_received(&self) {
        self.message_received.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    fn touch(&self) {
        self.last_message_time
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
    }
}

impl StatsProvider for MemoryStats {
    fn counters(&self) -> Counters {
        Counters {
            message_received: self.message_received.load(Ordering::Relaxed),
            message_sent: self.message_sent.load(Ordering::Relaxed),
            last_message_time: self.last_message_time.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(MemoryStats::new().counters(), Counters::default());
    }

    #[test]
    fn test_record() {
        let stats = MemoryStats::new();
        let before = chrono::Utc::now().timestamp();

        stats.record_sent();
        stats.record_sent();
        stats.record_received();

        let counters = stats.counters();
        assert_eq!(counters.message_sent, 2);
        assert_eq!(counters.message_received, 1);
        assert!(counters.last_message_time >= before);
    }
}
