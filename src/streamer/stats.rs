//! Streaming statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared by every session of one streamer
#[derive(Debug, Default)]
pub(crate) struct StreamerCounters {
    pub active_sessions: AtomicUsize,
    pub sessions_total: AtomicU64,
    pub parts_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub encode_failures: AtomicU64,
}

impl StreamerCounters {
    pub fn snapshot(&self) -> StreamerStats {
        StreamerStats {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            parts_sent: self.parts_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for the multipart streamer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamerStats {
    /// Connections currently streaming
    pub active_sessions: usize,

    /// Connections accepted since startup
    pub sessions_total: u64,

    /// Multipart parts written across all sessions
    pub parts_sent: u64,

    /// Payload bytes written across all sessions
    pub bytes_sent: u64,

    /// Frames skipped because they could not be encoded
    pub encode_failures: u64,
}

impl StreamerStats {
    /// Counter growth since an earlier snapshot. `active_sessions` is a
    /// gauge and is carried over as is.
    pub fn since(&self, earlier: &Self) -> StreamerStats {
        StreamerStats {
            active_sessions: self.active_sessions,
            sessions_total: self.sessions_total.saturating_sub(earlier.sessions_total),
            parts_sent: self.parts_sent.saturating_sub(earlier.parts_sent),
            bytes_sent: self.bytes_sent.saturating_sub(earlier.bytes_sent),
            encode_failures: self.encode_failures.saturating_sub(earlier.encode_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_earlier_snapshot() {
        let earlier = StreamerStats {
            active_sessions: 3,
            sessions_total: 4,
            parts_sent: 100,
            bytes_sent: 50_000,
            encode_failures: 1,
        };
        let current = StreamerStats {
            active_sessions: 1,
            sessions_total: 6,
            parts_sent: 160,
            bytes_sent: 175_000,
            encode_failures: 1,
        };

        let delta = current.since(&earlier);
        assert_eq!(delta.active_sessions, 1);
        assert_eq!(delta.sessions_total, 2);
        assert_eq!(delta.parts_sent, 60);
        assert_eq!(delta.bytes_sent, 125_000);
        assert_eq!(delta.encode_failures, 0);

        // Never underflows if snapshots arrive out of order.
        assert_eq!(earlier.since(&current).parts_sent, 0);
    }

    #[test]
    fn test_counter_snapshot() {
        let counters = StreamerCounters::default();
        counters.parts_sent.fetch_add(3, Ordering::Relaxed);
        counters.active_sessions.fetch_add(1, Ordering::Relaxed);

        let stats = counters.snapshot();
        assert_eq!(stats.parts_sent, 3);
        assert_eq!(stats.active_sessions, 1);
    }
}
