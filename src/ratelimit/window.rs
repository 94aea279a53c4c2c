//! Per-client timestamp ledger for one route class.

use std::collections::VecDeque;
use std::time::Duration;

/// Accepted request timestamps for a single (client, route class) pair.
///
/// Timestamps are kept in chronological order, oldest at the front. Callers
/// purge before every read so that the record only ever holds timestamps in
/// `[now - window, now]`.
#[derive(Debug, Clone)]
pub struct WindowRecord {
    /// Accepted request times, as durations since the Unix epoch
    timestamps: VecDeque<Duration>,
    /// Window the record was last evaluated with
    window: Duration,
}

impl WindowRecord {
    /// Create an empty record for the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window,
        }
    }

    /// Drop timestamps strictly older than `now - window`.
    ///
    /// Returns the number of timestamps removed.
    pub fn purge(&mut self, now: Duration) -> usize {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return 0;
        };

        let before = self.timestamps.len();
        while self.timestamps.front().is_some_and(|&t| t < cutoff) {
            self.timestamps.pop_front();
        }
        before - self.timestamps.len()
    }

    /// Append an accepted request.
    ///
    /// A timestamp earlier than the newest one is clamped to it so the record
    /// stays ordered when requests read the clock before contending for the
    /// record.
    pub fn record(&mut self, now: Duration) {
        let at = match self.timestamps.back() {
            Some(&newest) if newest > now => newest,
            _ => now,
        };
        self.timestamps.push_back(at);
    }

    /// Number of retained timestamps.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the record holds no timestamps.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The oldest retained timestamp.
    pub fn oldest(&self) -> Option<Duration> {
        self.timestamps.front().copied()
    }

    /// The window this record is evaluated with.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Update the window the record is purged with.
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_new_record_is_empty() {
        let record = WindowRecord::new(secs(10));
        assert!(record.is_empty());
        assert_eq!(record.oldest(), None);
        assert_eq!(record.window(), secs(10));
    }

    #[test]
    fn test_purge_drops_only_strictly_older() {
        let mut record = WindowRecord::new(secs(10));
        for t in [100, 101, 105] {
            record.record(secs(t));
        }

        // Cutoff is 101: 100 goes, 101 stays
        assert_eq!(record.purge(secs(111)), 1);
        assert_eq!(record.len(), 2);
        assert_eq!(record.oldest(), Some(secs(101)));

        assert_eq!(record.purge(secs(200)), 2);
        assert!(record.is_empty());
    }

    #[test]
    fn test_purge_near_epoch_keeps_everything() {
        let mut record = WindowRecord::new(secs(10));
        record.record(secs(1));
        assert_eq!(record.purge(secs(5)), 0);
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_record_keeps_chronological_order() {
        let mut record = WindowRecord::new(secs(10));
        record.record(secs(50));
        record.record(secs(49));
        record.record(secs(51));

        assert_eq!(record.oldest(), Some(secs(50)));
        assert_eq!(record.len(), 3);
        // The clamped entry expires with its neighbour, not before it
        assert_eq!(record.purge(secs(60)), 0);
        assert_eq!(record.purge(secs(61)), 2);
    }
}
