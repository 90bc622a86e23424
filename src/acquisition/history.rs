// src/acquisition/history.rs
//! Bounded, time-ordered sample history for visualization

use crate::hal::types::SampleBlock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Ring of the most recent samples.
///
/// Timestamps and rows are kept in two parallel queues of equal length. Once
/// `capacity` is reached every append evicts the oldest entries first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    timestamps: VecDeque<f64>,
    rows: VecDeque<Vec<f64>>,
    capacity: usize,
}

/// Copy of the retained samples inside a query window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub timestamps: Vec<f64>,
    /// One row of channel values per timestamp
    pub rows: Vec<Vec<f64>>,
}

impl HistorySnapshot {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Values of one channel over time
    pub fn channel(&self, index: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.get(index).copied().unwrap_or(0.0))
            .collect()
    }

    /// Seconds covered from first to last sample
    pub fn span_s(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            timestamps: VecDeque::with_capacity(capacity),
            rows: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn latest_timestamp(&self) -> Option<f64> {
        self.timestamps.back().copied()
    }

    /// Append every sample of the block in order
    pub fn append(&mut self, block: &SampleBlock) {
        // Only the tail of an oversized block can survive
        let skip = block.len().saturating_sub(self.capacity);
        let incoming = block.len() - skip;

        let overflow = (self.len() + incoming).saturating_sub(self.capacity);
        self.timestamps.drain(..overflow);
        self.rows.drain(..overflow);

        for sample in block.samples().skip(skip) {
            self.timestamps.push_back(sample.timestamp);
            self.rows.push_back(sample.values);
        }
    }

    /// Samples with `timestamp >= latest - window_s`, or `None` when empty
    pub fn snapshot(&self, window_s: f64) -> Option<HistorySnapshot> {
        let latest = self.latest_timestamp()?;
        let cutoff = latest - window_s.max(0.0);
        let start = self.timestamps.partition_point(|&t| t < cutoff);

        Some(HistorySnapshot {
            timestamps: self.timestamps.range(start..).copied().collect(),
            rows: self.rows.range(start..).cloned().collect(),
        })
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Block of `n` samples at 1 kHz starting at `start`, value = sample index
    fn block(start: f64, first_index: usize, n: usize, channels: usize) -> SampleBlock {
        let timestamps = (0..n).map(|i| start + i as f64 * 0.001).collect();
        let data = (0..channels)
            .map(|_| (0..n).map(|i| (first_index + i) as f64).collect())
            .collect();
        SampleBlock::new(timestamps, data)
    }

    #[test]
    fn test_empty_snapshot_is_none() {
        let buffer = HistoryBuffer::new(10);
        assert!(buffer.snapshot(1.0).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut buffer = HistoryBuffer::new(150);
        buffer.append(&block(0.0, 0, 100, 2));
        buffer.append(&block(0.1, 100, 100, 2));

        assert_eq!(buffer.len(), 150);
        let snapshot = buffer.snapshot(f64::MAX).unwrap();
        assert_eq!(snapshot.channel(0).first(), Some(&50.0));
        assert_eq!(snapshot.channel(1).last(), Some(&199.0));
    }

    #[test]
    fn test_oversized_block() {
        let mut buffer = HistoryBuffer::new(30);
        buffer.append(&block(0.0, 0, 100, 1));

        assert_eq!(buffer.len(), 30);
        let snapshot = buffer.snapshot(10.0).unwrap();
        assert_eq!(snapshot.channel(0), (70..100).map(|v| v as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_window_selection() {
        let mut buffer = HistoryBuffer::new(1000);
        buffer.append(&block(0.0, 0, 500, 1));

        // Latest is 0.499; window 0.1 keeps 0.399..=0.499
        let snapshot = buffer.snapshot(0.1).unwrap();
        assert!(snapshot.timestamps.iter().all(|&t| t >= 0.499 - 0.1 - 1e-12));
        assert!(snapshot.len() >= 100 && snapshot.len() <= 101);
        assert!((snapshot.span_s() - 0.1).abs() < 0.0011);

        let all = buffer.snapshot(5.0).unwrap();
        assert_eq!(all.len(), 500);
    }

    #[test]
    fn test_clear() {
        let mut buffer = HistoryBuffer::new(100);
        buffer.append(&block(0.0, 0, 50, 3));
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(buffer.snapshot(1.0).is_none());
        assert_eq!(buffer.capacity(), 100);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(
            capacity in 1usize..300,
            sizes in proptest::collection::vec(0usize..200, 1..20),
        ) {
            let mut buffer = HistoryBuffer::new(capacity);
            let mut total = 0usize;
            for n in sizes {
                buffer.append(&block(total as f64 * 0.001, total, n, 1));
                total += n;
                prop_assert!(buffer.len() <= capacity);
            }

            prop_assert_eq!(buffer.len(), total.min(capacity));
            if let Some(snapshot) = buffer.snapshot(f64::MAX) {
                let expected: Vec<f64> = (total - buffer.len()..total).map(|v| v as f64).collect();
                prop_assert_eq!(snapshot.channel(0), expected);
                prop_assert!(snapshot.timestamps.windows(2).all(|w| w[1] > w[0]));
            }
        }

        #[test]
        fn prop_snapshot_respects_window(window in 0.0f64..1.0, n in 1usize..1000) {
            let mut buffer = HistoryBuffer::new(1000);
            buffer.append(&block(0.0, 0, n, 1));

            let latest = buffer.latest_timestamp().unwrap();
            let snapshot = buffer.snapshot(window).unwrap();
            prop_assert!(snapshot.timestamps.iter().all(|&t| t >= latest - window));
            prop_assert_eq!(snapshot.timestamps.last().copied(), Some(latest));
        }
    }
}
