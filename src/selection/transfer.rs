//! Outbound Transfer Queue
//!
//! One cursor per concurrent incremental delivery, keyed by the
//! (requestor window, reply property) pair. Per-requestor delivery is
//! strictly sequential; cross-requestor order is unconstrained. Every
//! transfer slices the same shared payload, so the queue holds positions,
//! never data.

use std::collections::hash_map::{Drain, HashMap};
use std::ops::Range;
use std::time::{Duration, Instant};

use tracing::warn;
use x11rb::protocol::xproto::{Atom, Window};

/// Identity of one incremental delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferKey {
    /// Requestor window the chunks are written to
    pub window: Window,
    /// Reply property carrying the chunks
    pub slot: Atom,
}

/// Cursor state for one incremental delivery.
#[derive(Debug)]
pub struct OutboundTransfer {
    cursor: usize,
    started: Instant,
}

impl OutboundTransfer {
    fn new() -> Self {
        Self {
            cursor: 0,
            started: Instant::now(),
        }
    }

    /// Bytes delivered so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Range of the next chunk, or None once the payload is fully delivered
    /// and the terminal zero-length chunk is due.
    pub fn next_range(&self, payload_len: usize, max_chunk: usize) -> Option<Range<usize>> {
        debug_assert!(self.cursor <= payload_len);
        let remaining = payload_len - self.cursor;
        (remaining > 0).then(|| self.cursor..self.cursor + remaining.min(max_chunk))
    }

    /// Advance past a delivered chunk. The cursor never moves backwards.
    pub fn advance(&mut self, delivered: usize) {
        self.cursor += delivered;
    }

    /// Time since the delivery was registered.
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Active incremental deliveries.
#[derive(Debug, Default)]
pub struct TransferQueue {
    active: HashMap<TransferKey, OutboundTransfer>,
}

impl TransferQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delivery. A duplicate key restarts that requestor's stream
    /// from the beginning; the key stays unique either way.
    pub fn begin(&mut self, key: TransferKey) {
        if self.active.insert(key, OutboundTransfer::new()).is_some() {
            warn!(
                window = key.window,
                slot = key.slot,
                "restarting incremental delivery for repeat request"
            );
        }
    }

    /// Cursor for `key`, if a delivery is active.
    pub fn get_mut(&mut self, key: &TransferKey) -> Option<&mut OutboundTransfer> {
        self.active.get_mut(key)
    }

    /// Remove and return a finished or abandoned delivery.
    pub fn finish(&mut self, key: &TransferKey) -> Option<OutboundTransfer> {
        self.active.remove(key)
    }

    /// Remove every remaining delivery.
    pub fn drain(&mut self) -> Drain<'_, TransferKey, OutboundTransfer> {
        self.active.drain()
    }

    /// True when no delivery is in flight.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of deliveries in flight.
    pub fn len(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: TransferKey = TransferKey {
        window: 0x0200_0001,
        slot: 42,
    };

    #[test]
    fn test_next_range_respects_chunk_limit() {
        let transfer = OutboundTransfer::new();
        assert_eq!(transfer.next_range(5000, 1000), Some(0..1000));
        assert_eq!(transfer.next_range(300, 1000), Some(0..300));
    }

    #[test]
    fn test_next_range_terminal_after_full_delivery() {
        let mut transfer = OutboundTransfer::new();
        transfer.advance(700);
        assert_eq!(transfer.next_range(1000, 1000), Some(700..1000));
        transfer.advance(300);
        assert_eq!(transfer.next_range(1000, 1000), None);
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let mut transfer = OutboundTransfer::new();
        let mut last = 0;
        for _ in 0..5 {
            if let Some(range) = transfer.next_range(5000, 1000) {
                assert!(range.start >= last);
                transfer.advance(range.len());
                last = range.end;
            }
        }
        assert_eq!(transfer.cursor(), 5000);
    }

    #[test]
    fn test_duplicate_key_restarts_stream() {
        let mut queue = TransferQueue::new();
        queue.begin(KEY);
        queue.get_mut(&KEY).unwrap().advance(500);
        queue.begin(KEY);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get_mut(&KEY).unwrap().cursor(), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut queue = TransferQueue::new();
        let other = TransferKey {
            window: 0x0300_0001,
            slot: KEY.slot,
        };
        queue.begin(KEY);
        queue.begin(other);
        queue.get_mut(&KEY).unwrap().advance(100);
        assert_eq!(queue.get_mut(&other).unwrap().cursor(), 0);
        assert_eq!(queue.len(), 2);

        assert!(queue.finish(&KEY).is_some());
        assert!(queue.finish(&KEY).is_none());
        assert!(!queue.is_empty());
        assert!(queue.finish(&other).is_some());
        assert!(queue.is_empty());
    }
}
