//! Scripted in-memory stand-in for [`DisplayConn`], driving the engines in
//! tests without a display server. Events and property reads are queued up
//! front; writes, notifications and ownership claims are recorded for
//! assertions.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use x11rb::protocol::xproto::{Atom, Timestamp, Window};

use crate::error::{Result, SelectionError};
use crate::x11::display::{ContentRequest, DisplayConn, DisplayEvent, SlotValue};

/// Payload of one recorded property write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteData {
    /// Format-8 write
    Bytes(Vec<u8>),
    /// Format-32 write
    Words(Vec<u32>),
}

/// One recorded property write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WriteRecord {
    pub(crate) window: Window,
    pub(crate) slot: Atom,
    pub(crate) ty: Atom,
    pub(crate) data: WriteData,
}

/// One recorded reply notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NotifyRecord {
    pub(crate) requestor: Window,
    pub(crate) target: Atom,
    pub(crate) slot: Option<Atom>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeDisplay {
    pub(crate) window: Window,
    pub(crate) max_chunk: usize,
    pub(crate) time: Timestamp,
    pub(crate) events: VecDeque<DisplayEvent>,
    /// Values returned by successive `read_slot` calls
    pub(crate) reads: VecDeque<SlotValue>,
    pub(crate) writes: Vec<WriteRecord>,
    pub(crate) notifies: Vec<NotifyRecord>,
    pub(crate) cleared: Vec<(Window, Atom)>,
    pub(crate) conversions: Vec<(Atom, Atom, Atom)>,
    pub(crate) claims: Vec<(Atom, Timestamp)>,
    /// (window, enabled) history of watch toggles
    pub(crate) watches: Vec<(Window, bool)>,
    /// Windows whose property writes the server rejects
    pub(crate) reject_windows: HashSet<Window>,
    /// Owner reported by `selection_owner`; defaults to our own window
    pub(crate) owner_override: Option<Window>,
    /// When set, every accepted write queues the matching consumed-slot event,
    /// simulating a requestor that reads and deletes each chunk promptly
    pub(crate) auto_consume: bool,
}

impl FakeDisplay {
    pub(crate) fn new(window: Window, max_chunk: usize) -> Self {
        Self {
            window,
            max_chunk,
            time: 1000,
            ..Default::default()
        }
    }

    pub(crate) fn push_event(&mut self, event: DisplayEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn push_read(&mut self, ty: Atom, data: &[u8]) {
        self.reads.push_back(SlotValue {
            ty,
            data: data.to_vec(),
        });
    }

    /// All writes that went to `(window, slot)`, in order.
    pub(crate) fn writes_to(&self, window: Window, slot: Atom) -> Vec<&WriteRecord> {
        self.writes
            .iter()
            .filter(|w| w.window == window && w.slot == slot)
            .collect()
    }

    /// Concatenation of every format-8 write to `(window, slot)`.
    pub(crate) fn bytes_written_to(&self, window: Window, slot: Atom) -> Vec<u8> {
        self.writes_to(window, slot)
            .into_iter()
            .filter_map(|w| match &w.data {
                WriteData::Bytes(b) => Some(b.as_slice()),
                WriteData::Words(_) => None,
            })
            .flatten()
            .copied()
            .collect()
    }
}

impl DisplayConn for FakeDisplay {
    fn window(&self) -> Window {
        self.window
    }

    fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    fn request_conversion(&mut self, selection: Atom, target: Atom, slot: Atom) -> Result<()> {
        self.conversions.push((selection, target, slot));
        Ok(())
    }

    fn read_slot(&mut self, _window: Window, _slot: Atom) -> Result<SlotValue> {
        self.reads.pop_front().ok_or(SelectionError::Display {
            op: "property read",
            source: "no scripted value".into(),
        })
    }

    fn clear_slot(&mut self, window: Window, slot: Atom) -> Result<()> {
        self.cleared.push((window, slot));
        Ok(())
    }

    fn write_slot8(&mut self, window: Window, slot: Atom, ty: Atom, data: &[u8]) -> Result<()> {
        if self.reject_windows.contains(&window) {
            return Err(SelectionError::SlotWriteRejected { window });
        }
        self.writes.push(WriteRecord {
            window,
            slot,
            ty,
            data: WriteData::Bytes(data.to_vec()),
        });
        if self.auto_consume {
            self.events
                .push_back(DisplayEvent::SlotCleared { window, slot });
        }
        Ok(())
    }

    fn write_slot32(&mut self, window: Window, slot: Atom, ty: Atom, data: &[u32]) -> Result<()> {
        if self.reject_windows.contains(&window) {
            return Err(SelectionError::SlotWriteRejected { window });
        }
        self.writes.push(WriteRecord {
            window,
            slot,
            ty,
            data: WriteData::Words(data.to_vec()),
        });
        if self.auto_consume {
            self.events
                .push_back(DisplayEvent::SlotCleared { window, slot });
        }
        Ok(())
    }

    fn watch_slots(&mut self, window: Window, enabled: bool) -> Result<()> {
        if self.reject_windows.contains(&window) {
            return Err(SelectionError::SlotWriteRejected { window });
        }
        self.watches.push((window, enabled));
        Ok(())
    }

    fn claim_selection(&mut self, selection: Atom, time: Timestamp) -> Result<()> {
        self.claims.push((selection, time));
        Ok(())
    }

    fn selection_owner(&mut self, _selection: Atom) -> Result<Window> {
        Ok(self.owner_override.unwrap_or(self.window))
    }

    fn send_done(&mut self, req: &ContentRequest, slot: Option<Atom>) -> Result<()> {
        self.notifies.push(NotifyRecord {
            requestor: req.requestor,
            target: req.target,
            slot,
        });
        Ok(())
    }

    fn server_time(&mut self) -> Result<Timestamp> {
        Ok(self.time)
    }

    fn next_event(&mut self) -> Result<DisplayEvent> {
        self.events.pop_front().ok_or(SelectionError::Display {
            op: "event wait",
            source: "event script exhausted".into(),
        })
    }

    fn next_event_timeout(&mut self, _wait: Duration) -> Result<Option<DisplayEvent>> {
        Ok(self.events.pop_front())
    }
}
