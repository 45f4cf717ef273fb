//! Acquire Engine
//!
//! Inbound side of the exchange: ask the current owner to convert the
//! selection into our staging property, then read the result directly or as
//! an incremental stream. The transfer mode is fixed by the type of the
//! first property read: the INCR marker type switches to chunked assembly,
//! anything else is a one-shot read.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};
use x11rb::protocol::xproto::{Atom, Timestamp};

use crate::error::{Result, SelectionError};
use crate::x11::atoms::{ProtocolAtoms, SelectionTokens};
use crate::x11::display::{DisplayConn, DisplayEvent};

/// A captured selection with the timestamp of its conversion.
#[derive(Debug, Clone)]
pub struct Acquired {
    /// Full payload, assembled in arrival order
    pub payload: Bytes,
    /// Server time of the conversion, carried forward as the ownership
    /// claim timestamp to stay serialized with the previous owner
    pub time: Timestamp,
}

/// Fetch the current contents of the selection from whoever owns it.
///
/// `wait` bounds every suspension on the owner; `None` waits forever.
pub fn acquire<D: DisplayConn>(
    dpy: &mut D,
    tokens: SelectionTokens,
    proto: ProtocolAtoms,
    wait: Option<Duration>,
) -> Result<Acquired> {
    let win = dpy.window();
    dpy.request_conversion(tokens.selection, tokens.target, tokens.stage)?;

    let (time, slot) = wait_for(dpy, wait, |event| match event {
        DisplayEvent::ConversionResult { time, slot } => Some((time, slot)),
        _ => None,
    })?;
    let slot = slot.ok_or(SelectionError::ConversionUnavailable)?;

    let first = dpy.read_slot(win, slot)?;
    let payload = if first.ty == proto.incr {
        debug!("owner chose incremental transfer");
        read_incremental(dpy, slot, wait)?
    } else {
        dpy.clear_slot(win, slot)?;
        Bytes::from(first.data)
    };

    if payload.is_empty() {
        return Err(SelectionError::EmptyInput);
    }
    debug!(len = payload.len(), time, "selection acquired");
    Ok(Acquired { payload, time })
}

/// Assemble an incremental stream until the owner's zero-length terminator.
fn read_incremental<D: DisplayConn>(
    dpy: &mut D,
    slot: Atom,
    wait: Option<Duration>,
) -> Result<Bytes> {
    let win = dpy.window();
    let mut buf = BytesMut::new();
    loop {
        // Deleting the property tells the owner we are ready for more.
        dpy.clear_slot(win, slot)?;
        wait_for(dpy, wait, |event| match event {
            DisplayEvent::SlotNewValue { window, slot: s } if window == win && s == slot => {
                Some(())
            }
            _ => None,
        })?;

        let chunk = dpy.read_slot(win, slot)?;
        if chunk.data.is_empty() {
            dpy.clear_slot(win, slot)?;
            return Ok(buf.freeze());
        }
        trace!(len = chunk.data.len(), total = buf.len(), "chunk received");
        buf.extend_from_slice(&chunk.data);
    }
}

/// Wait for the first event `accept` extracts from, ignoring everything
/// else. The deadline spans the whole wait, unrelated events included.
fn wait_for<D, T>(
    dpy: &mut D,
    wait: Option<Duration>,
    mut accept: impl FnMut(DisplayEvent) -> Option<T>,
) -> Result<T>
where
    D: DisplayConn,
{
    let deadline = wait.map(|w| (w, Instant::now() + w));
    loop {
        let event = match deadline {
            None => dpy.next_event()?,
            Some((total, until)) => {
                let remaining = until.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(SelectionError::PeerTimeout(total));
                }
                dpy.next_event_timeout(remaining)?
                    .ok_or(SelectionError::PeerTimeout(total))?
            }
        };
        match accept(event) {
            Some(value) => return Ok(value),
            None => trace!("ignoring event while waiting"),
        }
    }
}
