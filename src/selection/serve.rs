//! Serve Engine
//!
//! Outbound side of the exchange: own the selection and answer every peer
//! request for it. Small payloads go out in one reply; oversized payloads
//! negotiate incremental delivery, one independently-cursored stream per
//! requestor. The engine is pure state over the [`DisplayConn`] seam — all
//! side effects go through the connection handed to each method.

use bytes::Bytes;
use tracing::{debug, info, trace, warn};
use x11rb::protocol::xproto::{Atom, Timestamp, Window};

use crate::error::{Result, SelectionError};
use crate::selection::transfer::{TransferKey, TransferQueue};
use crate::x11::atoms::{ProtocolAtoms, SelectionTokens};
use crate::x11::display::{ContentRequest, DisplayConn};

/// Selection owner state for one serve run.
#[derive(Debug)]
pub struct ServeEngine {
    tokens: SelectionTokens,
    proto: ProtocolAtoms,
    payload: Bytes,
    claim_time: Timestamp,
    transfers: TransferQueue,
    lost: bool,
}

impl ServeEngine {
    /// Engine for one payload captured at `claim_time`.
    pub fn new(
        tokens: SelectionTokens,
        proto: ProtocolAtoms,
        payload: Bytes,
        claim_time: Timestamp,
    ) -> Self {
        Self {
            tokens,
            proto,
            payload,
            claim_time,
            transfers: TransferQueue::new(),
            lost: false,
        }
    }

    /// Claim ownership and verify the claim took effect. A mismatched owner
    /// means another client won the race; there is no retry.
    pub fn claim<D: DisplayConn>(&self, dpy: &mut D) -> Result<()> {
        dpy.claim_selection(self.tokens.selection, self.claim_time)?;
        if dpy.selection_owner(self.tokens.selection)? != dpy.window() {
            return Err(SelectionError::OwnershipRaceLost);
        }
        info!(
            selection = self.tokens.selection,
            time = self.claim_time,
            len = self.payload.len(),
            "selection ownership confirmed"
        );
        Ok(())
    }

    /// Answer one content request.
    ///
    /// Request timestamps are not checked against the claim time; plenty of
    /// real requestors stamp CURRENT_TIME.
    pub fn handle_request<D: DisplayConn>(&mut self, dpy: &mut D, req: ContentRequest) -> Result<()> {
        if req.target == self.proto.multiple {
            return Err(SelectionError::MultipleUnsupported);
        }
        let Some(slot) = req.slot else {
            debug!(requestor = req.requestor, "request without a reply property, refusing");
            return dpy.send_done(&req, None);
        };

        let outcome = if req.target == self.proto.targets {
            // MULTIPLE is deliberately absent from the advertised set.
            let supported = [self.tokens.target, self.proto.targets, self.proto.timestamp];
            dpy.write_slot32(req.requestor, slot, self.proto.atom, &supported)
        } else if req.target == self.proto.timestamp {
            dpy.write_slot32(req.requestor, slot, self.proto.integer, &[self.claim_time])
        } else if req.target == self.tokens.target {
            self.reply_content(dpy, req.requestor, slot)
        } else {
            debug!(requested = req.target, "unsupported target, refusing");
            return dpy.send_done(&req, None);
        };

        match outcome {
            Ok(()) => dpy.send_done(&req, Some(slot)),
            Err(err) if err.is_recoverable() => {
                // One bad peer must not starve the others.
                warn!(requestor = req.requestor, %err, "degrading reply to a refusal");
                dpy.send_done(&req, None)
            }
            Err(err) => Err(err),
        }
    }

    /// Write the payload directly, or negotiate incremental delivery when it
    /// exceeds what one message carries.
    fn reply_content<D: DisplayConn>(&mut self, dpy: &mut D, requestor: Window, slot: Atom) -> Result<()> {
        if self.payload.len() <= dpy.max_chunk() {
            return dpy.write_slot8(requestor, slot, self.tokens.target, &self.payload);
        }

        // The zero-length INCR marker tells the requestor to start the
        // consume-then-refill cycle. We need its property events from here
        // until the terminal chunk.
        dpy.watch_slots(requestor, true)?;
        if let Err(err) = dpy.write_slot32(requestor, slot, self.proto.incr, &[]) {
            let _ = dpy.watch_slots(requestor, false);
            return Err(err);
        }
        self.transfers.begin(TransferKey {
            window: requestor,
            slot,
        });
        debug!(
            requestor,
            len = self.payload.len(),
            "incremental delivery registered"
        );
        Ok(())
    }

    /// Deliver the next chunk after the requestor consumed the previous one.
    /// Clears that do not match an active delivery are ignored.
    pub fn handle_slot_cleared<D: DisplayConn>(
        &mut self,
        dpy: &mut D,
        window: Window,
        slot: Atom,
    ) -> Result<()> {
        let key = TransferKey { window, slot };
        let next = match self.transfers.get_mut(&key) {
            Some(transfer) => transfer.next_range(self.payload.len(), dpy.max_chunk()),
            None => return Ok(()),
        };

        match next {
            Some(range) => {
                let chunk = self.payload.slice(range.clone());
                match dpy.write_slot8(window, slot, self.tokens.target, &chunk) {
                    Ok(()) => {
                        if let Some(transfer) = self.transfers.get_mut(&key) {
                            transfer.advance(chunk.len());
                        }
                        trace!(window, cursor = range.end, "chunk delivered");
                        Ok(())
                    }
                    Err(err) if err.is_recoverable() => {
                        self.abandon(dpy, key, &err);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            None => {
                // Terminal zero-length chunk: the stream terminator the
                // requestor's reader is waiting for.
                let written = dpy.write_slot8(window, slot, self.tokens.target, &[]);
                self.transfers.finish(&key);
                let _ = dpy.watch_slots(window, false);
                match written {
                    Ok(()) => {
                        debug!(window, len = self.payload.len(), "incremental delivery complete");
                        Ok(())
                    }
                    Err(err) if err.is_recoverable() => {
                        warn!(window, %err, "requestor vanished at stream end");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Note a lost-ownership event for our selection.
    pub fn note_ownership_lost(&mut self, selection: Atom) {
        if selection == self.tokens.selection {
            info!(pending = self.transfers.len(), "selection ownership lost");
            self.lost = true;
        }
    }

    /// True once ownership is gone and every delivery has drained.
    pub fn done(&self) -> bool {
        self.lost && self.transfers.is_empty()
    }

    /// True while ownership is gone but deliveries are still in flight.
    pub fn draining(&self) -> bool {
        self.lost && !self.transfers.is_empty()
    }

    /// Number of deliveries still in flight.
    pub fn pending(&self) -> usize {
        self.transfers.len()
    }

    /// Drop whatever deliveries remain. Used when peers stall during the
    /// post-loss drain.
    pub fn abandon_pending<D: DisplayConn>(&mut self, dpy: &mut D) {
        for (key, transfer) in self.transfers.drain() {
            warn!(
                window = key.window,
                slot = key.slot,
                delivered = transfer.cursor(),
                age = ?transfer.age(),
                "dropping stalled delivery"
            );
            let _ = dpy.watch_slots(key.window, false);
        }
    }

    fn abandon<D: DisplayConn>(&mut self, dpy: &mut D, key: TransferKey, err: &SelectionError) {
        warn!(
            window = key.window,
            slot = key.slot,
            %err,
            "abandoning incremental delivery"
        );
        self.transfers.finish(&key);
        let _ = dpy.watch_slots(key.window, false);
    }
}
