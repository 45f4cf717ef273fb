//! Event Dispatcher
//!
//! The single-threaded pull loop driving the serve phase. Every transition
//! happens synchronously inside one dispatch step; the only suspension point
//! is the wait for the next event. Once ownership is lost the loop keeps
//! routing until every registered delivery has drained, so an in-flight
//! chunked transfer is never cut off by a concurrent ownership change.

use std::time::Duration;

use tracing::{trace, warn};

use crate::error::Result;
use crate::selection::serve::ServeEngine;
use crate::x11::display::{DisplayConn, DisplayEvent};

/// Pull and route events until ownership is lost and drained.
///
/// While draining, each wait is bounded by `drain_wait`; peers that stall
/// past the deadline are dropped rather than holding the process hostage.
pub fn run<D: DisplayConn>(
    dpy: &mut D,
    engine: &mut ServeEngine,
    drain_wait: Option<Duration>,
) -> Result<()> {
    while !engine.done() {
        let event = if engine.draining() {
            match next_draining(dpy, engine, drain_wait)? {
                Some(event) => event,
                None => break,
            }
        } else {
            dpy.next_event()?
        };
        route(dpy, engine, event)?;
    }
    Ok(())
}

fn next_draining<D: DisplayConn>(
    dpy: &mut D,
    engine: &mut ServeEngine,
    drain_wait: Option<Duration>,
) -> Result<Option<DisplayEvent>> {
    let Some(wait) = drain_wait else {
        return dpy.next_event().map(Some);
    };
    match dpy.next_event_timeout(wait)? {
        Some(event) => Ok(Some(event)),
        None => {
            warn!(pending = engine.pending(), "peers stalled during drain, giving up");
            engine.abandon_pending(dpy);
            Ok(None)
        }
    }
}

fn route<D: DisplayConn>(dpy: &mut D, engine: &mut ServeEngine, event: DisplayEvent) -> Result<()> {
    match event {
        DisplayEvent::ContentRequest(req) => engine.handle_request(dpy, req),
        DisplayEvent::SlotCleared { window, slot } => engine.handle_slot_cleared(dpy, window, slot),
        DisplayEvent::OwnershipLost { selection } => {
            engine.note_ownership_lost(selection);
            Ok(())
        }
        DisplayEvent::ConversionResult { .. } | DisplayEvent::SlotNewValue { .. } => {
            trace!("ignoring stray event in serve phase");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::serve::ServeEngine;
    use crate::x11::atoms::{ProtocolAtoms, SelectionTokens};
    use crate::x11::display::ContentRequest;
    use crate::x11::mock::FakeDisplay;
    use bytes::Bytes;

    const WIN: u32 = 0x0100_0001;
    const PEER: u32 = 0x0200_0001;
    const SLOT: u32 = 55;

    fn engine(payload: &[u8]) -> ServeEngine {
        let tokens = SelectionTokens {
            selection: 1,
            target: 2,
            stage: 77,
        };
        let proto = ProtocolAtoms {
            incr: 90,
            targets: 91,
            multiple: 92,
            timestamp: 93,
            atom: 4,
            integer: 19,
        };
        ServeEngine::new(tokens, proto, Bytes::copy_from_slice(payload), 1234)
    }

    fn content_request() -> DisplayEvent {
        DisplayEvent::ContentRequest(ContentRequest {
            time: 5000,
            requestor: PEER,
            selection: 1,
            target: 2,
            slot: Some(SLOT),
        })
    }

    fn lost() -> DisplayEvent {
        DisplayEvent::OwnershipLost { selection: 1 }
    }

    #[test]
    fn test_exits_when_lost_with_nothing_in_flight() {
        let mut dpy = FakeDisplay::new(WIN, 1000);
        let mut engine = engine(b"hello");
        dpy.push_event(content_request());
        dpy.push_event(lost());

        run(&mut dpy, &mut engine, Some(Duration::from_millis(10))).unwrap();

        assert!(engine.done());
        assert_eq!(dpy.bytes_written_to(PEER, SLOT), b"hello");
    }

    #[test]
    fn test_in_flight_delivery_completes_before_exit() {
        let mut dpy = FakeDisplay::new(WIN, 1000);
        dpy.auto_consume = true;
        let payload = vec![b'x'; 5000];
        let mut engine = engine(&payload);
        // Ownership changes hands while the chunk cycle is still running;
        // the consume events only appear as the fake requestor makes them.
        dpy.push_event(content_request());
        dpy.push_event(lost());

        run(&mut dpy, &mut engine, Some(Duration::from_millis(10))).unwrap();

        assert!(engine.done());
        assert_eq!(engine.pending(), 0);
        assert_eq!(dpy.bytes_written_to(PEER, SLOT), payload);
    }

    #[test]
    fn test_stalled_drain_gives_up_cleanly() {
        let mut dpy = FakeDisplay::new(WIN, 1000);
        let mut engine = engine(&[b'x'; 5000]);
        // The requestor never consumes its INCR marker.
        dpy.push_event(content_request());
        dpy.push_event(lost());

        run(&mut dpy, &mut engine, Some(Duration::from_millis(1))).unwrap();

        assert_eq!(engine.pending(), 0);
        // Watch interest was dropped along with the stalled delivery.
        assert_eq!(dpy.watches, vec![(PEER, true), (PEER, false)]);
    }

    #[test]
    fn test_stray_events_do_not_disturb_serving() {
        let mut dpy = FakeDisplay::new(WIN, 1000);
        let mut engine = engine(b"hello");
        dpy.push_event(DisplayEvent::SlotNewValue {
            window: WIN,
            slot: 77,
        });
        dpy.push_event(DisplayEvent::SlotCleared {
            window: 0xdead,
            slot: 3,
        });
        dpy.push_event(content_request());
        dpy.push_event(lost());

        run(&mut dpy, &mut engine, Some(Duration::from_millis(10))).unwrap();

        assert_eq!(dpy.bytes_written_to(PEER, SLOT), b"hello");
    }
}
