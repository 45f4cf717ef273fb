//! Display Server Seam
//!
//! [`DisplayConn`] is the narrow surface the protocol engines drive;
//! [`XDisplay`] implements it over an x11rb [`RustConnection`]. Engines
//! consume atoms and [`DisplayEvent`]s only, so the whole turn-based
//! exchange can also be driven by the scripted fake in the test suite.
//!
//! Every reply write is flushed before control returns to the event loop:
//! requestors block on the write-then-notify ordering the server enforces,
//! and a batched notify would deadlock the peer.

use std::time::{Duration, Instant};

use tracing::{debug, trace};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::cookie::VoidCookie;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, CreateWindowAux, EventMask,
    PropMode, Property, SelectionNotifyEvent, Timestamp, Window, WindowClass,
    SELECTION_NOTIFY_EVENT,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{COPY_DEPTH_FROM_PARENT, CURRENT_TIME, NONE};

use crate::error::{Result, SelectionError};
use crate::x11::atoms::{self, Atoms};

/// Poll interval for deadline-bounded event waits
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// One value read from a window property.
#[derive(Debug, Clone)]
pub struct SlotValue {
    /// Type atom the writer stamped on the property
    pub ty: Atom,
    /// Property data
    pub data: Vec<u8>,
}

/// An incoming request for selection content.
#[derive(Debug, Clone, Copy)]
pub struct ContentRequest {
    /// Timestamp the requestor attached
    pub time: Timestamp,
    /// Window asking for the data
    pub requestor: Window,
    /// Selection being read
    pub selection: Atom,
    /// Requested representation
    pub target: Atom,
    /// Reply property, or None from obsolete requestors
    pub slot: Option<Atom>,
}

/// Protocol events the dispatcher routes.
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    /// A conversion we requested finished
    ConversionResult {
        /// Server timestamp of the conversion
        time: Timestamp,
        /// Property holding the result, None when the owner refused
        slot: Option<Atom>,
    },
    /// A peer wants selection content
    ContentRequest(ContentRequest),
    /// A property received a new value
    SlotNewValue {
        /// Window carrying the property
        window: Window,
        /// The property that changed
        slot: Atom,
    },
    /// A property was deleted, signalling the reader consumed it
    SlotCleared {
        /// Window carrying the property
        window: Window,
        /// The property that was deleted
        slot: Atom,
    },
    /// Another client claimed the selection
    OwnershipLost {
        /// The selection that changed hands
        selection: Atom,
    },
}

/// Narrow display-server surface consumed by the protocol engines.
pub trait DisplayConn {
    /// Our staging window.
    fn window(&self) -> Window;

    /// Largest payload a single property write may carry.
    fn max_chunk(&self) -> usize;

    /// Ask the current owner to convert `selection` into `slot` on our window.
    fn request_conversion(&mut self, selection: Atom, target: Atom, slot: Atom) -> Result<()>;

    /// Read a property value.
    fn read_slot(&mut self, window: Window, slot: Atom) -> Result<SlotValue>;

    /// Delete a property.
    fn clear_slot(&mut self, window: Window, slot: Atom) -> Result<()>;

    /// Checked format-8 property write, flushed. A server-side rejection
    /// surfaces as [`SelectionError::SlotWriteRejected`].
    fn write_slot8(&mut self, window: Window, slot: Atom, ty: Atom, data: &[u8]) -> Result<()>;

    /// Checked format-32 property write, flushed.
    fn write_slot32(&mut self, window: Window, slot: Atom, ty: Atom, data: &[u32]) -> Result<()>;

    /// Subscribe or unsubscribe to property events on a requestor window.
    fn watch_slots(&mut self, window: Window, enabled: bool) -> Result<()>;

    /// Claim ownership of `selection`, serialized at `time`.
    fn claim_selection(&mut self, selection: Atom, time: Timestamp) -> Result<()>;

    /// Current owner window of `selection` (0 when unowned).
    fn selection_owner(&mut self, selection: Atom) -> Result<Window>;

    /// Send the reply notification for `req`; `None` signals refusal.
    fn send_done(&mut self, req: &ContentRequest, slot: Option<Atom>) -> Result<()>;

    /// Obtain a fresh server timestamp.
    fn server_time(&mut self) -> Result<Timestamp>;

    /// Block until the next protocol event.
    fn next_event(&mut self) -> Result<DisplayEvent>;

    /// Wait up to `wait` for the next protocol event.
    fn next_event_timeout(&mut self, wait: Duration) -> Result<Option<DisplayEvent>>;
}

/// x11rb-backed display connection with its staging window and atom set.
pub struct XDisplay {
    conn: RustConnection,
    window: Window,
    atoms: Atoms,
    max_chunk: usize,
}

impl XDisplay {
    /// Connect, create the staging window and intern the fixed atom set.
    pub fn open(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let root_visual = screen.root_visual;

        let window = conn
            .generate_id()
            .map_err(SelectionError::display("window id allocation"))?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            root_visual,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )
        .map_err(SelectionError::display("window creation"))?
        .check()
        .map_err(SelectionError::display("window creation"))?;

        let atoms = Atoms::new(&conn)
            .map_err(SelectionError::display("atom interning"))?
            .reply()
            .map_err(SelectionError::display("atom interning"))?;

        // 7/8 of the transport cap leaves room for the request header.
        let max_chunk = conn.maximum_request_bytes() / 8 * 7;

        debug!(window, max_chunk, "display connection ready");
        Ok(Self {
            conn,
            window,
            atoms,
            max_chunk,
        })
    }

    /// Fixed atoms interned at connect time.
    pub fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    /// Resolve one CLI-supplied name to an atom.
    pub fn resolve(&self, name: &str) -> Result<Atom> {
        atoms::resolve(&self.conn, name)
    }

    /// Destroy the staging window and drop the connection.
    pub fn close(self) {
        let _ = self.conn.destroy_window(self.window);
        let _ = self.conn.flush();
    }

    fn flush(&self, op: &'static str) -> Result<()> {
        self.conn.flush().map_err(SelectionError::display(op))
    }

    /// Map a raw event onto the protocol vocabulary; None for noise.
    fn map_event(&self, event: Event) -> Option<DisplayEvent> {
        match event {
            Event::SelectionNotify(ev) if ev.requestor == self.window => {
                Some(DisplayEvent::ConversionResult {
                    time: ev.time,
                    slot: (ev.property != NONE).then_some(ev.property),
                })
            }
            Event::SelectionRequest(ev) => Some(DisplayEvent::ContentRequest(ContentRequest {
                time: ev.time,
                requestor: ev.requestor,
                selection: ev.selection,
                target: ev.target,
                slot: (ev.property != NONE).then_some(ev.property),
            })),
            Event::PropertyNotify(ev) => {
                if ev.state == Property::NEW_VALUE {
                    Some(DisplayEvent::SlotNewValue {
                        window: ev.window,
                        slot: ev.atom,
                    })
                } else if ev.state == Property::DELETE {
                    Some(DisplayEvent::SlotCleared {
                        window: ev.window,
                        slot: ev.atom,
                    })
                } else {
                    None
                }
            }
            Event::SelectionClear(ev) => Some(DisplayEvent::OwnershipLost {
                selection: ev.selection,
            }),
            other => {
                trace!(?other, "ignoring unrelated event");
                None
            }
        }
    }

    /// Resolve a checked void request, separating per-window rejections
    /// (recoverable) from connection failures (fatal).
    fn checked_write(
        &self,
        op: &'static str,
        window: Window,
        sent: std::result::Result<VoidCookie<'_, RustConnection>, ConnectionError>,
    ) -> Result<()> {
        let cookie = sent.map_err(SelectionError::display(op))?;
        match cookie.check() {
            Ok(()) => Ok(()),
            Err(ReplyError::X11Error(err)) => {
                debug!(window, ?err, "server rejected request");
                Err(SelectionError::SlotWriteRejected { window })
            }
            Err(err) => Err(SelectionError::display(op)(err)),
        }
    }
}

impl DisplayConn for XDisplay {
    fn window(&self) -> Window {
        self.window
    }

    fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    fn request_conversion(&mut self, selection: Atom, target: Atom, slot: Atom) -> Result<()> {
        self.conn
            .convert_selection(self.window, selection, target, slot, CURRENT_TIME)
            .map_err(SelectionError::display("conversion request"))?;
        self.flush("conversion request")
    }

    fn read_slot(&mut self, window: Window, slot: Atom) -> Result<SlotValue> {
        let reply = self
            .conn
            .get_property(false, window, slot, AtomEnum::ANY, 0, u32::MAX)
            .map_err(SelectionError::display("property read"))?
            .reply()
            .map_err(SelectionError::display("property read"))?;
        Ok(SlotValue {
            ty: reply.type_,
            data: reply.value,
        })
    }

    fn clear_slot(&mut self, window: Window, slot: Atom) -> Result<()> {
        self.conn
            .delete_property(window, slot)
            .map_err(SelectionError::display("property clear"))?;
        self.flush("property clear")
    }

    fn write_slot8(&mut self, window: Window, slot: Atom, ty: Atom, data: &[u8]) -> Result<()> {
        let sent = self
            .conn
            .change_property8(PropMode::REPLACE, window, slot, ty, data);
        self.checked_write("property write", window, sent)?;
        self.flush("property write")
    }

    fn write_slot32(&mut self, window: Window, slot: Atom, ty: Atom, data: &[u32]) -> Result<()> {
        let sent = self
            .conn
            .change_property32(PropMode::REPLACE, window, slot, ty, data);
        self.checked_write("property write", window, sent)?;
        self.flush("property write")
    }

    fn watch_slots(&mut self, window: Window, enabled: bool) -> Result<()> {
        let mask = if enabled {
            EventMask::PROPERTY_CHANGE
        } else {
            EventMask::NO_EVENT
        };
        let sent = self
            .conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(mask));
        self.checked_write("requestor watch", window, sent)?;
        self.flush("requestor watch")
    }

    fn claim_selection(&mut self, selection: Atom, time: Timestamp) -> Result<()> {
        self.conn
            .set_selection_owner(self.window, selection, time)
            .map_err(SelectionError::display("selection ownership claim"))?
            .check()
            .map_err(SelectionError::display("selection ownership claim"))
    }

    fn selection_owner(&mut self, selection: Atom) -> Result<Window> {
        let reply = self
            .conn
            .get_selection_owner(selection)
            .map_err(SelectionError::display("selection owner query"))?
            .reply()
            .map_err(SelectionError::display("selection owner query"))?;
        Ok(reply.owner)
    }

    fn send_done(&mut self, req: &ContentRequest, slot: Option<Atom>) -> Result<()> {
        let event = SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time: req.time,
            requestor: req.requestor,
            selection: req.selection,
            target: req.target,
            property: slot.unwrap_or(NONE),
        };
        self.conn
            .send_event(false, req.requestor, EventMask::NO_EVENT, event)
            .map_err(SelectionError::display("reply notification"))?;
        self.flush("reply notification")
    }

    fn server_time(&mut self) -> Result<Timestamp> {
        // A zero-length append leaves the property untouched but makes the
        // server stamp a PropertyNotify with a fresh timestamp.
        self.conn
            .change_property8(
                PropMode::APPEND,
                self.window,
                self.atoms.SELCAST_STAGE,
                AtomEnum::STRING,
                &[],
            )
            .map_err(SelectionError::display("timestamp probe"))?;
        self.flush("timestamp probe")?;
        loop {
            let event = self
                .conn
                .wait_for_event()
                .map_err(SelectionError::display("timestamp probe"))?;
            if let Event::PropertyNotify(ev) = event {
                if ev.window == self.window && ev.atom == self.atoms.SELCAST_STAGE {
                    return Ok(ev.time);
                }
            }
        }
    }

    fn next_event(&mut self) -> Result<DisplayEvent> {
        loop {
            self.flush("event wait")?;
            let event = self
                .conn
                .wait_for_event()
                .map_err(SelectionError::display("event wait"))?;
            if let Some(mapped) = self.map_event(event) {
                return Ok(mapped);
            }
        }
    }

    fn next_event_timeout(&mut self, wait: Duration) -> Result<Option<DisplayEvent>> {
        let deadline = Instant::now() + wait;
        loop {
            self.flush("event wait")?;
            while let Some(event) = self
                .conn
                .poll_for_event()
                .map_err(SelectionError::display("event wait"))?
            {
                if let Some(mapped) = self.map_event(event) {
                    return Ok(Some(mapped));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
