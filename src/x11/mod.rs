//! Display-Server Seam
//!
//! Everything that actually speaks X11 lives here: atom interning and the
//! [`display::DisplayConn`] trait with its x11rb implementation. The
//! protocol engines in [`crate::selection`] depend on this module's
//! vocabulary (atoms, events, property values) and nothing else.

/// Atom interning and the resolved token bundles
pub mod atoms;

/// The connection trait and its x11rb implementation
pub mod display;

#[cfg(test)]
pub(crate) mod mock;

pub use atoms::{Atoms, ProtocolAtoms, SelectionTokens};
pub use display::{ContentRequest, DisplayConn, DisplayEvent, SlotValue, XDisplay};
