//! Selection Protocol Engine
//!
//! The turn-based exchange both sides of a selection transfer speak:
//!
//! - [`acquire`] asks the current owner for the content and reads it back,
//!   directly or as an incremental stream.
//! - [`serve`] owns a selection and answers requests for it, negotiating
//!   incremental delivery for payloads that exceed one protocol message.
//! - [`transfer`] tracks one delivery cursor per concurrent requestor.
//! - [`dispatch`] is the single-threaded pull loop routing events to the
//!   engines until ownership is lost and every delivery has drained.
//!
//! All engine code is written against [`crate::x11::DisplayConn`]; nothing
//! in this module touches the display server directly.

/// Inbound transfers
pub mod acquire;

/// Event routing loop
pub mod dispatch;

/// Outbound reply handling
pub mod serve;

/// Per-requestor delivery cursors
pub mod transfer;

pub use acquire::{acquire, Acquired};
pub use serve::ServeEngine;
pub use transfer::{OutboundTransfer, TransferKey, TransferQueue};
