//! Selection Error Types
//!
//! One error enum covers the whole crate; the binary wraps it in `anyhow`
//! for user-facing context. Everything here is fatal except
//! [`SelectionError::SlotWriteRejected`], which the serve loop recovers from
//! by degrading a single reply to a refusal.

use std::time::Duration;

use thiserror::Error;
use x11rb::protocol::xproto::Window;

/// Result type for selection operations
pub type Result<T> = std::result::Result<T, SelectionError>;

/// Boxed source for display-server request failures
pub type DisplaySource = Box<dyn std::error::Error + Send + Sync>;

/// Selection transfer error kinds
#[derive(Error, Debug)]
pub enum SelectionError {
    /// Could not open the display connection
    #[error("unable to connect to display server: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),

    /// A name could not be interned as an atom
    #[error("unable to resolve name {name:?}: {source}")]
    Resolve {
        /// The name that failed to intern
        name: String,
        /// Underlying display error
        #[source]
        source: DisplaySource,
    },

    /// The selection owner could not supply the requested target
    #[error("unable to convert selection: owner offered no data")]
    ConversionUnavailable,

    /// Captured payload was empty where content is required
    #[error("unable to use empty input")]
    EmptyInput,

    /// Another client owned the selection before our claim became visible
    #[error("unable to confirm selection ownership: lost the race")]
    OwnershipRaceLost,

    /// Compound MULTIPLE requests are not implemented
    #[error("MULTIPLE target requested: compound transfers are unsupported")]
    MultipleUnsupported,

    /// A peer failed to act before the configured deadline
    #[error("timed out after {0:?} waiting for the selection peer")]
    PeerTimeout(Duration),

    /// The server rejected a property write on the requestor's window
    #[error("property write rejected for window {window:#010x}")]
    SlotWriteRejected {
        /// Requestor window the write targeted
        window: Window,
    },

    /// Any other failed display request, tagged with the operation name
    #[error("display request failed during {op}: {source}")]
    Display {
        /// Protocol operation that failed
        op: &'static str,
        /// Underlying display error
        #[source]
        source: DisplaySource,
    },

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SelectionError {
    /// Tag a display-server failure with the operation that produced it.
    pub fn display<E>(op: &'static str) -> impl FnOnce(E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |source| Self::Display {
            op,
            source: Box::new(source),
        }
    }

    /// True for failures handled locally by refusing a single reply.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SlotWriteRejected { .. })
    }
}
