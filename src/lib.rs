//! # selcast
//!
//! One side of the X11 selection exchange: fetch the current contents of a
//! selection from its owner, or claim a selection and serve its contents to
//! any number of requestors, negotiating incremental (INCR) delivery when
//! the payload exceeds one protocol message.
//!
//! # Architecture
//!
//! ```text
//! selcast
//!   ├─> cli        (flags → selection/target names)
//!   ├─> payload    (one-shot capture, shared read-only bytes)
//!   ├─> x11        (atom resolution + DisplayConn seam over x11rb)
//!   └─> selection  (the protocol engine)
//!         ├─> acquire    (ConvertSelection → direct or INCR read)
//!         ├─> serve      (reply table + incremental negotiation)
//!         ├─> transfer   (per-requestor delivery cursors)
//!         └─> dispatch   (single-threaded event pull loop)
//! ```
//!
//! # Data Flow
//!
//! **Fetch path:** owner → staging property → stdout
//!
//! **Serve path:** stdin (or fetch) → payload → per-requestor property
//! writes, one independent cursor per concurrent requestor
//!
//! The engines consume atoms and [`x11::DisplayEvent`]s only; every X11
//! detail stays behind [`x11::DisplayConn`], which is what lets the whole
//! exchange run against a scripted fake in the test suite.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Command-line argument parsing
pub mod cli;

/// Session detach after hand-off
pub mod daemon;

/// Error types
pub mod error;

/// Payload capture
pub mod payload;

/// Protocol engine: acquire, serve, transfer tracking, dispatch
pub mod selection;

/// Display-server seam: atoms and the connection trait
pub mod x11;

pub use error::{Result, SelectionError};
