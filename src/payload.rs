//! Payload Capture
//!
//! The payload is captured exactly once per run and never copied again:
//! every concurrent delivery slices the same read-only [`Bytes`] buffer.

use std::io::Read;

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, SelectionError};

/// Read an entire non-interactive input as the payload.
///
/// An empty capture is refused up front — serving nothing helps nobody, and
/// failing here happens before any ownership claim.
pub fn from_reader(mut input: impl Read) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(256);
    input.read_to_end(&mut buf)?;
    if buf.is_empty() {
        return Err(SelectionError::EmptyInput);
    }
    debug!(len = buf.len(), "payload captured");
    Ok(Bytes::from(buf))
}
