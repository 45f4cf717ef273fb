//! Session Detach
//!
//! One explicit detach, invoked only after the payload has been echoed and
//! ownership is confirmed — an earlier exit would leave the selection with
//! no owner behind it.

use tracing::debug;

use crate::error::Result;

/// Fork into the background, chdir to `/` and silence stdio.
pub fn detach() -> Result<()> {
    nix::unistd::daemon(false, false).map_err(std::io::Error::from)?;
    debug!("detached from controlling session");
    Ok(())
}
