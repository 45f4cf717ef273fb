//! Atom Resolution
//!
//! Interns the names the exchange needs and hands the engines opaque tokens.
//! The fixed protocol set is interned in one round trip at connect time;
//! CLI-supplied selection and target names are resolved individually. Engine
//! code never sees a name, only atoms.

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt as _};

use crate::error::{Result, SelectionError};

x11rb::atom_manager! {
    /// Fixed atoms interned once at connect time.
    pub Atoms: AtomsCookie {
        INCR,
        TARGETS,
        MULTIPLE,
        TIMESTAMP,
        ATOM,
        INTEGER,
        SELCAST_STAGE,
    }
}

/// Protocol atoms the engines consult, detached from the connection.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolAtoms {
    /// Marker type announcing an incremental transfer
    pub incr: Atom,
    /// Pseudo-target naming the supported target list
    pub targets: Atom,
    /// Compound request pseudo-target (refused)
    pub multiple: Atom,
    /// Pseudo-target naming the ownership timestamp
    pub timestamp: Atom,
    /// Type of a TARGETS reply
    pub atom: Atom,
    /// Type of a TIMESTAMP reply
    pub integer: Atom,
}

impl From<&Atoms> for ProtocolAtoms {
    fn from(atoms: &Atoms) -> Self {
        Self {
            incr: atoms.INCR,
            targets: atoms.TARGETS,
            multiple: atoms.MULTIPLE,
            timestamp: atoms.TIMESTAMP,
            atom: atoms.ATOM,
            integer: atoms.INTEGER,
        }
    }
}

/// The resolved (selection, target, staging property) triple for one run.
#[derive(Debug, Clone, Copy)]
pub struct SelectionTokens {
    /// Selection this run operates on
    pub selection: Atom,
    /// Content target to request or serve
    pub target: Atom,
    /// Property on our window staging inbound conversions
    pub stage: Atom,
}

/// Intern one CLI-supplied name.
pub fn resolve(conn: &impl Connection, name: &str) -> Result<Atom> {
    let atom = conn
        .intern_atom(false, name.as_bytes())
        .map_err(|e| SelectionError::Resolve {
            name: name.to_owned(),
            source: Box::new(e),
        })?
        .reply()
        .map_err(|e| SelectionError::Resolve {
            name: name.to_owned(),
            source: Box::new(e),
        })?
        .atom;
    debug!(name, atom, "resolved name");
    Ok(atom)
}
