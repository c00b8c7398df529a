//! EWMH (Extended Window Manager Hints) naming
//!
//! Publishes the manager's name on the root window so tools like `wmctrl`
//! and `neofetch` can identify it.

use x11rb::connection::Connection;
use x11rb::errors::ConnectionError;
use x11rb::protocol::xproto::*;
use x11rb::wrapper::ConnectionExt as _;

use crate::wm::error::WmError;

/// Holds the interned atoms the manager writes
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    pub net_wm_name: Atom,
    pub utf8_string: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self, WmError> {
        let intern = |name: &str| -> Result<Atom, WmError> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            net_wm_name: intern("_NET_WM_NAME")?,
            utf8_string: intern("UTF8_STRING")?,
        })
    }

    /// Set the legacy WM_NAME and the UTF-8 _NET_WM_NAME on `window`
    pub fn set_wm_name<C: Connection>(
        &self,
        conn: &C,
        window: Window,
        name: &str,
    ) -> Result<(), ConnectionError> {
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            name.as_bytes(),
        )?;

        conn.change_property8(
            PropMode::REPLACE,
            window,
            self.net_wm_name,
            self.utf8_string,
            name.as_bytes(),
        )?;

        Ok(())
    }
}
