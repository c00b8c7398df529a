//! Display Module
//!
//! Owns the X11 connection, the root window and the cached screen size.
//! There is exactly one `Display` per session; everything else borrows it.

use std::os::fd::{AsRawFd, RawFd};

use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::ErrorKind;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::wm::error::WmError;
use crate::wm::ewmh::Atoms;

/// Width and height of the root window, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u16,
    pub height: u16,
}

/// The window manager's session with the X server
pub struct Display {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
    size: ScreenSize,
    atoms: Atoms,
}

impl Display {
    /// Connect to `$DISPLAY` and take over substructure redirection on the root.
    pub fn open() -> Result<Self, WmError> {
        let (conn, screen_num) = RustConnection::connect(None)?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let size = ScreenSize {
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
        };

        info!("Connected to X server, screen {}, root window 0x{:x}", screen_num, root);

        become_wm(&conn, root)?;
        info!("Registered as window manager");

        let atoms = Atoms::new(&conn)?;

        let mut display = Self {
            conn,
            screen_num,
            root,
            size,
            atoms,
        };
        display.record_geometry();

        Ok(display)
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn root(&self) -> Window {
        self.root
    }

    pub fn size(&self) -> ScreenSize {
        self.size
    }

    /// Descriptor of the X socket, closed by launched programs
    pub fn raw_fd(&self) -> RawFd {
        self.conn.stream().as_raw_fd()
    }

    /// Re-read the root geometry into the cache.
    ///
    /// Falls back to the screen's advertised size if the query fails.
    pub fn record_geometry(&mut self) -> ScreenSize {
        let queried = self
            .conn
            .get_geometry(self.root)
            .map_err(WmError::from)
            .and_then(|cookie| cookie.reply().map_err(WmError::from));

        self.size = match queried {
            Ok(geom) => ScreenSize {
                width: geom.width,
                height: geom.height,
            },
            Err(e) => {
                warn!("Failed to query root geometry, using screen defaults: {}", e);
                let screen = &self.conn.setup().roots[self.screen_num];
                ScreenSize {
                    width: screen.width_in_pixels,
                    height: screen.height_in_pixels,
                }
            }
        };

        debug!("Screen size: {}x{}", self.size.width, self.size.height);
        self.size
    }

    /// Publish `name` as WM_NAME and _NET_WM_NAME on the root window
    pub fn set_session_name(&self, name: &str) {
        match self.atoms.set_wm_name(&self.conn, self.root, name) {
            Ok(()) => debug!("Session name set to {:?}", name),
            Err(e) => warn!("Failed to set session name: {}", e),
        }
    }

    /// Destroy the root window and drop the connection
    pub fn close(self) -> Result<(), WmError> {
        info!("Closing display");
        self.conn.destroy_window(self.root)?;
        self.conn.flush()?;
        Ok(())
    }
}

/// Select substructure redirection on the root; only one client may hold it.
fn become_wm(conn: &RustConnection, root: Window) -> Result<(), WmError> {
    let mask = EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY;

    let result = conn
        .change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(mask))?
        .check();

    match result {
        Ok(()) => Ok(()),
        Err(ReplyError::X11Error(e)) if e.error_kind == ErrorKind::Access => Err(WmError::AnotherWm),
        Err(e) => Err(e.into()),
    }
}
