//! Window Manager Module
//!
//! Session state and the event loop. One `WindowManager` owns the display,
//! the keyboard state and the binding table; every handler borrows it.

pub mod display;
pub mod error;
pub mod ewmh;
pub mod focus;
pub mod keyboard;
pub mod manage;
pub mod spawn;

use std::ops::ControlFlow;

use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::*;

use crate::config::Config;
use crate::wm::display::Display;
use crate::wm::error::{ErrorPolicy, WmError};
use crate::wm::keyboard::{Action, Bindings, KeyMap, ModifierMasks, resolve_numlock_mask};

/// Whether the event loop keeps running after an event
type Flow = ControlFlow<()>;

pub struct WindowManager<P: ErrorPolicy> {
    display: Display,
    keymap: KeyMap,
    masks: ModifierMasks,
    bindings: Bindings,
    policy: P,
}

impl<P: ErrorPolicy> WindowManager<P> {
    /// Open the display, grab the bindings and adopt existing windows
    pub fn new(config: &Config, policy: P) -> Result<Self, WmError> {
        let display = Display::open()?;
        spawn::ignore_child_signals()?;
        display.set_session_name(&config.session_name);

        let bindings = Bindings::new(config.bindings())?;
        if bindings.is_empty() {
            warn!("No key bindings configured");
        }

        let conn = display.conn();
        let root = display.root();

        let keymap = KeyMap::query(conn)?;
        let masks = ModifierMasks::new(resolve_numlock_mask(conn, &keymap)?);

        let grabs = bindings.install_grabs(conn, root, &masks, &keymap)?;
        info!(
            "Installed {} key grabs for {} bindings (numlock mask 0x{:x})",
            grabs,
            bindings.len(),
            masks.numlock
        );

        let adopted = manage::adopt_existing(conn, root, display.size())?;
        info!("Adopted {} existing windows", adopted);

        conn.flush()?;

        Ok(Self {
            display,
            keymap,
            masks,
            bindings,
            policy,
        })
    }

    /// Block on X events until the quit chord, then close the display
    pub fn run(mut self) -> Result<(), WmError> {
        info!("Entering event loop");

        loop {
            let event = self.display.conn().wait_for_event()?;

            match self.handle_event(event) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break,
                Err(WmError::Protocol(error)) => self.policy.on_protocol_error(&error),
                Err(e) => return Err(e),
            }

            self.display.conn().flush()?;
        }

        info!("Quit requested");
        self.display.close()
    }

    /// Route one event to its handler
    fn handle_event(&mut self, event: Event) -> Result<Flow, WmError> {
        let conn = self.display.conn();
        let root = self.display.root();

        match event {
            Event::MapRequest(e) => manage::on_map_request(conn, e.window, self.display.size())?,
            Event::ConfigureRequest(e) => manage::on_configure_request(conn, &e)?,
            Event::EnterNotify(e) => focus::on_pointer_enter(conn, root, e.event)?,
            Event::KeyPress(e) => return self.on_key_press(&e),
            Event::MappingNotify(e) => {
                if e.request != Mapping::POINTER {
                    self.reload_keyboard()?;
                }
            }
            Event::Error(e) => self.policy.on_protocol_error(&e),
            _ => {}
        }

        Ok(ControlFlow::Continue(()))
    }

    fn on_key_press(&mut self, event: &KeyPressEvent) -> Result<Flow, WmError> {
        let keysym = self.keymap.keysym(event.detail);
        let state = u16::from(event.state);

        let Some(action) = self.bindings.lookup(&self.masks, state, keysym).cloned() else {
            debug!("Unbound key: keycode={}, state=0x{:x}", event.detail, state);
            return Ok(ControlFlow::Continue(()));
        };

        debug!("Key chord fired: {:?}", action);
        self.perform(action, event)
    }

    fn perform(&mut self, action: Action, event: &KeyPressEvent) -> Result<Flow, WmError> {
        let root = self.display.root();

        match action {
            Action::Spawn(command) => self.launch(&command),
            Action::KillFocused => focus::kill_focused(self.display.conn(), root, event.child)?,
            Action::Refresh => self.refresh_layout()?,
            Action::Cycle(direction) => focus::cycle(self.display.conn(), root, direction)?,
            Action::Quit => return Ok(ControlFlow::Break(())),
        }

        Ok(ControlFlow::Continue(()))
    }

    fn launch(&self, command: &str) {
        info!("Launching: {}", command);
        if let Err(e) = spawn::spawn_detached(command, Some(self.display.raw_fd())) {
            warn!("Failed to launch {:?}: {}", command, e);
        }
    }

    /// Re-read the root size and stretch every window to it
    fn refresh_layout(&mut self) -> Result<(), WmError> {
        let size = self.display.record_geometry();
        let count = manage::refresh_layout(self.display.conn(), self.display.root(), size)?;
        info!("Layout refreshed: {} windows at {}x{}", count, size.width, size.height);
        Ok(())
    }

    /// The keyboard or modifier mapping changed: re-resolve and re-grab
    fn reload_keyboard(&mut self) -> Result<(), WmError> {
        let conn = self.display.conn();
        let root = self.display.root();

        self.keymap = KeyMap::query(conn)?;
        self.masks = ModifierMasks::new(resolve_numlock_mask(conn, &self.keymap)?);

        Bindings::remove_grabs(conn, root)?;
        let grabs = self.bindings.install_grabs(conn, root, &self.masks, &self.keymap)?;
        info!("Keyboard mapping changed, re-installed {} key grabs", grabs);
        Ok(())
    }
}
