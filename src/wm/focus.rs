//! Focus and stacking
//!
//! Focus follows the pointer. Keyboard cycling rotates the stacking order of
//! the root's children; no "current window" is remembered between calls.

use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::{CURRENT_TIME, NONE};

use crate::wm::error::WmError;
use crate::wm::keyboard::Direction;

/// `PointerRoot` as reported in a GetInputFocus reply
const POINTER_ROOT: Window = 1;

/// Pointer entered `window`: focus and raise it
pub fn on_pointer_enter<C: Connection>(
    conn: &C,
    root: Window,
    window: Window,
) -> Result<(), WmError> {
    if window == root || window == NONE {
        return Ok(());
    }

    debug!("Focusing window 0x{:x}", window);
    conn.set_input_focus(InputFocus::POINTER_ROOT, window, CURRENT_TIME)?;
    conn.configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
    Ok(())
}

fn circulation(direction: Direction) -> Circulate {
    match direction {
        Direction::Next => Circulate::RAISE_LOWEST,
        Direction::Prev => Circulate::LOWER_HIGHEST,
    }
}

/// Rotate the root's children one step
pub fn cycle<C: Connection>(conn: &C, root: Window, direction: Direction) -> Result<(), WmError> {
    debug!("Cycling stack ({:?})", direction);
    conn.circulate_window(circulation(direction), root)?;
    Ok(())
}

/// Window a kill request may target, if any
fn kill_target(root: Window, candidate: Window) -> Option<Window> {
    match candidate {
        NONE | POINTER_ROOT => None,
        w if w == root => None,
        w => Some(w),
    }
}

/// Kill the client owning the key event's child window, or the focused one.
///
/// This is `KillClient`, not a WM_DELETE_WINDOW request.
pub fn kill_focused<C: Connection>(conn: &C, root: Window, child: Window) -> Result<(), WmError> {
    let candidate = if child != NONE {
        child
    } else {
        conn.get_input_focus()?.reply()?.focus
    };

    match kill_target(root, candidate) {
        Some(window) => {
            info!("Killing client of window 0x{:x}", window);
            conn.kill_client(window)?;
        }
        None => debug!("No window to kill (candidate 0x{:x})", candidate),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: Window = 0x2a0;

    #[test]
    fn test_kill_never_targets_root() {
        assert_eq!(kill_target(ROOT, ROOT), None);
    }

    #[test]
    fn test_kill_ignores_empty_focus() {
        assert_eq!(kill_target(ROOT, NONE), None);
        assert_eq!(kill_target(ROOT, POINTER_ROOT), None);
    }

    #[test]
    fn test_kill_targets_client() {
        assert_eq!(kill_target(ROOT, 0x600003), Some(0x600003));
    }

    #[test]
    fn test_cycle_directions() {
        assert_eq!(circulation(Direction::Next), Circulate::RAISE_LOWEST);
        assert_eq!(circulation(Direction::Prev), Circulate::LOWER_HIGHEST);
    }
}
