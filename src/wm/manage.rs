//! Window lifecycle: map and configure requests.
//!
//! Every managed window covers the whole screen without a border. There is no
//! client list; the X server's window tree is the only record of what exists.

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;

use crate::wm::display::ScreenSize;
use crate::wm::error::WmError;

/// Events selected on every managed window
fn client_event_mask() -> EventMask {
    EventMask::STRUCTURE_NOTIFY | EventMask::ENTER_WINDOW
}

/// Geometry every managed window is forced into
pub fn fullscreen(size: ScreenSize) -> ConfigureWindowAux {
    ConfigureWindowAux::new()
        .x(0)
        .y(0)
        .width(u32::from(size.width))
        .height(u32::from(size.height))
        .border_width(0)
}

/// Take over placement of `window` without mapping it
fn manage<C: Connection>(conn: &C, window: Window, size: ScreenSize) -> Result<(), WmError> {
    conn.change_window_attributes(
        window,
        &ChangeWindowAttributesAux::new().event_mask(client_event_mask()),
    )?;
    conn.configure_window(window, &fullscreen(size))?;
    Ok(())
}

/// A client asked to become visible: make it full-screen, then map it
pub fn on_map_request<C: Connection>(
    conn: &C,
    window: Window,
    size: ScreenSize,
) -> Result<(), WmError> {
    debug!("MapRequest for window 0x{:x}", window);
    manage(conn, window, size)?;
    conn.map_window(window)?;
    Ok(())
}

/// Forward a configure request, honoring only the fields the client set
pub fn on_configure_request<C: Connection>(
    conn: &C,
    event: &ConfigureRequestEvent,
) -> Result<(), WmError> {
    debug!(
        "ConfigureRequest for window 0x{:x} (mask 0x{:x})",
        event.window,
        u16::from(event.value_mask)
    );
    conn.configure_window(event.window, &passthrough(event))?;
    Ok(())
}

fn passthrough(event: &ConfigureRequestEvent) -> ConfigureWindowAux {
    ConfigureWindowAux::from_configure_request(event)
}

/// Resize every child of the root to `size`, returning how many were touched
pub fn refresh_layout<C: Connection>(
    conn: &C,
    root: Window,
    size: ScreenSize,
) -> Result<usize, WmError> {
    let tree = conn.query_tree(root)?.reply()?;
    let geometry = fullscreen(size);

    for &child in &tree.children {
        conn.configure_window(child, &geometry)?;
    }

    debug!(
        "Resized {} windows to {}x{}",
        tree.children.len(),
        size.width,
        size.height
    );
    Ok(tree.children.len())
}

/// Bring windows that existed before the manager started under its policy
pub fn adopt_existing<C: Connection>(
    conn: &C,
    root: Window,
    size: ScreenSize,
) -> Result<usize, WmError> {
    let tree = conn.query_tree(root)?.reply()?;

    for &child in &tree.children {
        manage(conn, child, size)?;
    }

    Ok(tree.children.len())
}
