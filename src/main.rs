//! chip-wm
//!
//! A minimal, reparenting-free X11 window manager. Every window is full-screen
//! and borderless; key chords launch programs, rotate the stack, kill the
//! focused client, refresh the layout or quit.

mod config;
mod wm;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::wm::WindowManager;
use crate::wm::error::IgnoreErrors;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chip_wm=info,warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting chip-wm");

    let config = Config::load().context("Failed to load configuration")?;

    let wm = WindowManager::new(&config, IgnoreErrors)
        .context("Failed to initialize window manager")?;

    wm.run().context("Window manager stopped unexpectedly")?;

    info!("Session closed");
    Ok(())
}
