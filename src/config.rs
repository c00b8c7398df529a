//! Configuration for chip-wm
//!
//! Optionally read from `~/.config/chip-wm/config.toml`. Every field has a
//! default, so a missing file or a partial one is fine. The chords themselves
//! are compiled in; the file only picks the modifier and the launched programs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use x11rb::protocol::xproto::ModMask;
use xkeysym::Keysym;

use crate::wm::keyboard::{Action, Direction, KeyBinding};

/// Modifier group used as the base of every chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModKey {
    Mod1,
    Mod2,
    Mod3,
    Mod4,
    Mod5,
}

impl ModKey {
    pub fn mask(self) -> u16 {
        let mask = match self {
            ModKey::Mod1 => ModMask::M1,
            ModKey::Mod2 => ModMask::M2,
            ModKey::Mod3 => ModMask::M3,
            ModKey::Mod4 => ModMask::M4,
            ModKey::Mod5 => ModMask::M5,
        };
        u16::from(mask)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name published on the root window (WM_NAME / _NET_WM_NAME)
    pub session_name: String,
    /// Base modifier of every chord ("mod4" is Super)
    pub modkey: ModKey,
    /// Command for modkey+Return
    pub terminal: String,
    /// Command for modkey+d
    pub launcher: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_name: "chip-wm".to_string(),
            modkey: ModKey::Mod4,
            terminal: "xterm".to_string(),
            launcher: "dmenu_run".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, or use defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        let Some(config_path) = Self::config_path() else {
            info!("No config directory available, using defaults");
            return Ok(Self::default());
        };

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the path to the config file
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chip-wm").join("config.toml"))
    }

    /// The key binding table
    pub fn bindings(&self) -> Vec<KeyBinding> {
        let m = self.modkey.mask();
        let shift = u16::from(ModMask::SHIFT);

        vec![
            KeyBinding::new(m, Keysym::Return, Action::Spawn(self.terminal.clone())),
            KeyBinding::new(m, Keysym::d, Action::Spawn(self.launcher.clone())),
            KeyBinding::new(m | shift, Keysym::q, Action::Quit),
            KeyBinding::new(m | shift, Keysym::r, Action::Refresh),
            KeyBinding::new(m | shift, Keysym::c, Action::KillFocused),
            KeyBinding::new(m, Keysym::j, Action::Cycle(Direction::Next)),
            KeyBinding::new(m, Keysym::k, Action::Cycle(Direction::Prev)),
            KeyBinding::new(m, Keysym::Right, Action::Cycle(Direction::Next)),
            KeyBinding::new(m, Keysym::Left, Action::Cycle(Direction::Prev)),
        ]
    }
}
