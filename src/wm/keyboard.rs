//! Keyboard Module
//!
//! Key binding table, keysym/keycode translation, NumLock resolution and
//! passive key grabs on the root window.

use std::collections::HashSet;

use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use xkeysym::Keysym;

use crate::wm::error::WmError;

/// Shift, Lock, Control and Mod1..Mod5. Pointer button bits are not modifiers.
const MODIFIER_BITS: u16 = 0x00ff;

/// Direction of a stack rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Raise the lowest window to the top
    Next,
    /// Lower the highest window to the bottom
    Prev,
}

/// What a key chord does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a shell command, fully detached
    Spawn(String),
    /// Kill the client owning the focused window
    KillFocused,
    /// Re-read the screen size and resize every window to it
    Refresh,
    /// End the session
    Quit,
    /// Rotate the stacking order
    Cycle(Direction),
}

/// Key binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    /// Modifier mask, without Lock or NumLock
    pub modifiers: u16,
    pub keysym: Keysym,
    pub action: Action,
}

impl KeyBinding {
    pub fn new(modifiers: impl Into<u16>, keysym: Keysym, action: Action) -> Self {
        Self {
            modifiers: modifiers.into(),
            keysym,
            action,
        }
    }
}

/// Lock-style modifiers that must not affect chord matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierMasks {
    pub lock: u16,
    /// Zero when NumLock is not bound to any modifier
    pub numlock: u16,
}

impl ModifierMasks {
    pub fn new(numlock: u16) -> Self {
        Self {
            lock: u16::from(ModMask::LOCK),
            numlock,
        }
    }

    /// Extra modifiers each binding is grabbed with
    pub fn grab_variants(&self) -> [u16; 4] {
        [0, self.lock, self.numlock, self.lock | self.numlock]
    }

    /// Strip lock state (and pointer buttons) from an event's modifier state
    pub fn clean(&self, state: u16) -> u16 {
        state & !(self.numlock | self.lock) & MODIFIER_BITS
    }
}

/// Snapshot of the server's keycode to keysym table
#[derive(Debug, Clone)]
pub struct KeyMap {
    min_keycode: Keycode,
    keysyms_per_keycode: usize,
    keysyms: Vec<u32>,
}

impl KeyMap {
    pub fn new(min_keycode: Keycode, keysyms_per_keycode: u8, keysyms: Vec<u32>) -> Self {
        Self {
            min_keycode,
            keysyms_per_keycode: usize::from(keysyms_per_keycode),
            keysyms,
        }
    }

    /// Fetch the full keyboard mapping from the server
    pub fn query<C: Connection>(conn: &C) -> Result<Self, WmError> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;

        let reply = conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
            .reply()?;

        debug!(
            "Keyboard mapping: keycodes {}..={}, {} keysyms per keycode",
            min_keycode, max_keycode, reply.keysyms_per_keycode
        );

        Ok(Self::new(min_keycode, reply.keysyms_per_keycode, reply.keysyms))
    }

    /// Unshifted keysym of `keycode`
    pub fn keysym(&self, keycode: Keycode) -> Keysym {
        let Some(offset) = keycode.checked_sub(self.min_keycode) else {
            return Keysym::NoSymbol;
        };

        let raw = self
            .keysyms
            .get(usize::from(offset) * self.keysyms_per_keycode)
            .copied()
            .unwrap_or(0);

        Keysym::new(raw)
    }

    /// First keycode producing `keysym` in any column
    pub fn keycode(&self, keysym: Keysym) -> Option<Keycode> {
        if self.keysyms_per_keycode == 0 || keysym == Keysym::NoSymbol {
            return None;
        }

        self.keysyms
            .chunks(self.keysyms_per_keycode)
            .position(|syms| syms.contains(&keysym.raw()))
            .and_then(|index| u8::try_from(index).ok())
            .and_then(|index| self.min_keycode.checked_add(index))
    }
}

/// Ask the server which modifier NumLock sits on
pub fn resolve_numlock_mask<C: Connection>(conn: &C, keymap: &KeyMap) -> Result<u16, WmError> {
    let Some(numlock) = keymap.keycode(Keysym::Num_Lock) else {
        debug!("Num_Lock has no keycode");
        return Ok(0);
    };

    let reply = conn.get_modifier_mapping()?.reply()?;
    let mask = modifier_bit(&reply.keycodes, reply.keycodes_per_modifier(), numlock);

    debug!("NumLock keycode {} resolves to mask 0x{:x}", numlock, mask);
    Ok(mask)
}

/// Bit of the modifier row holding `keycode`, or 0.
///
/// `keycodes` is the raw modifier mapping: 8 rows of `per_modifier` entries,
/// Shift first.
pub fn modifier_bit(keycodes: &[Keycode], per_modifier: u8, keycode: Keycode) -> u16 {
    if per_modifier == 0 || keycode == 0 {
        return 0;
    }

    keycodes
        .chunks(usize::from(per_modifier))
        .take(8)
        .position(|row| row.contains(&keycode))
        .map_or(0, |row| 1 << row)
}

/// Immutable, validated list of key bindings
#[derive(Debug, Clone)]
pub struct Bindings {
    entries: Vec<KeyBinding>,
}

impl Bindings {
    /// Reject tables where two entries share the same chord
    pub fn new(entries: Vec<KeyBinding>) -> Result<Self, WmError> {
        let mut seen = HashSet::new();
        for binding in &entries {
            if !seen.insert((binding.modifiers, binding.keysym.raw())) {
                return Err(WmError::DuplicateBinding {
                    modifiers: binding.modifiers,
                    keysym: binding.keysym.raw(),
                });
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First action whose chord matches the pressed key
    pub fn lookup(&self, masks: &ModifierMasks, state: u16, keysym: Keysym) -> Option<&Action> {
        let modifiers = masks.clean(state);
        self.entries
            .iter()
            .find(|b| b.modifiers == modifiers && b.keysym == keysym)
            .map(|b| &b.action)
    }

    /// Every (modifiers, keycode) pair that has to be grabbed
    pub fn planned_grabs(&self, masks: &ModifierMasks, keymap: &KeyMap) -> Vec<(u16, Keycode)> {
        self.entries
            .iter()
            .filter_map(|b| keymap.keycode(b.keysym).map(|code| (b, code)))
            .flat_map(|(b, code)| {
                masks
                    .grab_variants()
                    .into_iter()
                    .map(move |extra| (b.modifiers | extra, code))
            })
            .collect()
    }

    /// Grab every binding on `root`, returning the number of grabs issued
    pub fn install_grabs<C: Connection>(
        &self,
        conn: &C,
        root: Window,
        masks: &ModifierMasks,
        keymap: &KeyMap,
    ) -> Result<usize, WmError> {
        for binding in self.entries.iter().filter(|b| keymap.keycode(b.keysym).is_none()) {
            warn!(
                "No keycode for keysym 0x{:x} ({:?}), not grabbing",
                binding.keysym.raw(),
                binding.action
            );
        }

        let grabs = self.planned_grabs(masks, keymap);
        for &(modifiers, keycode) in &grabs {
            conn.grab_key(
                true,
                root,
                ModMask::from(modifiers),
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?;
        }

        Ok(grabs.len())
    }

    /// Drop every key grab this client holds on `root`
    pub fn remove_grabs<C: Connection>(conn: &C, root: Window) -> Result<(), WmError> {
        conn.ungrab_key(Grab::ANY, root, ModMask::ANY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPER: u16 = 0x40;
    const SHIFT: u16 = 0x01;
    const MOD2: u16 = 0x10;

    /// Two keysyms per keycode, keycodes starting at 8:
    /// 8 = Return, 9 = q/Q, 10 = d/D, 11 = Num_Lock
    fn keymap() -> KeyMap {
        KeyMap::new(
            8,
            2,
            vec![
                Keysym::Return.raw(),
                0,
                Keysym::q.raw(),
                Keysym::Q.raw(),
                Keysym::d.raw(),
                Keysym::D.raw(),
                Keysym::Num_Lock.raw(),
                0,
            ],
        )
    }

    fn bindings() -> Bindings {
        Bindings::new(vec![
            KeyBinding::new(SUPER, Keysym::Return, Action::Spawn("xterm".into())),
            KeyBinding::new(SUPER | SHIFT, Keysym::q, Action::Quit),
            KeyBinding::new(SUPER, Keysym::d, Action::Spawn("dmenu_run".into())),
        ])
        .unwrap()
    }

    #[test]
    fn test_keysym_uses_first_column() {
        let map = keymap();
        assert_eq!(map.keysym(9), Keysym::q);
        assert_eq!(map.keysym(8), Keysym::Return);
    }

    #[test]
    fn test_keysym_out_of_range_is_no_symbol() {
        let map = keymap();
        assert_eq!(map.keysym(7), Keysym::NoSymbol);
        assert_eq!(map.keysym(200), Keysym::NoSymbol);
    }

    #[test]
    fn test_keycode_searches_all_columns() {
        let map = keymap();
        assert_eq!(map.keycode(Keysym::Q), Some(9));
        assert_eq!(map.keycode(Keysym::Num_Lock), Some(11));
        assert_eq!(map.keycode(Keysym::Escape), None);
    }

    #[test]
    fn test_modifier_bit_finds_numlock_row() {
        // 8 rows, 2 keycodes each; keycode 77 on Mod2 (row 4)
        let mut keycodes = vec![0u8; 16];
        keycodes[8] = 77;
        assert_eq!(modifier_bit(&keycodes, 2, 77), MOD2);
    }

    #[test]
    fn test_modifier_bit_unbound_is_zero() {
        let keycodes = vec![50, 62, 66, 0, 37, 105, 64, 108, 0, 0, 0, 0, 133, 134, 0, 0];
        assert_eq!(modifier_bit(&keycodes, 2, 77), 0);
        assert_eq!(modifier_bit(&[], 0, 77), 0);
    }

    #[test]
    fn test_duplicate_chords_rejected() {
        let result = Bindings::new(vec![
            KeyBinding::new(SUPER, Keysym::Return, Action::Refresh),
            KeyBinding::new(SUPER, Keysym::Return, Action::Quit),
        ]);
        assert!(matches!(
            result,
            Err(WmError::DuplicateBinding { modifiers: SUPER, .. })
        ));
    }

    #[test]
    fn test_four_grabs_per_binding() {
        let masks = ModifierMasks::new(MOD2);
        let table = bindings();
        let grabs = table.planned_grabs(&masks, &keymap());

        assert_eq!(grabs.len(), 4 * table.len());
        assert!(grabs.contains(&(SUPER, 8)));
        assert!(grabs.contains(&(SUPER | 0x02, 8)));
        assert!(grabs.contains(&(SUPER | MOD2, 8)));
        assert!(grabs.contains(&(SUPER | 0x02 | MOD2, 8)));
    }

    #[test]
    fn test_unresolvable_keysym_not_grabbed() {
        let masks = ModifierMasks::new(MOD2);
        let table = Bindings::new(vec![KeyBinding::new(SUPER, Keysym::Escape, Action::Quit)]).unwrap();
        assert!(table.planned_grabs(&masks, &keymap()).is_empty());
    }

    #[test]
    fn test_every_grab_variant_dispatches() {
        let masks = ModifierMasks::new(MOD2);
        let table = bindings();
        let map = keymap();

        for (modifiers, keycode) in table.planned_grabs(&masks, &map) {
            let keysym = map.keysym(keycode);
            let action = table.lookup(&masks, modifiers, keysym);
            assert!(action.is_some(), "no match for state 0x{:x}", modifiers);
        }
    }

    #[test]
    fn test_numlock_does_not_break_chord() {
        let masks = ModifierMasks::new(MOD2);
        let action = bindings().lookup(&masks, SUPER | MOD2, Keysym::d).cloned();
        assert_eq!(action, Some(Action::Spawn("dmenu_run".into())));
    }

    #[test]
    fn test_pointer_buttons_ignored() {
        let masks = ModifierMasks::new(MOD2);
        let button1 = 0x100;
        let action = bindings().lookup(&masks, SUPER | SHIFT | button1, Keysym::q).cloned();
        assert_eq!(action, Some(Action::Quit));
    }

    #[test]
    fn test_no_match_is_none() {
        let masks = ModifierMasks::new(MOD2);
        let table = bindings();
        assert!(table.lookup(&masks, SUPER, Keysym::q).is_none());
        assert!(table.lookup(&masks, 0, Keysym::Return).is_none());
    }

    #[test]
    fn test_first_match_wins_without_numlock() {
        let masks = ModifierMasks::new(0);
        let action = bindings().lookup(&masks, SUPER | 0x02, Keysym::Return).cloned();
        assert_eq!(action, Some(Action::Spawn("xterm".into())));
        assert_eq!(masks.grab_variants(), [0, 0x02, 0, 0x02]);
    }
}
