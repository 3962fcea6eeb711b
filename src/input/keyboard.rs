//! Keyboard handling and XKB integration
//!
//! Both backends resolve keycodes through the same xkbcommon state. X11
//! compiles a keymap from the default RMLVO names and feeds it the core
//! modifier mask of each event; Wayland compiles the keymap the compositor
//! sends and feeds it `wl_keyboard.modifiers`.

use std::io;
use std::os::unix::io::OwnedFd;

use log::{debug, warn};
use memmap2::MmapOptions;
use xkbcommon::xkb;

use crate::event::{KeyEvent, Keysym, Modifiers, WindowId};

/// X11 core modifier bits
const X11_SHIFT: u16 = 1;
const X11_LOCK: u16 = 1 << 1;
const X11_MOD2: u16 = 1 << 4;

/// Keyboard state and XKB integration
pub struct KeyboardState {
    /// Keymap, kept alive for the state
    _keymap: xkb::Keymap,
    state: xkb::State,
    /// Currently pressed keys (XKB keycodes)
    pressed_keys: Vec<u32>,
    /// Repeat rate (characters per second) and delay (milliseconds)
    repeat_info: (i32, i32),
}

impl KeyboardState {
    /// Compile the system default keymap
    pub fn from_default_names() -> Option<Self> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            "",
            "",
            "",
            "",
            None,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )?;
        Some(Self::with_keymap(keymap))
    }

    /// Compile a keymap from its text form
    pub fn from_string(text: String) -> Option<Self> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_string(
            &context,
            text,
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )?;
        Some(Self::with_keymap(keymap))
    }

    /// Compile the keymap a compositor shared through `fd`
    pub fn from_fd(fd: OwnedFd, size: usize) -> io::Result<Option<Self>> {
        // SAFETY: the compositor never writes to a shared keymap after
        // sending it, and the mapping is private and read-only.
        let map = unsafe { MmapOptions::new().len(size).map_copy_read_only(&fd)? };
        let text = String::from_utf8_lossy(&map)
            .trim_end_matches('\0')
            .to_string();
        Ok(Self::from_string(text))
    }

    fn with_keymap(keymap: xkb::Keymap) -> Self {
        let state = xkb::State::new(&keymap);
        debug!("Compiled XKB keymap with {} layouts", keymap.num_layouts());
        Self {
            _keymap: keymap,
            state,
            pressed_keys: Vec::new(),
            repeat_info: (25, 600),
        }
    }

    /// Apply a serialized modifier state
    pub fn update_mask(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        self.state.update_mask(depressed, latched, locked, 0, 0, group);
    }

    /// Apply the modifier/group state carried by an X11 input event
    pub fn update_from_x11(&mut self, mask: u16) {
        let mods = u32::from(mask & 0xff);
        let locked_bits = u32::from(X11_LOCK | X11_MOD2);
        let group = u32::from((mask >> 13) & 0x3);
        self.update_mask(mods & !locked_bits, 0, mods & locked_bits, group);
    }

    /// Resolve a keycode against the current state
    pub fn keysym(&self, keycode: u32) -> Keysym {
        Keysym(self.state.key_get_one_sym(xkb::Keycode::new(keycode)).raw())
    }

    /// Text produced by pressing `keycode`, without control characters
    pub fn text(&self, keycode: u32) -> Option<String> {
        let text = self.state.key_get_utf8(xkb::Keycode::new(keycode));
        if text.is_empty() || text.chars().all(char::is_control) {
            None
        } else {
            Some(text)
        }
    }

    /// Effective modifiers
    pub fn modifiers(&self) -> Modifiers {
        let active =
            |name: &str| self.state.mod_name_is_active(name, xkb::STATE_MODS_EFFECTIVE);
        let mut modifiers = Modifiers::empty();
        modifiers.set(Modifiers::SHIFT, active(xkb::MOD_NAME_SHIFT));
        modifiers.set(Modifiers::CONTROL, active(xkb::MOD_NAME_CTRL));
        modifiers.set(Modifiers::ALT, active(xkb::MOD_NAME_ALT));
        modifiers.set(Modifiers::SUPER, active(xkb::MOD_NAME_LOGO));
        modifiers.set(Modifiers::CAPS_LOCK, active(xkb::MOD_NAME_CAPS));
        modifiers.set(Modifiers::NUM_LOCK, active(xkb::MOD_NAME_NUM));
        modifiers
    }

    /// Build the key event for `keycode` targeting `window`
    pub fn key_event(&self, window: WindowId, keycode: u32) -> KeyEvent {
        KeyEvent {
            window,
            keycode,
            keysym: self.keysym(keycode),
            modifiers: self.modifiers(),
        }
    }

    /// Handle a key press, returning false for an auto-repeat
    pub fn key_press(&mut self, keycode: u32) -> bool {
        if !self.pressed_keys.contains(&keycode) {
            self.pressed_keys.push(keycode);
            true
        } else {
            false
        }
    }

    /// Handle a key release
    pub fn key_release(&mut self, keycode: u32) -> bool {
        if let Some(idx) = self.pressed_keys.iter().position(|&k| k == keycode) {
            self.pressed_keys.remove(idx);
            true
        } else {
            warn!("Release of key {} that was never pressed", keycode);
            false
        }
    }

    /// Forget held keys when focus moves away
    pub fn clear_pressed(&mut self) {
        self.pressed_keys.clear();
    }

    pub fn pressed_keys(&self) -> &[u32] {
        &self.pressed_keys
    }

    pub fn set_repeat_info(&mut self, rate: i32, delay: i32) {
        self.repeat_info = (rate, delay);
    }

    pub fn repeat_info(&self) -> (i32, i32) {
        self.repeat_info
    }
}

/// Modifiers carried by an X11 core event mask, for events without a keymap
pub fn modifiers_from_x11_mask(mask: u16) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    modifiers.set(Modifiers::SHIFT, mask & X11_SHIFT != 0);
    modifiers.set(Modifiers::CAPS_LOCK, mask & X11_LOCK != 0);
    modifiers.set(Modifiers::CONTROL, mask & (1 << 2) != 0);
    modifiers.set(Modifiers::ALT, mask & (1 << 3) != 0);
    modifiers.set(Modifiers::NUM_LOCK, mask & X11_MOD2 != 0);
    modifiers.set(Modifiers::SUPER, mask & (1 << 6) != 0);
    modifiers
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::io::OwnedFd;

    use super::*;

    /// evdev KEY_A + 8
    const KEY_A: u32 = 38;
    /// evdev KEY_ENTER + 8
    const KEY_ENTER: u32 = 36;

    // Keymap compilation needs xkeyboard-config data; tests that need it
    // return early on hosts without it.
    fn keyboard() -> Option<KeyboardState> {
        KeyboardState::from_default_names()
    }

    #[test]
    fn test_x11_mask_modifiers() {
        let mods = modifiers_from_x11_mask(X11_SHIFT | (1 << 2));
        assert_eq!(mods, Modifiers::SHIFT | Modifiers::CONTROL);
        assert_eq!(modifiers_from_x11_mask(X11_MOD2), Modifiers::NUM_LOCK);
        assert!(modifiers_from_x11_mask(0).is_empty());
    }

    #[test]
    fn test_key_press_release() {
        let Some(mut keyboard) = keyboard() else { return };

        assert!(keyboard.key_press(KEY_A));
        assert!(keyboard.pressed_keys().contains(&KEY_A));
        // Auto-repeat
        assert!(!keyboard.key_press(KEY_A));

        assert!(keyboard.key_release(KEY_A));
        assert!(!keyboard.key_release(KEY_A));
    }

    #[test]
    fn test_keysym_and_text() {
        let Some(mut keyboard) = keyboard() else { return };

        assert_eq!(keyboard.keysym(KEY_ENTER).name(), "Return");
        assert_eq!(keyboard.text(KEY_ENTER), None);

        let lower = keyboard.text(KEY_A);
        keyboard.update_from_x11(X11_SHIFT);
        assert!(keyboard.modifiers().contains(Modifiers::SHIFT));
        let upper = keyboard.text(KEY_A);
        if let (Some(lower), Some(upper)) = (lower, upper) {
            assert_eq!(lower.to_uppercase(), upper);
        }
    }

    #[test]
    fn test_keymap_from_fd() {
        let Some(keyboard) = keyboard() else { return };
        let text = keyboard._keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.write_all(b"\0").unwrap();
        let size = text.len() + 1;

        let reloaded = KeyboardState::from_fd(OwnedFd::from(file), size).unwrap();
        let reloaded = reloaded.expect("keymap round-trips through an fd");
        assert_eq!(reloaded.keysym(KEY_ENTER), keyboard.keysym(KEY_ENTER));
    }

    #[test]
    fn test_repeat_info() {
        let Some(mut keyboard) = keyboard() else { return };
        keyboard.set_repeat_info(30, 500);
        assert_eq!(keyboard.repeat_info(), (30, 500));
    }
}
