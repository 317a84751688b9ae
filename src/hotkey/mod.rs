//! Global copy-keystroke signal, backed by `rdev`.
//!
//! # Design
//!
//! `rdev::listen()` blocks forever, so it runs on a **dedicated OS thread**
//! owned by [`HotkeyListener`].  The hook never touches dispatch state: it
//! matches the configured combination with a [`ComboTracker`] and forwards a
//! [`HotkeyEvent::CopyPressed`] pulse with `try_send` while the
//! [`HotkeyGate`] is armed.  The dispatch loop arms the gate on `start` and
//! disarms it on `stop`.
//!
//! ```text
//! rdev thread ──KeyPress/KeyRelease──▶ ComboTracker ──match + armed──▶ mpsc
//!                                                                      │
//!                                                  DispatchLoop::run ◀─┘
//! ```

pub mod listener;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rdev::{EventType, Key};
use thiserror::Error;

use crate::config::HotkeyConfig;

pub use listener::HotkeyListener;

// ---------------------------------------------------------------------------
// HotkeyEvent / HotkeyError
// ---------------------------------------------------------------------------

/// Events emitted by the hotkey listener thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The copy combination (Ctrl+C by default) was observed.
    CopyPressed,
}

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("unknown hotkey key '{0}'")]
    UnknownKey(String),

    #[error("unknown hotkey modifier '{0}'")]
    UnknownModifier(String),

    #[error("could not start hotkey listener thread: {0}")]
    Spawn(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Key parsing
// ---------------------------------------------------------------------------

/// Parse a key name from the config into an [`rdev::Key`].
///
/// Letters, digits, F1–F12 and a handful of named keys are accepted,
/// case-insensitively.
///
/// ```
/// use auto_voice::hotkey::parse_key;
///
/// assert_eq!(parse_key("C"), Some(rdev::Key::KeyC));
/// assert_eq!(parse_key(" insert "), Some(rdev::Key::Insert));
/// assert_eq!(parse_key("Ctrl+C"), None);
/// ```
pub fn parse_key(name: &str) -> Option<Key> {
    const LETTERS: [Key; 26] = [
        Key::KeyA, Key::KeyB, Key::KeyC, Key::KeyD, Key::KeyE, Key::KeyF, Key::KeyG,
        Key::KeyH, Key::KeyI, Key::KeyJ, Key::KeyK, Key::KeyL, Key::KeyM, Key::KeyN,
        Key::KeyO, Key::KeyP, Key::KeyQ, Key::KeyR, Key::KeyS, Key::KeyT, Key::KeyU,
        Key::KeyV, Key::KeyW, Key::KeyX, Key::KeyY, Key::KeyZ,
    ];
    const DIGITS: [Key; 10] = [
        Key::Num0, Key::Num1, Key::Num2, Key::Num3, Key::Num4,
        Key::Num5, Key::Num6, Key::Num7, Key::Num8, Key::Num9,
    ];
    const FUNCTION: [Key; 12] = [
        Key::F1, Key::F2, Key::F3, Key::F4, Key::F5, Key::F6,
        Key::F7, Key::F8, Key::F9, Key::F10, Key::F11, Key::F12,
    ];

    let upper = name.trim().to_ascii_uppercase();
    let bytes = upper.as_bytes();
    if bytes.len() == 1 {
        return match bytes[0] {
            b @ b'A'..=b'Z' => Some(LETTERS[(b - b'A') as usize]),
            b @ b'0'..=b'9' => Some(DIGITS[(b - b'0') as usize]),
            _ => None,
        };
    }
    if let Some(n) = upper.strip_prefix('F').and_then(|n| n.parse::<usize>().ok()) {
        return (1..=12).contains(&n).then(|| FUNCTION[n - 1]);
    }

    match upper.as_str() {
        "INSERT" | "INS" => Some(Key::Insert),
        "SPACE" => Some(Key::Space),
        "ESCAPE" | "ESC" => Some(Key::Escape),
        "PAUSE" => Some(Key::Pause),
        "PRINTSCREEN" => Some(Key::PrintScreen),
        _ => None,
    }
}

/// Modifier half of the copy combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Meta,
}

impl Modifier {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" | "option" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "meta" | "cmd" | "command" | "super" | "win" => Some(Modifier::Meta),
            _ => None,
        }
    }

    /// Physical keys that count as this modifier.
    pub fn keys(&self) -> &'static [Key] {
        match self {
            Modifier::Ctrl => &[Key::ControlLeft, Key::ControlRight],
            Modifier::Alt => &[Key::Alt, Key::AltGr],
            Modifier::Shift => &[Key::ShiftLeft, Key::ShiftRight],
            Modifier::Meta => &[Key::MetaLeft, Key::MetaRight],
        }
    }

    fn matches(&self, key: Key) -> bool {
        self.keys().contains(&key)
    }
}

/// Modifier + key, resolved from [`HotkeyConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub modifier: Modifier,
    pub key: Key,
}

impl HotkeyBinding {
    pub fn from_config(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let modifier = Modifier::parse(&config.modifier)
            .ok_or_else(|| HotkeyError::UnknownModifier(config.modifier.clone()))?;
        let key = parse_key(&config.key).ok_or_else(|| HotkeyError::UnknownKey(config.key.clone()))?;
        Ok(Self { modifier, key })
    }
}

// ---------------------------------------------------------------------------
// ComboTracker
// ---------------------------------------------------------------------------

/// Tracks held modifier keys and reports each press of the bound key while
/// its modifier is down.
#[derive(Debug)]
pub struct ComboTracker {
    binding: HotkeyBinding,
    held: Vec<Key>,
}

impl ComboTracker {
    pub fn new(binding: HotkeyBinding) -> Self {
        Self {
            binding,
            held: Vec::new(),
        }
    }

    /// Feed one raw event; `true` when it completes the combination.
    pub fn handle(&mut self, event: &EventType) -> bool {
        match *event {
            EventType::KeyPress(key) if self.binding.modifier.matches(key) => {
                if !self.held.contains(&key) {
                    self.held.push(key);
                }
                false
            }
            EventType::KeyRelease(key) if self.binding.modifier.matches(key) => {
                self.held.retain(|k| *k != key);
                false
            }
            EventType::KeyPress(key) => key == self.binding.key && !self.held.is_empty(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyGate
// ---------------------------------------------------------------------------

/// Shared arm/disarm switch; pulses are dropped while disarmed.
#[derive(Debug, Clone, Default)]
pub struct HotkeyGate(Arc<AtomicBool>);

impl HotkeyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
