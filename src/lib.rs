//! Clipboard-to-speech coordinator.
//!
//! Watches the system clipboard for short English fragments and reads them
//! aloud through a swappable speech engine: the platform's own voice facility
//! or the Piper neural voice runtime driven as an external process.

pub mod clipboard;
pub mod config;
pub mod console;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod hotkey;
pub mod registry;
pub mod text;
