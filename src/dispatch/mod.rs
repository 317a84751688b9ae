//! Dispatch coordinator: decides whether, what and when to speak.
//!
//! # Architecture
//!
//! ```text
//! interval tick ──┐
//! HotkeyEvent ────┤   (mpsc, from the rdev thread)
//! DispatchCommand ┼──▶ DispatchLoop::run()  ← one tokio task
//! worker reports ─┘          │
//!                            ├─ TextFilter + RepeatMemory
//!                            ├─ tokio::spawn(engine.speak)      → Report::Speak
//!                            └─ tokio::spawn(registry.switch_to) → Report::Switch
//!
//! SharedStatus (Arc<Mutex<DispatchStatus>>) ←── read by the console
//! ```

pub mod runner;
pub mod state;

pub use runner::{DispatchCommand, DispatchLoop, TickOutcome, TEST_UTTERANCE};
pub use state::{
    new_shared_status, DispatchStatus, ListenState, SharedStatus, StatusEntry, StatusLevel,
    StatusLog,
};
