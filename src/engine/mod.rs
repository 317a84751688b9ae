//! Speech engines.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 SpeechEngine (trait)                     │
//! │                                                          │
//! │   ┌──────────────────┐        ┌───────────────────────┐  │
//! │   │  NativeEngine    │        │  ProcessEngine        │  │
//! │   │  tts::Tts        │        │  python -m piper      │  │
//! │   │  (in-process)    │        │  → tmp WAV → memory   │  │
//! │   └──────────────────┘        │  → AudioSink (rodio)  │  │
//! │                               └───────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Both variants are held as `Arc<dyn SpeechEngine>` by the registry.

pub mod native;
pub mod playback;
pub mod process;
pub mod speech;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use native::{native_rate, NativeEngine, TtsBackend, VoiceBackend};
pub use playback::{AudioSink, PlaybackError, RodioSink};
pub use process::{ProcessEngine, ProcessOptions};
pub use speech::{
    clamp_speed, clamp_volume, Availability, EngineError, EngineKind, EngineSettings,
    EngineState, Probe, SpeechEngine, MAX_SPEED, MAX_VOLUME, MIN_SPEED,
};

// test-only re-export so the registry and dispatch tests can import MockEngine
// without `use crate::engine::speech::MockEngine`.
#[cfg(test)]
pub use speech::MockEngine;
