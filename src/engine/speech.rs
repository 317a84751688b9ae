//! Core speech engine trait, shared types and errors.
//!
//! [`SpeechEngine`] is object-safe and `Send + Sync` so the registry can hold
//! the active engine behind an `Arc<dyn SpeechEngine>` and hand clones to
//! speak tasks.
//!
//! [`MockEngine`] (available under `#[cfg(test)]`) records every call and can
//! be scripted to fail, block or lag, so the registry and dispatch loop can be
//! tested without audio hardware.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slowest accepted speaking rate multiplier.
pub const MIN_SPEED: f32 = 0.5;
/// Fastest accepted speaking rate multiplier.
pub const MAX_SPEED: f32 = 2.0;
/// Loudest accepted volume.
pub const MAX_VOLUME: u8 = 100;

// ---------------------------------------------------------------------------
// EngineKind
// ---------------------------------------------------------------------------

/// The two engine variants the registry can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Platform voice facility, synthesised in-process.
    Native,
    /// Piper neural voices, synthesised by an external helper process.
    Process,
}

impl EngineKind {
    /// Name shown to the user.
    pub fn display_name(&self) -> &'static str {
        match self {
            EngineKind::Native => "System TTS",
            EngineKind::Process => "Piper TTS",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "system" => Ok(EngineKind::Native),
            "process" | "piper" => Ok(EngineKind::Process),
            other => Err(format!("unknown engine '{other}' (expected native or process)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Availability / Probe
// ---------------------------------------------------------------------------

/// Last known readiness of the active engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Availability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

/// Result of an availability or installation probe.  Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub available: bool,
    pub message: String,
}

impl Probe {
    pub fn available(message: impl Into<String>) -> Self {
        Self {
            available: true,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            message: message.into(),
        }
    }

    pub fn availability(&self) -> Availability {
        if self.available {
            Availability::Available
        } else {
            Availability::Unavailable
        }
    }
}

// ---------------------------------------------------------------------------
// EngineSettings / EngineState
// ---------------------------------------------------------------------------

/// Speed, volume and voice as last applied.  Always within range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSettings {
    pub speed: f32,
    pub volume: u8,
    pub voice: String,
}

impl EngineSettings {
    pub fn new(speed: f32, volume: u8, voice: impl Into<String>) -> Self {
        Self {
            speed: clamp_speed(speed),
            volume: clamp_volume(volume),
            voice: voice.into(),
        }
    }

    /// One-line summary, e.g. `voice: Alex | speed: 1.0x | volume: 80%`.
    pub fn summary(&self) -> String {
        let voice = if self.voice.is_empty() {
            "(none)"
        } else {
            &self.voice
        };
        format!(
            "voice: {voice} | speed: {:.1}x | volume: {}%",
            self.speed, self.volume
        )
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::new(1.0, MAX_VOLUME, String::new())
    }
}

/// Snapshot of the single live engine and its settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineState {
    pub engine_kind: EngineKind,
    pub speed: f32,
    pub volume: u8,
    pub current_voice: String,
    pub availability: Availability,
}

/// Clamp a rate multiplier into `[MIN_SPEED, MAX_SPEED]`; NaN becomes 1.0.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

pub fn clamp_volume(volume: u8) -> u8 {
    volume.min(MAX_VOLUME)
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Everything that can go wrong inside an engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Nothing to say.
    #[error("text is empty")]
    EmptyText,

    /// The platform voice facility could not be constructed.
    #[error("speech engine not initialized: {0}")]
    NotInitialized(String),

    /// A prerequisite (interpreter, runtime) is missing.
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),

    /// Installing the runtime failed.
    #[error("installation failed: {0}")]
    Install(String),

    /// The synthesiser reported an error (usually its stderr).
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// The synthesiser exited cleanly without writing its output file.
    #[error("synthesis produced no audio file at {0}")]
    ArtifactMissing(String),

    /// The synthesiser ran longer than the configured limit.
    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),

    /// Audio playback failed.
    #[error("playback failed: {0}")]
    Playback(String),

    /// A newer request or an explicit stop cancelled this utterance.
    #[error("utterance superseded")]
    Superseded,

    /// The engine has been disposed.
    #[error("speech engine has been disposed")]
    Disposed,

    /// Downloading a voice model failed.
    #[error("voice download failed: {0}")]
    Download(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// SpeechEngine trait
// ---------------------------------------------------------------------------

/// Uniform capability interface over both engine variants.
///
/// # Contract
///
/// - Setters clamp silently and never fail.
/// - `speak` never panics.  A second `speak` on the same instance cancels the
///   first, which then returns [`EngineError::Superseded`].
/// - `stop` is safe to call while idle; `dispose` is idempotent.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn name(&self) -> &'static str {
        self.kind().display_name()
    }

    /// Probe readiness without side effects.
    async fn is_available(&self) -> Probe;

    /// Voices offered by the engine, or a built-in fallback list.
    async fn list_voices(&self) -> Vec<String>;

    fn set_voice(&self, voice: &str);

    fn set_speed(&self, speed: f32);

    fn set_volume(&self, volume: u8);

    fn settings(&self) -> EngineSettings;

    /// Speak `text` and wait until playback ends.
    async fn speak(&self, text: &str) -> Result<String, EngineError>;

    fn stop(&self);

    fn dispose(&self);

    /// Make sure the engine's runtime is installed, installing it if needed.
    async fn ensure_installed(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// BCP 47 language of `voice` (`en-US`), when the engine knows it.
    async fn voice_language(&self, _voice: &str) -> Option<String> {
        None
    }

    /// `None` when the engine has no notion of downloadable voices.
    async fn is_voice_downloaded(&self, _voice: &str) -> Option<bool> {
        None
    }

    async fn download_voice(&self, _voice: &str) -> Result<String, EngineError> {
        Ok(String::new())
    }
}

// Compile-time assertion: Box<dyn SpeechEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechEngine>) {}
};

// ---------------------------------------------------------------------------
// MockEngine (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockEngine;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_clamped() {
        assert_eq!(clamp_speed(0.1), MIN_SPEED);
        assert_eq!(clamp_speed(3.0), MAX_SPEED);
        assert_eq!(clamp_speed(1.25), 1.25);
        assert_eq!(clamp_speed(f32::NAN), 1.0);
    }

    #[test]
    fn volume_is_clamped() {
        assert_eq!(clamp_volume(0), 0);
        assert_eq!(clamp_volume(100), 100);
        assert_eq!(clamp_volume(255), 100);
    }

    #[test]
    fn settings_new_clamps() {
        let s = EngineSettings::new(5.0, 200, "v");
        assert_eq!(s.speed, MAX_SPEED);
        assert_eq!(s.volume, MAX_VOLUME);
        assert_eq!(s.voice, "v");
    }

    #[test]
    fn settings_summary_format() {
        let s = EngineSettings::new(1.5, 80, "Alex");
        assert_eq!(s.summary(), "voice: Alex | speed: 1.5x | volume: 80%");
        assert!(EngineSettings::default().summary().starts_with("voice: (none)"));
    }

    #[test]
    fn engine_kind_parses_aliases() {
        assert_eq!("native".parse::<EngineKind>(), Ok(EngineKind::Native));
        assert_eq!("System".parse::<EngineKind>(), Ok(EngineKind::Native));
        assert_eq!("piper".parse::<EngineKind>(), Ok(EngineKind::Process));
        assert_eq!(" PROCESS ".parse::<EngineKind>(), Ok(EngineKind::Process));
        assert!("espeak".parse::<EngineKind>().is_err());
    }

    #[test]
    fn engine_kind_display_names() {
        assert_eq!(EngineKind::Native.to_string(), "System TTS");
        assert_eq!(EngineKind::Process.to_string(), "Piper TTS");
    }

    #[test]
    fn probe_maps_to_availability() {
        assert_eq!(Probe::available("ok").availability(), Availability::Available);
        assert_eq!(
            Probe::unavailable("no").availability(),
            Availability::Unavailable
        );
    }

    #[test]
    fn error_messages_are_descriptive() {
        let e = EngineError::Synthesis("model not found".into());
        assert_eq!(e.to_string(), "synthesis failed: model not found");
        assert_eq!(
            EngineError::Timeout(Duration::from_secs(60)).to_string(),
            "synthesis timed out after 60s"
        );
        assert_eq!(
            EngineError::Timeout(Duration::from_millis(300)).to_string(),
            "synthesis timed out after 300ms"
        );
    }

    #[tokio::test]
    async fn mock_second_speak_supersedes_first() {
        use std::sync::Arc;
        use std::time::Duration;

        let engine = Arc::new(
            MockEngine::new(EngineKind::Native).with_speak_delay(Duration::from_millis(100)),
        );
        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.speak("a").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = engine.speak("b").await;

        assert!(second.is_ok());
        assert!(matches!(first.await.unwrap(), Err(EngineError::Superseded)));
    }
}
