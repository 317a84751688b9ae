//! In-process engine backed by the platform voice facility (`tts` crate).
//!
//! The platform handle sits behind the [`VoiceBackend`] trait so the engine's
//! cancellation and polling logic can be exercised without a speech server.
//! The lock around the backend is only held for single calls, never while
//! waiting for an utterance to finish, so [`NativeEngine::stop`] can always
//! reach the platform queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tts::Tts;

use super::speech::{
    clamp_speed, clamp_volume, EngineError, EngineKind, EngineSettings, Probe, SpeechEngine,
};

/// Interval between "still speaking?" checks.
const DEFAULT_POLL: Duration = Duration::from_millis(50);

/// Platform rate scale bounds (`0` is normal speed).
pub const NATIVE_RATE_MIN: i32 = -10;
pub const NATIVE_RATE_MAX: i32 = 10;

/// Map a speed multiplier onto the platform's integer rate scale.
///
/// `1.0` maps to `0`; each `0.1` step moves one notch.
pub fn native_rate(speed: f32) -> i32 {
    let rate = ((clamp_speed(speed) - 1.0) * 10.0).round() as i32;
    rate.clamp(NATIVE_RATE_MIN, NATIVE_RATE_MAX)
}

// ---------------------------------------------------------------------------
// VoiceBackend
// ---------------------------------------------------------------------------

/// Minimal synchronous surface of a platform voice facility.
pub trait VoiceBackend: Send {
    fn voices(&self) -> Result<Vec<String>, String>;
    fn voice_language(&self, _name: &str) -> Option<String> {
        None
    }
    fn select_voice(&mut self, name: &str) -> Result<(), String>;
    /// `rate` is on the `-10..=10` scale.
    fn set_rate(&mut self, rate: i32) -> Result<(), String>;
    /// `volume` is `0..=100`.
    fn set_volume(&mut self, volume: u8) -> Result<(), String>;
    /// Queue `text`, interrupting anything already speaking.
    fn start(&mut self, text: &str) -> Result<(), String>;
    fn is_speaking(&self) -> Result<bool, String>;
    fn cancel(&mut self) -> Result<(), String>;
}

/// [`VoiceBackend`] over `tts::Tts`.
pub struct TtsBackend {
    tts: Tts,
}

impl TtsBackend {
    pub fn new() -> Result<Self, String> {
        let tts = Tts::default().map_err(|e| e.to_string())?;
        let features = tts.supported_features();
        log::debug!(
            "native: backend ready (rate={}, volume={}, voice={}, is_speaking={})",
            features.rate,
            features.volume,
            features.voice,
            features.is_speaking
        );
        Ok(Self { tts })
    }
}

impl VoiceBackend for TtsBackend {
    fn voices(&self) -> Result<Vec<String>, String> {
        if !self.tts.supported_features().voice {
            return Ok(Vec::new());
        }
        let voices = self.tts.voices().map_err(|e| e.to_string())?;
        Ok(voices.iter().map(|v| v.name()).collect())
    }

    fn voice_language(&self, name: &str) -> Option<String> {
        let voices = self.tts.voices().ok()?;
        voices
            .iter()
            .find(|v| v.name() == name)
            .map(|v| v.language().to_string())
    }

    fn select_voice(&mut self, name: &str) -> Result<(), String> {
        let voices = self.tts.voices().map_err(|e| e.to_string())?;
        let voice = voices
            .iter()
            .find(|v| v.name() == name)
            .ok_or_else(|| format!("voice '{name}' is not installed"))?;
        self.tts.set_voice(voice).map_err(|e| e.to_string())
    }

    fn set_rate(&mut self, rate: i32) -> Result<(), String> {
        if !self.tts.supported_features().rate {
            log::warn!("native: rate control not supported on this platform");
            return Ok(());
        }
        let normal = self.tts.normal_rate();
        let step = rate.clamp(NATIVE_RATE_MIN, NATIVE_RATE_MAX) as f32 / NATIVE_RATE_MAX as f32;
        let value = if step >= 0.0 {
            normal + (self.tts.max_rate() - normal) * step
        } else {
            normal + (normal - self.tts.min_rate()) * step
        };
        self.tts.set_rate(value).map(|_| ()).map_err(|e| e.to_string())
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), String> {
        if !self.tts.supported_features().volume {
            log::warn!("native: volume control not supported on this platform");
            return Ok(());
        }
        let (min, max) = (self.tts.min_volume(), self.tts.max_volume());
        let value = min + (max - min) * (clamp_volume(volume) as f32 / 100.0);
        self.tts.set_volume(value).map(|_| ()).map_err(|e| e.to_string())
    }

    fn start(&mut self, text: &str) -> Result<(), String> {
        self.tts.speak(text, true).map(|_| ()).map_err(|e| e.to_string())
    }

    fn is_speaking(&self) -> Result<bool, String> {
        if !self.tts.supported_features().is_speaking {
            return Ok(false);
        }
        self.tts.is_speaking().map_err(|e| e.to_string())
    }

    fn cancel(&mut self) -> Result<(), String> {
        if !self.tts.supported_features().stop {
            return Ok(());
        }
        self.tts.stop().map(|_| ()).map_err(|e| e.to_string())
    }
}

// ---------------------------------------------------------------------------
// NativeEngine
// ---------------------------------------------------------------------------

type SharedBackend = Arc<Mutex<Option<Box<dyn VoiceBackend>>>>;

pub struct NativeEngine {
    backend: SharedBackend,
    init_error: Option<String>,
    settings: Mutex<EngineSettings>,
    generation: Arc<AtomicU64>,
    disposed: AtomicBool,
    poll: Duration,
}

impl NativeEngine {
    /// Open the platform voice facility.
    ///
    /// Construction never fails: if the facility is missing the engine
    /// reports itself unavailable and every `speak` returns
    /// [`EngineError::NotInitialized`].
    pub fn new() -> Self {
        match TtsBackend::new() {
            Ok(backend) => Self::with_backend(Box::new(backend)),
            Err(e) => {
                log::warn!("native: platform voice facility unavailable: {e}");
                Self::uninitialized(e)
            }
        }
    }

    /// Wrap an explicit backend and select its first voice.
    pub fn with_backend(mut backend: Box<dyn VoiceBackend>) -> Self {
        let mut settings = EngineSettings::default();
        match backend.voices() {
            Ok(voices) => {
                if let Some(first) = voices.first() {
                    match backend.select_voice(first) {
                        Ok(()) => settings.voice = first.clone(),
                        Err(e) => log::warn!("native: could not select '{first}': {e}"),
                    }
                }
            }
            Err(e) => log::warn!("native: could not enumerate voices: {e}"),
        }

        Self {
            backend: Arc::new(Mutex::new(Some(backend))),
            init_error: None,
            settings: Mutex::new(settings),
            generation: Arc::new(AtomicU64::new(0)),
            disposed: AtomicBool::new(false),
            poll: DEFAULT_POLL,
        }
    }

    pub fn uninitialized(reason: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(None)),
            init_error: Some(reason.into()),
            settings: Mutex::new(EngineSettings::default()),
            generation: Arc::new(AtomicU64::new(0)),
            disposed: AtomicBool::new(false),
            poll: DEFAULT_POLL,
        }
    }

    /// Override how often completion is polled.
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    fn settings_lock(&self) -> MutexGuard<'_, EngineSettings> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the backend if one is present.
    fn with_backend_mut<T>(&self, f: impl FnOnce(&mut dyn VoiceBackend) -> T) -> Option<T> {
        let mut guard = lock_backend(&self.backend).ok()?;
        guard.as_mut().map(|b| f(b.as_mut()))
    }

    fn not_initialized(&self) -> EngineError {
        EngineError::NotInitialized(
            self.init_error
                .clone()
                .unwrap_or_else(|| "no voice backend".into()),
        )
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_backend(
    backend: &SharedBackend,
) -> Result<MutexGuard<'_, Option<Box<dyn VoiceBackend>>>, EngineError> {
    backend
        .lock()
        .map_err(|_| EngineError::Internal("voice backend lock poisoned".into()))
}

/// Start `text` and block until it finishes or `generation` moves on.
fn speak_blocking(
    backend: &SharedBackend,
    generation: &AtomicU64,
    mine: u64,
    text: &str,
    poll: Duration,
) -> Result<(), EngineError> {
    {
        let mut guard = lock_backend(backend)?;
        let b = guard.as_mut().ok_or(EngineError::Disposed)?;
        if generation.load(Ordering::SeqCst) != mine {
            return Err(EngineError::Superseded);
        }
        b.start(text).map_err(EngineError::Synthesis)?;
    }

    loop {
        std::thread::sleep(poll);
        if generation.load(Ordering::SeqCst) != mine {
            return Err(EngineError::Superseded);
        }
        let speaking = {
            let guard = lock_backend(backend)?;
            match guard.as_ref() {
                Some(b) => b.is_speaking(),
                None => return Err(EngineError::Disposed),
            }
        };
        match speaking {
            Ok(true) => continue,
            Ok(false) => return Ok(()),
            Err(e) => {
                log::warn!("native: could not query speaking state: {e}");
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl SpeechEngine for NativeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Native
    }

    async fn is_available(&self) -> Probe {
        if self.disposed.load(Ordering::SeqCst) {
            return Probe::unavailable("System TTS has been disposed");
        }
        match self.with_backend_mut(|b| b.voices()) {
            None => Probe::unavailable("System TTS not initialized"),
            Some(Err(e)) => Probe::unavailable(format!("System TTS error: {e}")),
            Some(Ok(voices)) if voices.is_empty() => {
                Probe::unavailable("System TTS has no voices installed")
            }
            Some(Ok(voices)) => {
                Probe::available(format!("System TTS ready, {} voice(s)", voices.len()))
            }
        }
    }

    async fn voice_language(&self, voice: &str) -> Option<String> {
        self.with_backend_mut(|b| b.voice_language(voice)).flatten()
    }

    async fn list_voices(&self) -> Vec<String> {
        match self.with_backend_mut(|b| b.voices()) {
            Some(Ok(voices)) if !voices.is_empty() => voices,
            other => {
                if let Some(Err(e)) = other {
                    log::warn!("native: voice enumeration failed: {e}");
                }
                let current = self.settings_lock().voice.clone();
                if current.is_empty() {
                    Vec::new()
                } else {
                    vec![current]
                }
            }
        }
    }

    fn set_voice(&self, voice: &str) {
        match self.with_backend_mut(|b| b.select_voice(voice)) {
            Some(Ok(())) => self.settings_lock().voice = voice.to_owned(),
            Some(Err(e)) => log::warn!("native: keeping current voice: {e}"),
            None => log::debug!("native: set_voice ignored, not initialized"),
        }
    }

    fn set_speed(&self, speed: f32) {
        let speed = clamp_speed(speed);
        self.settings_lock().speed = speed;
        if let Some(Err(e)) = self.with_backend_mut(|b| b.set_rate(native_rate(speed))) {
            log::warn!("native: failed to set rate: {e}");
        }
    }

    fn set_volume(&self, volume: u8) {
        let volume = clamp_volume(volume);
        self.settings_lock().volume = volume;
        if let Some(Err(e)) = self.with_backend_mut(|b| b.set_volume(volume)) {
            log::warn!("native: failed to set volume: {e}");
        }
    }

    fn settings(&self) -> EngineSettings {
        self.settings_lock().clone()
    }

    async fn speak(&self, text: &str) -> Result<String, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyText);
        }
        if self.disposed.load(Ordering::SeqCst) {
            return Err(EngineError::Disposed);
        }
        if self.init_error.is_some() {
            return Err(self.not_initialized());
        }

        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(Err(e)) = self.with_backend_mut(|b| b.cancel()) {
            log::debug!("native: cancel before speak failed: {e}");
        }

        let backend = Arc::clone(&self.backend);
        let generation = Arc::clone(&self.generation);
        let owned = text.to_owned();
        let poll = self.poll;

        tokio::task::spawn_blocking(move || {
            speak_blocking(&backend, &generation, mine, &owned, poll)
        })
        .await
        .map_err(|e| EngineError::Internal(e.to_string()))??;

        Ok(format!("spoke {} character(s) with System TTS", text.len()))
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(Err(e)) = self.with_backend_mut(|b| b.cancel()) {
            log::warn!("native: stop failed: {e}");
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop();
        if let Ok(mut guard) = lock_backend(&self.backend) {
            guard.take();
        }
        log::debug!("native: disposed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
