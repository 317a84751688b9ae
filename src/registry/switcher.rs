//! [`EngineRegistry`]: owns the single active engine and swaps it safely.
//!
//! # Switch sequence
//!
//! ```text
//! switch_to(kind)
//!   ├─ already switching? ──▶ Ignored
//!   ├─ controls off, state = Switching
//!   ├─ old.stop(); old.dispose()              (before the new one exists)
//!   ├─ new = factory.create(kind)
//!   ├─ new.ensure_installed() ──Err──▶ slot empty, Failed, controls on
//!   ├─ voices = new.list_voices(); keep last voice or pick the first
//!   ├─ apply last-known speed / volume / voice
//!   └─ controls on, state = Ready
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use super::factory::{ControlSurface, EngineFactory};
use crate::engine::{
    clamp_speed, clamp_volume, Availability, EngineError, EngineKind, EngineSettings,
    EngineState, SpeechEngine,
};

// ---------------------------------------------------------------------------
// SwitchState
// ---------------------------------------------------------------------------

/// Lifecycle of the registry's slot.
///
/// ```text
/// Idle ──switch_to──▶ Switching ──ok──▶ Ready
///                               ──err─▶ Failed ──switch_to──▶ Switching
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchState {
    #[default]
    Idle,
    Switching,
    Ready,
    Failed,
}

impl SwitchState {
    pub fn is_busy(&self) -> bool {
        matches!(self, SwitchState::Switching)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SwitchState::Idle => "Idle",
            SwitchState::Switching => "Switching",
            SwitchState::Ready => "Ready",
            SwitchState::Failed => "Failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    /// The new engine is live.
    Switched {
        kind: EngineKind,
        voice: String,
        voices: usize,
        message: String,
    },
    /// Another switch was already running; nothing changed.
    Ignored,
}

#[derive(Debug, Clone, Error)]
pub enum SwitchError {
    #[error("could not prepare {kind}: {source}")]
    Prepare {
        kind: EngineKind,
        #[source]
        source: EngineError,
    },

    #[error("voice '{voice}' is not available: {source}")]
    Voice {
        voice: String,
        #[source]
        source: EngineError,
    },
}

// ---------------------------------------------------------------------------
// EngineRegistry
// ---------------------------------------------------------------------------

struct Slot {
    engine: Option<Arc<dyn SpeechEngine>>,
    kind: Option<EngineKind>,
    state: SwitchState,
    settings: EngineSettings,
    voices: Vec<String>,
    availability: Availability,
    last_error: Option<String>,
}

struct Inner {
    factory: Arc<dyn EngineFactory>,
    controls: Arc<dyn ControlSurface>,
    switching: AtomicBool,
    slot: Mutex<Slot>,
}

/// Cheap-to-clone handle; all clones share one slot.
#[derive(Clone)]
pub struct EngineRegistry {
    inner: Arc<Inner>,
}

/// Clears the switching flag however `switch_to` exits.
struct SwitchGuard<'a>(&'a AtomicBool);

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Keep `wanted` when offered, otherwise the first voice; with no voices at
/// all the previous name is kept.
fn choose_voice(voices: &[String], wanted: &str) -> String {
    if !wanted.is_empty() && voices.iter().any(|v| v == wanted) {
        return wanted.to_owned();
    }
    voices
        .first()
        .cloned()
        .unwrap_or_else(|| wanted.to_owned())
}

impl EngineRegistry {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        controls: Arc<dyn ControlSurface>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                controls,
                switching: AtomicBool::new(false),
                slot: Mutex::new(Slot {
                    engine: None,
                    kind: None,
                    state: SwitchState::Idle,
                    settings,
                    voices: Vec::new(),
                    availability: Availability::Unknown,
                    last_error: None,
                }),
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Switching
    // -----------------------------------------------------------------------

    /// Replace the active engine with a fresh `kind`.
    pub async fn switch_to(&self, kind: EngineKind) -> Result<SwitchOutcome, SwitchError> {
        if self
            .inner
            .switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::info!("registry: switch to {kind} ignored, another switch is in progress");
            return Ok(SwitchOutcome::Ignored);
        }
        let _guard = SwitchGuard(&self.inner.switching);

        self.inner.controls.set_controls_enabled(false);
        let result = self.perform_switch(kind).await;
        self.inner.controls.set_controls_enabled(true);

        match &result {
            Ok(_) => log::info!("registry: {kind} ready"),
            Err(e) => log::warn!("registry: switch failed: {e}"),
        }
        result
    }

    async fn perform_switch(&self, kind: EngineKind) -> Result<SwitchOutcome, SwitchError> {
        let previous = {
            let mut slot = self.slot();
            slot.state = SwitchState::Switching;
            slot.availability = Availability::Unknown;
            slot.kind = None;
            slot.voices.clear();
            slot.engine.take()
        };
        if let Some(old) = previous {
            log::debug!("registry: retiring {}", old.name());
            old.stop();
            old.dispose();
        }

        let engine = self.inner.factory.create(kind);
        if let Err(source) = engine.ensure_installed().await {
            engine.dispose();
            let mut slot = self.slot();
            slot.state = SwitchState::Failed;
            slot.availability = Availability::Unavailable;
            slot.last_error = Some(source.to_string());
            return Err(SwitchError::Prepare { kind, source });
        }

        let probe = engine.is_available().await;
        let voices = engine.list_voices().await;
        let wanted = self.slot().settings.voice.clone();
        let voice = choose_voice(&voices, &wanted);

        if engine.is_voice_downloaded(&voice).await == Some(false) {
            match engine.download_voice(&voice).await {
                Ok(msg) => log::info!("registry: {msg}"),
                Err(e) => log::warn!("registry: could not download {voice}: {e}"),
            }
        }

        if !voice.is_empty() {
            engine.set_voice(&voice);
        }

        // Speed and volume may have been changed while the engine was prepared.
        let mut slot = self.slot();
        engine.set_speed(slot.settings.speed);
        engine.set_volume(slot.settings.volume);
        slot.settings.voice = voice.clone();
        slot.voices = voices;
        slot.availability = probe.availability();
        slot.kind = Some(kind);
        slot.engine = Some(engine);
        slot.last_error = None;
        slot.state = SwitchState::Ready;

        Ok(SwitchOutcome::Switched {
            kind,
            voice,
            voices: slot.voices.len(),
            message: probe.message,
        })
    }

    /// Stop and release the active engine.
    pub fn shutdown(&self) {
        let previous = {
            let mut slot = self.slot();
            slot.state = SwitchState::Idle;
            slot.kind = None;
            slot.availability = Availability::Unknown;
            slot.engine.take()
        };
        if let Some(engine) = previous {
            engine.stop();
            engine.dispose();
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The live engine, or `None` before the first switch or after a failed one.
    pub fn current(&self) -> Option<Arc<dyn SpeechEngine>> {
        self.slot().engine.clone()
    }

    pub fn current_kind(&self) -> Option<EngineKind> {
        self.slot().kind
    }

    pub fn state(&self) -> SwitchState {
        self.slot().state
    }

    pub fn is_switching(&self) -> bool {
        self.inner.switching.load(Ordering::SeqCst)
    }

    pub fn voices(&self) -> Vec<String> {
        self.slot().voices.clone()
    }

    /// Last-known settings, re-applied on every switch.
    pub fn settings(&self) -> EngineSettings {
        self.slot().settings.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.slot().last_error.clone()
    }

    pub fn engine_state(&self) -> Option<EngineState> {
        let slot = self.slot();
        let kind = slot.kind?;
        slot.engine.as_ref()?;
        Some(EngineState {
            engine_kind: kind,
            speed: slot.settings.speed,
            volume: slot.settings.volume,
            current_voice: slot.settings.voice.clone(),
            availability: slot.availability,
        })
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn set_speed(&self, speed: f32) -> f32 {
        let speed = clamp_speed(speed);
        let engine = {
            let mut slot = self.slot();
            slot.settings.speed = speed;
            slot.engine.clone()
        };
        if let Some(engine) = engine {
            engine.set_speed(speed);
        }
        speed
    }

    pub fn set_volume(&self, volume: u8) -> u8 {
        let volume = clamp_volume(volume);
        let engine = {
            let mut slot = self.slot();
            slot.settings.volume = volume;
            slot.engine.clone()
        };
        if let Some(engine) = engine {
            engine.set_volume(volume);
        }
        volume
    }

    /// Select `voice`, downloading it first when the engine needs that.
    ///
    /// Refused while a switch runs: the switch picks the voice itself.
    pub async fn set_voice(&self, voice: &str) -> Result<String, SwitchError> {
        if self.is_switching() {
            return Err(SwitchError::Voice {
                voice: voice.to_owned(),
                source: EngineError::Unavailable("an engine switch is in progress".into()),
            });
        }
        let Some(engine) = self.current() else {
            self.slot().settings.voice = voice.to_owned();
            return Ok(format!("voice {voice} will be used once an engine is ready"));
        };

        let mut message = format!("voice set to {voice}");
        if engine.is_voice_downloaded(voice).await == Some(false) {
            message = engine
                .download_voice(voice)
                .await
                .map_err(|source| SwitchError::Voice {
                    voice: voice.to_owned(),
                    source,
                })?;
        }

        engine.set_voice(voice);
        let applied = engine.settings().voice;
        self.slot().settings.voice = applied.clone();
        if applied != voice {
            return Err(SwitchError::Voice {
                voice: voice.to_owned(),
                source: EngineError::Unavailable(format!("{} kept {applied}", engine.name())),
            });
        }
        Ok(message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use std::time::Duration;
    use tokio::sync::Notify;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Factory that logs creations and hands out scripted mocks.
    struct ScriptedFactory {
        log: Log,
        build: Box<dyn Fn(EngineKind, Log) -> MockEngine + Send + Sync>,
        created: Mutex<Vec<Arc<MockEngine>>>,
    }

    impl ScriptedFactory {
        fn new(
            log: Log,
            build: impl Fn(EngineKind, Log) -> MockEngine + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                log,
                build: Box::new(build),
                created: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> Arc<MockEngine> {
            Arc::clone(self.created.lock().unwrap().last().unwrap())
        }
    }

    impl EngineFactory for ScriptedFactory {
        fn create(&self, kind: EngineKind) -> Arc<dyn SpeechEngine> {
            let tag = match kind {
                EngineKind::Native => "native",
                EngineKind::Process => "process",
            };
            self.log.lock().unwrap().push(format!("create:{tag}"));
            let engine = Arc::new((self.build)(kind, Arc::clone(&self.log)));
            self.created.lock().unwrap().push(Arc::clone(&engine));
            engine
        }
    }

    #[derive(Default)]
    struct RecordingControls(Mutex<Vec<bool>>);

    impl ControlSurface for RecordingControls {
        fn set_controls_enabled(&self, enabled: bool) {
            self.0.lock().unwrap().push(enabled);
        }
    }

    fn registry_with(
        factory: Arc<ScriptedFactory>,
    ) -> (EngineRegistry, Arc<RecordingControls>) {
        let controls = Arc::new(RecordingControls::default());
        let registry = EngineRegistry::new(
            factory,
            Arc::clone(&controls) as Arc<dyn ControlSurface>,
            EngineSettings::new(1.0, 100, ""),
        );
        (registry, controls)
    }

    fn plain_factory() -> (Arc<ScriptedFactory>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let factory = ScriptedFactory::new(Arc::clone(&log), |kind, log| {
            MockEngine::new(kind).with_event_log(log)
        });
        (factory, log)
    }

    #[test]
    fn switch_state_labels() {
        assert_eq!(SwitchState::default(), SwitchState::Idle);
        assert!(SwitchState::Switching.is_busy());
        assert!(!SwitchState::Failed.is_busy());
        assert_eq!(SwitchState::Ready.label(), "Ready");
    }

    #[test]
    fn voice_choice_prefers_previous() {
        let voices = vec!["a".to_string(), "b".to_string()];
        assert_eq!(choose_voice(&voices, "b"), "b");
        assert_eq!(choose_voice(&voices, "z"), "a");
        assert_eq!(choose_voice(&voices, ""), "a");
        assert_eq!(choose_voice(&[], "z"), "z");
    }

    #[tokio::test]
    async fn fresh_registry_has_no_engine() {
        let (factory, _) = plain_factory();
        let (registry, _) = registry_with(factory);
        assert!(registry.current().is_none());
        assert!(registry.engine_state().is_none());
        assert_eq!(registry.state(), SwitchState::Idle);
    }

    #[tokio::test]
    async fn successful_switch_goes_ready_and_toggles_controls() {
        let (factory, _) = plain_factory();
        let (registry, controls) = registry_with(factory);

        let outcome = registry.switch_to(EngineKind::Native).await.expect("switch");
        assert!(matches!(
            outcome,
            SwitchOutcome::Switched { kind: EngineKind::Native, voices: 2, .. }
        ));
        assert_eq!(registry.state(), SwitchState::Ready);
        assert_eq!(registry.current().unwrap().kind(), EngineKind::Native);
        assert_eq!(*controls.0.lock().unwrap(), vec![false, true]);
        assert!(!registry.is_switching());

        let state = registry.engine_state().unwrap();
        assert_eq!(state.engine_kind, EngineKind::Native);
        assert_eq!(state.current_voice, "alpha");
        assert_eq!(state.availability, Availability::Available);
    }

    #[tokio::test]
    async fn old_engine_is_retired_before_new_one_is_built() {
        let (factory, log) = plain_factory();
        let (registry, _) = registry_with(Arc::clone(&factory));

        registry.switch_to(EngineKind::Native).await.unwrap();
        let old = factory.last();
        log.lock().unwrap().clear();

        registry.switch_to(EngineKind::Process).await.unwrap();
        let events = log.lock().unwrap().clone();
        assert_eq!(
            &events[..4],
            ["stop:native", "dispose:native", "create:process", "install:process"]
        );
        assert_eq!(old.dispose_count(), 1);
    }

    #[tokio::test]
    async fn failed_install_leaves_slot_empty_and_recoverable() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let factory = ScriptedFactory::new(Arc::clone(&log), |kind, log| {
            let engine = MockEngine::new(kind).with_event_log(log);
            match kind {
                EngineKind::Process => engine.failing_install("pip exploded"),
                EngineKind::Native => engine,
            }
        });
        let (registry, controls) = registry_with(factory);

        registry.switch_to(EngineKind::Native).await.unwrap();
        let err = registry.switch_to(EngineKind::Process).await.unwrap_err();
        assert!(err.to_string().contains("pip exploded"));
        assert!(registry.current().is_none());
        assert_eq!(registry.state(), SwitchState::Failed);
        assert!(registry.last_error().is_some());
        assert_eq!(controls.0.lock().unwrap().last(), Some(&true));

        registry.switch_to(EngineKind::Native).await.expect("recover");
        assert_eq!(registry.state(), SwitchState::Ready);
        assert!(registry.current().is_some());
    }

    #[tokio::test]
    async fn overlapping_switch_is_ignored() {
        let gate = Arc::new(Notify::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let factory = {
            let gate = Arc::clone(&gate);
            ScriptedFactory::new(Arc::clone(&log), move |kind, log| {
                MockEngine::new(kind)
                    .with_event_log(log)
                    .with_install_gate(Arc::clone(&gate))
            })
        };
        let (registry, _) = registry_with(factory);

        let first = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.switch_to(EngineKind::Process).await })
        };
        while !registry.is_switching() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let second = registry.switch_to(EngineKind::Native).await.unwrap();
        assert_eq!(second, SwitchOutcome::Ignored);
        assert_eq!(registry.state(), SwitchState::Switching);

        gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, SwitchOutcome::Switched { kind: EngineKind::Process, .. }));
        assert_eq!(
            log.lock().unwrap().iter().filter(|e| e.starts_with("create")).count(),
            1
        );
    }

    #[tokio::test]
    async fn settings_survive_a_switch() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let factory = ScriptedFactory::new(Arc::clone(&log), |kind, _| match kind {
            EngineKind::Native => MockEngine::new(kind).with_voices(&["alpha", "beta"]),
            EngineKind::Process => MockEngine::new(kind).with_voices(&["en_US-amy-medium"]),
        });
        let (registry, _) = registry_with(Arc::clone(&factory));

        registry.switch_to(EngineKind::Native).await.unwrap();
        registry.set_speed(1.5);
        registry.set_volume(40);
        registry.set_voice("beta").await.unwrap();
        assert_eq!(factory.last().settings().voice, "beta");

        registry.switch_to(EngineKind::Process).await.unwrap();
        let applied = factory.last().settings();
        assert_eq!(applied.speed, 1.5);
        assert_eq!(applied.volume, 40);
        assert_eq!(applied.voice, "en_US-amy-medium");

        registry.switch_to(EngineKind::Native).await.unwrap();
        assert_eq!(factory.last().settings().voice, "alpha");
    }

    #[tokio::test]
    async fn settings_changed_mid_switch_reach_the_new_engine() {
        let gate = Arc::new(Notify::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let factory = {
            let gate = Arc::clone(&gate);
            ScriptedFactory::new(Arc::clone(&log), move |kind, _| {
                MockEngine::new(kind)
                    .with_voices(&["en_US-lessac-medium"])
                    .with_missing_voice("en_US-lessac-medium")
                    .with_download_gate(Arc::clone(&gate))
            })
        };
        let (registry, _) = registry_with(Arc::clone(&factory));

        let switch = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.switch_to(EngineKind::Process).await })
        };
        let downloading = || {
            let created = factory.created.lock().unwrap();
            created.last().is_some_and(|e| !e.downloads().is_empty())
        };
        while !downloading() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        registry.set_speed(1.5);
        registry.set_volume(40);
        assert!(registry.set_voice("en_US-amy-medium").await.is_err());

        gate.notify_one();
        switch.await.unwrap().expect("switch");
        let applied = factory.last().settings();
        assert_eq!(applied.speed, 1.5);
        assert_eq!(applied.volume, 40);
        assert_eq!(applied.voice, "en_US-lessac-medium");
        assert_eq!(registry.settings(), applied);
    }

    #[tokio::test]
    async fn setters_clamp_without_engine() {
        let (factory, _) = plain_factory();
        let (registry, _) = registry_with(factory);
        assert_eq!(registry.set_speed(0.1), 0.5);
        assert_eq!(registry.set_volume(200), 100);
        assert!(registry.set_voice("later").await.is_ok());
        assert_eq!(registry.settings().voice, "later");
    }

    #[tokio::test]
    async fn missing_voice_is_downloaded_before_selection() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let factory = ScriptedFactory::new(Arc::clone(&log), |kind, _| {
            MockEngine::new(kind)
                .with_voices(&["en_US-lessac-medium", "en_US-amy-medium"])
                .with_missing_voice("en_US-amy-medium")
        });
        let (registry, _) = registry_with(Arc::clone(&factory));
        registry.switch_to(EngineKind::Process).await.unwrap();

        registry.set_voice("en_US-amy-medium").await.expect("voice");
        let engine = factory.last();
        assert_eq!(engine.downloads(), vec!["en_US-amy-medium"]);
        assert_eq!(engine.settings().voice, "en_US-amy-medium");
    }

    #[tokio::test]
    async fn shutdown_releases_engine() {
        let (factory, _) = plain_factory();
        let (registry, _) = registry_with(Arc::clone(&factory));
        registry.switch_to(EngineKind::Native).await.unwrap();
        let engine = factory.last();

        registry.shutdown();
        assert!(registry.current().is_none());
        assert_eq!(engine.stop_count(), 1);
        assert_eq!(engine.dispose_count(), 1);
    }
}
