//! [`ProcessEngine`]: one helper process per utterance, audio handed back
//! through a temporary WAV file that is read into memory and deleted before
//! playback starts.
//!
//! Every `speak` and `stop` bumps a generation counter published on a
//! `tokio::sync::watch` channel.  An utterance whose generation is no longer
//! current abandons its helper (killed on drop), deletes its artifact and
//! returns [`EngineError::Superseded`].

use std::path::PathBuf;
use std::process::Output;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::{watch, OnceCell};

use super::runtime::{
    detect_interpreter, fallback_voices, voice_downloaded, voice_language, HelperRuntime,
};
use super::synthesis::{AudioArtifact, SynthesisInvocation};
use crate::config::ProcessConfig;
use crate::engine::playback::AudioSink;
use crate::engine::speech::{
    clamp_speed, clamp_volume, EngineError, EngineKind, EngineSettings, Probe, SpeechEngine,
};

/// Resolved settings for [`ProcessEngine`].
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub interpreter: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub package: String,
    pub default_voice: String,
    pub use_npu: bool,
    pub timeout: Option<Duration>,
    /// Where synthesis output files are written.
    pub artifact_dir: PathBuf,
}

impl ProcessOptions {
    pub fn from_config(cfg: &ProcessConfig) -> Self {
        Self {
            interpreter: cfg.interpreter.clone(),
            data_dir: cfg.resolved_data_dir(),
            package: cfg.package.clone(),
            default_voice: cfg.default_voice.clone(),
            use_npu: cfg.use_npu,
            timeout: (cfg.synthesis_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.synthesis_timeout_secs)),
            artifact_dir: std::env::temp_dir(),
        }
    }
}

pub struct ProcessEngine {
    options: ProcessOptions,
    runtime: OnceCell<HelperRuntime>,
    settings: Mutex<EngineSettings>,
    generation: watch::Sender<u64>,
    sink: Arc<dyn AudioSink>,
    disposed: AtomicBool,
}

impl ProcessEngine {
    pub fn new(options: ProcessOptions, sink: Arc<dyn AudioSink>) -> Self {
        let settings = EngineSettings::new(1.0, 100, options.default_voice.clone());
        let (generation, _) = watch::channel(0);
        Self {
            options,
            runtime: OnceCell::new(),
            settings: Mutex::new(settings),
            generation,
            sink,
            disposed: AtomicBool::new(false),
        }
    }

    /// Interpreter discovery runs once, on first use.
    async fn runtime(&self) -> Result<&HelperRuntime, EngineError> {
        self.runtime
            .get_or_try_init(|| async {
                let interpreter = detect_interpreter(self.options.interpreter.as_deref()).await?;
                Ok(HelperRuntime::new(
                    interpreter,
                    self.options.data_dir.clone(),
                    self.options.package.clone(),
                ))
            })
            .await
    }

    fn settings_lock(&self) -> MutexGuard<'_, EngineSettings> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump_generation(&self) -> u64 {
        self.generation.send_modify(|g| *g += 1);
        *self.generation.borrow()
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.generation.borrow() == generation
    }

    fn invocation(&self, text: &str, artifact: &AudioArtifact) -> SynthesisInvocation {
        let settings = self.settings();
        let model = if settings.voice.is_empty() {
            self.options.default_voice.clone()
        } else {
            settings.voice
        };
        SynthesisInvocation {
            model,
            data_dir: self.options.data_dir.clone(),
            volume: settings.volume,
            speed: settings.speed,
            use_npu: self.options.use_npu,
            output: artifact.path().to_path_buf(),
            text: text.to_owned(),
        }
    }
}

/// Resolves once `generation` has moved past `mine`.
async fn superseded(rx: &mut watch::Receiver<u64>, mine: u64) {
    loop {
        if *rx.borrow_and_update() != mine {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_helper(child: Child, limit: Option<Duration>) -> Result<Output, EngineError> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(EngineError::Timeout(limit)),
        },
        None => Ok(child.wait_with_output().await?),
    }
}

#[async_trait]
impl SpeechEngine for ProcessEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Process
    }

    async fn is_available(&self) -> Probe {
        if self.disposed.load(Ordering::SeqCst) {
            return Probe::unavailable("Piper TTS has been disposed");
        }
        match self.runtime().await {
            Ok(runtime) => runtime.check_installed().await,
            Err(e) => Probe::unavailable(e.to_string()),
        }
    }

    async fn list_voices(&self) -> Vec<String> {
        match self.runtime().await {
            Ok(runtime) => runtime.list_voices().await,
            Err(e) => {
                log::warn!("process: {e}; using fallback voice list");
                fallback_voices()
            }
        }
    }

    fn set_voice(&self, voice: &str) {
        self.settings_lock().voice = voice.to_owned();
    }

    fn set_speed(&self, speed: f32) {
        self.settings_lock().speed = clamp_speed(speed);
    }

    fn set_volume(&self, volume: u8) {
        self.settings_lock().volume = clamp_volume(volume);
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

        let mine = self.bump_generation();
        self.sink.stop();
        let mut cancelled = self.generation.subscribe();

        let runtime = self.runtime().await?;
        if !self.is_current(mine) {
            return Err(EngineError::Superseded);
        }

        let artifact = AudioArtifact::reserve(&self.options.artifact_dir);
        let invocation = self.invocation(text, &artifact);
        log::debug!(
            "process: synthesising {} char(s) with {} into {}",
            text.len(),
            invocation.model,
            artifact.path().display()
        );

        let child = runtime.command(invocation.args()).spawn()?;
        let output = tokio::select! {
            output = wait_for_helper(child, self.options.timeout) => output?,
            _ = superseded(&mut cancelled, mine) => {
                log::debug!("process: synthesis abandoned");
                return Err(EngineError::Superseded);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("helper exited with {}", output.status)
            } else {
                stderr
            };
            return Err(EngineError::Synthesis(message));
        }
        if !artifact.exists() {
            return Err(EngineError::ArtifactMissing(
                artifact.path().display().to_string(),
            ));
        }

        let wav = artifact.read_and_remove().await?;
        if !self.is_current(mine) {
            return Err(EngineError::Superseded);
        }

        let sink = Arc::clone(&self.sink);
        let generation = self.generation.subscribe();
        tokio::task::spawn_blocking(move || sink.play(wav, &|| *generation.borrow() == mine))
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
            .map_err(|e| EngineError::Playback(e.to_string()))?;

        if !self.is_current(mine) {
            return Err(EngineError::Superseded);
        }
        Ok(format!("spoke with Piper TTS ({})", invocation.model))
    }

    fn stop(&self) {
        self.bump_generation();
        self.sink.stop();
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop();
        log::debug!("process: disposed");
    }

    async fn ensure_installed(&self) -> Result<(), EngineError> {
        self.runtime().await?.ensure_installed().await
    }

    async fn voice_language(&self, voice: &str) -> Option<String> {
        voice_language(voice)
    }

    async fn is_voice_downloaded(&self, voice: &str) -> Option<bool> {
        Some(voice_downloaded(&self.options.data_dir, voice))
    }

    async fn download_voice(&self, voice: &str) -> Result<String, EngineError> {
        self.runtime().await?.download_voice(voice).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
