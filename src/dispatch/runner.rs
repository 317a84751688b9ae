//! The dispatch loop: clipboard polling, hotkey pulses, operator commands.
//!
//! # Tick flow
//!
//! ```text
//! tick()
//!   ├─ not listening ─────────────────────────────▶ NotListening
//!   ├─ spawn_blocking(clipboard.read_text)
//!   │     └─ Err ──────────────── report once ────▶ ClipboardError
//!   ├─ empty ─────────────────────────────────────▶ Empty
//!   ├─ same raw text, no hotkey pulse ────────────▶ Unchanged
//!   ├─ registry switching ───── keep pulse ───────▶ Deferred
//!   ├─ TextFilter: no words / too many words ─────▶ NoSpeakable / TooLong
//!   ├─ same fragment as last spoken ──────────────▶ Repeat
//!   ├─ no engine ─────────────── report once ─────▶ EngineUnavailable
//!   └─ remember, stop previous utterance,
//!      spawn engine.speak(fragment) ──────────────▶ Dispatched
//! ```
//!
//! Speak tasks and engine switches run on their own tasks and report back
//! over an unbounded channel, so the loop never waits on audio or installs.

use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clipboard::ClipboardSource;
use crate::config::ListenConfig;
use crate::diagnostics::{self, DiagnosticReport};
use crate::engine::{EngineError, EngineKind, SpeechEngine};
use crate::hotkey::{HotkeyEvent, HotkeyGate};
use crate::registry::{EngineRegistry, SwitchError, SwitchOutcome};
use crate::text::{self, RepeatMemory};

use super::state::{DispatchStatus, ListenState, SharedStatus};

/// Spoken by the `test` command, bypassing the filter and repeat memory.
pub const TEST_UTTERANCE: &str =
    "Hello, this is a test of the AutoVoice application. The speech synthesis is working correctly.";

// ---------------------------------------------------------------------------
// Commands and outcomes
// ---------------------------------------------------------------------------

/// Requests from the front-end, handled on the loop's own task.
#[derive(Debug)]
pub enum DispatchCommand {
    Start,
    Stop,
    SwitchEngine(EngineKind),
    SetSpeed(f32),
    SetVolume(u8),
    SetVoice(String),
    SpeakTest,
    Diagnose(oneshot::Sender<DiagnosticReport>),
    Shutdown,
}

/// What a single tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NotListening,
    ClipboardError,
    Empty,
    Unchanged,
    Deferred,
    NoSpeakable,
    TooLong(usize),
    Repeat,
    EngineUnavailable,
    Dispatched(String),
}

/// Completion messages from worker tasks.
#[derive(Debug)]
enum Report {
    Speak {
        text: String,
        result: Result<String, EngineError>,
    },
    Switch {
        kind: EngineKind,
        result: Result<SwitchOutcome, SwitchError>,
    },
    Voice {
        voice: String,
        result: Result<String, SwitchError>,
    },
}

// ---------------------------------------------------------------------------
// DispatchLoop
// ---------------------------------------------------------------------------

/// Owns all coordinator state; run it with [`DispatchLoop::run`] on one
/// tokio task.
pub struct DispatchLoop {
    registry: EngineRegistry,
    clipboard: Arc<dyn ClipboardSource>,
    gate: HotkeyGate,
    status: SharedStatus,

    poll_interval: Duration,
    settle: Duration,
    max_words: usize,

    listen: ListenState,
    memory: RepeatMemory,
    /// Last payload that was spoken or rejected.  Drives the unchanged check
    /// and keeps each rejection to one report.
    last_seen: Option<String>,
    hotkey_pending: bool,
    settle_deadline: Option<Instant>,
    /// Raw payload whose "not initialized" notice was already reported.
    noticed: Option<String>,
    last_clipboard_error: Option<String>,
    speak_task: Option<JoinHandle<()>>,

    report_tx: mpsc::UnboundedSender<Report>,
    report_rx: Option<mpsc::UnboundedReceiver<Report>>,
}

impl DispatchLoop {
    pub fn new(
        registry: EngineRegistry,
        clipboard: Arc<dyn ClipboardSource>,
        gate: HotkeyGate,
        config: &ListenConfig,
        status: SharedStatus,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let dispatch = Self {
            registry,
            clipboard,
            gate,
            status,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(10)),
            settle: Duration::from_millis(config.hotkey_settle_ms),
            max_words: config.max_words,
            listen: ListenState::Stopped,
            memory: RepeatMemory::new(),
            last_seen: None,
            hotkey_pending: false,
            settle_deadline: None,
            noticed: None,
            last_clipboard_error: None,
            speak_task: None,
            report_tx,
            report_rx: Some(report_rx),
        };
        dispatch.refresh_settings_line();
        dispatch
    }

    fn status(&self) -> MutexGuard<'_, DispatchStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refresh_settings_line(&self) {
        let line = self.registry.settings().summary();
        self.status().settings_line = line;
    }

    pub fn listen_state(&self) -> ListenState {
        self.listen
    }

    pub fn memory(&self) -> &RepeatMemory {
        &self.memory
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until [`DispatchCommand::Shutdown`] or the command channel closes.
    pub async fn run(
        mut self,
        mut hotkey_rx: mpsc::Receiver<HotkeyEvent>,
        mut command_rx: mpsc::Receiver<DispatchCommand>,
    ) {
        let Some(mut report_rx) = self.report_rx.take() else {
            log::error!("dispatch: run() called twice");
            return;
        };
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut hotkey_open = true;

        loop {
            let settle_at = self.settle_deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                _ = ticker.tick(), if self.listen.is_listening() => {
                    self.tick().await;
                }
                _ = tokio::time::sleep_until(settle_at), if self.settle_deadline.is_some() => {
                    self.settle_deadline = None;
                    self.tick().await;
                }
                event = hotkey_rx.recv(), if hotkey_open => match event {
                    Some(event) => self.on_hotkey(event),
                    None => {
                        log::debug!("dispatch: hotkey channel closed");
                        hotkey_open = false;
                    }
                },
                Some(report) = report_rx.recv() => {
                    self.handle_report(report);
                }
                command = command_rx.recv() => match command {
                    Some(DispatchCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        self.stop();
        self.registry.shutdown();
        log::info!("dispatch: loop finished");
    }

    // -----------------------------------------------------------------------
    // Listening
    // -----------------------------------------------------------------------

    /// Stopped → Listening: arm the hotkey, forget previous text.
    pub fn start(&mut self) {
        if self.listen.is_listening() {
            return;
        }
        self.memory.reset();
        self.last_seen = None;
        self.noticed = None;
        self.last_clipboard_error = None;
        self.hotkey_pending = false;
        self.gate.arm();
        self.listen = ListenState::Listening;

        let mut status = self.status();
        status.listen = ListenState::Listening;
        status.log.info("Listening for clipboard changes");
    }

    /// Listening → Stopped: disarm, silence the engine, forget previous text.
    pub fn stop(&mut self) {
        if !self.listen.is_listening() {
            return;
        }
        self.gate.disarm();
        self.listen = ListenState::Stopped;
        self.hotkey_pending = false;
        self.settle_deadline = None;
        self.cancel_speech();
        self.memory.reset();
        self.last_seen = None;

        let mut status = self.status();
        status.listen = ListenState::Stopped;
        status.log.info("Stopped listening");
    }

    /// Record a hotkey pulse; the forced re-check runs after the settle delay.
    pub fn on_hotkey(&mut self, event: HotkeyEvent) {
        match event {
            HotkeyEvent::CopyPressed if self.listen.is_listening() => {
                log::debug!("dispatch: copy keystroke, re-checking clipboard");
                self.hotkey_pending = true;
                self.settle_deadline = Some(Instant::now() + self.settle);
            }
            HotkeyEvent::CopyPressed => {}
        }
    }

    fn cancel_speech(&mut self) {
        if let Some(engine) = self.registry.current() {
            engine.stop();
        }
        if let Some(task) = self.speak_task.take() {
            task.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// One pass over the clipboard.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.listen.is_listening() {
            return TickOutcome::NotListening;
        }

        let clipboard = Arc::clone(&self.clipboard);
        let read = tokio::task::spawn_blocking(move || clipboard.read_text())
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()));
        let raw = match read {
            Ok(raw) => {
                self.last_clipboard_error = None;
                raw
            }
            Err(message) => {
                if self.last_clipboard_error.as_deref() != Some(message.as_str()) {
                    self.status().log.warn(format!("Clipboard error: {message}"));
                    self.last_clipboard_error = Some(message);
                }
                return TickOutcome::ClipboardError;
            }
        };

        if raw.trim().is_empty() {
            return TickOutcome::Empty;
        }
        if self.last_seen.as_deref() == Some(raw.as_str()) && !self.hotkey_pending {
            return TickOutcome::Unchanged;
        }
        if self.registry.is_switching() {
            return TickOutcome::Deferred;
        }
        self.hotkey_pending = false;

        let fragment = text::fragment(&raw);
        if fragment.is_empty() {
            self.last_seen = Some(raw);
            log::debug!("dispatch: no English words in clipboard");
            return TickOutcome::NoSpeakable;
        }
        if fragment.exceeds(self.max_words) {
            self.last_seen = Some(raw);
            self.status().log.info(format!(
                "Text too long ({} words, max {}), skipped",
                fragment.len(),
                self.max_words
            ));
            return TickOutcome::TooLong(fragment.len());
        }

        let normalized = fragment.normalized();
        if self.memory.is_repeat(&normalized) {
            self.last_seen = Some(raw);
            self.status().log.info(format!("Skipped repeat: {normalized}"));
            return TickOutcome::Repeat;
        }

        let Some(engine) = self.registry.current() else {
            if self.noticed.as_deref() != Some(raw.as_str()) {
                self.status().log.warn("speech engine not initialized");
                self.noticed = Some(raw);
            }
            return TickOutcome::EngineUnavailable;
        };

        self.memory.observe(&raw);
        self.memory.record_spoken(&normalized);
        self.last_seen = Some(raw);
        self.noticed = None;
        self.dispatch(engine, normalized.clone());
        TickOutcome::Dispatched(normalized)
    }

    /// Replace any in-flight utterance with `text`.
    fn dispatch(&mut self, engine: Arc<dyn SpeechEngine>, text: String) {
        engine.stop();
        if let Some(task) = self.speak_task.take() {
            task.abort();
        }

        {
            let mut status = self.status();
            status.speak_count += 1;
            status.last_spoken = Some(text.clone());
            status.log.info(format!("Speaking: {text}"));
        }

        let tx = self.report_tx.clone();
        self.speak_task = Some(tokio::spawn(async move {
            let result = engine.speak(&text).await;
            let _ = tx.send(Report::Speak { text, result });
        }));
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: DispatchCommand) {
        log::debug!("dispatch: command {command:?}");
        match command {
            DispatchCommand::Start => self.start(),
            DispatchCommand::Stop => self.stop(),
            DispatchCommand::SwitchEngine(kind) => self.begin_switch(kind),
            DispatchCommand::SetSpeed(speed) => {
                let applied = self.registry.set_speed(speed);
                self.status().log.info(format!("Speed set to {applied:.1}x"));
                self.refresh_settings_line();
            }
            DispatchCommand::SetVolume(volume) => {
                let applied = self.registry.set_volume(volume);
                self.status().log.info(format!("Volume set to {applied}%"));
                self.refresh_settings_line();
            }
            DispatchCommand::SetVoice(voice) => {
                let registry = self.registry.clone();
                let tx = self.report_tx.clone();
                tokio::spawn(async move {
                    let result = registry.set_voice(&voice).await;
                    let _ = tx.send(Report::Voice { voice, result });
                });
            }
            DispatchCommand::SpeakTest => match self.registry.current() {
                Some(engine) => self.dispatch(engine, TEST_UTTERANCE.to_string()),
                None => self.status().log.warn("speech engine not initialized"),
            },
            DispatchCommand::Diagnose(reply) => {
                let registry = self.registry.clone();
                let listen = self.listen;
                tokio::spawn(async move {
                    let report = diagnostics::collect(&registry, listen).await;
                    let _ = reply.send(report);
                });
            }
            // Handled by `run`.
            DispatchCommand::Shutdown => {}
        }
    }

    fn begin_switch(&mut self, kind: EngineKind) {
        if self.registry.is_switching() {
            self.status()
                .log
                .info(format!("Switch to {kind} ignored, a switch is already running"));
            return;
        }
        if let Some(task) = self.speak_task.take() {
            task.abort();
        }
        self.status().log.info(format!("Switching to {kind}..."));

        let registry = self.registry.clone();
        let tx = self.report_tx.clone();
        tokio::spawn(async move {
            let result = registry.switch_to(kind).await;
            let _ = tx.send(Report::Switch { kind, result });
        });
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    fn handle_report(&mut self, report: Report) {
        match report {
            Report::Speak { text, result } => match result {
                Ok(message) => log::debug!("dispatch: {message}"),
                Err(EngineError::Superseded) => {
                    log::debug!("dispatch: '{text}' superseded");
                }
                Err(e) => self.status().log.warn(format!("Speech failed for '{text}': {e}")),
            },
            Report::Switch { kind, result } => {
                match result {
                    Ok(SwitchOutcome::Switched {
                        voice,
                        voices,
                        message,
                        ..
                    }) => {
                        self.status().log.info(format!(
                            "{kind} ready: {message} ({voices} voices, using {voice})"
                        ));
                    }
                    Ok(SwitchOutcome::Ignored) => {
                        self.status()
                            .log
                            .info(format!("Switch to {kind} ignored, a switch is already running"));
                    }
                    Err(e) => {
                        let mut status = self.status();
                        status.log.warn(format!("Engine switch failed: {e}"));
                        if kind == EngineKind::Process {
                            status
                                .log
                                .warn("Install Piper manually with: python -m pip install piper-tts");
                        }
                    }
                }
                self.refresh_settings_line();
            }
            Report::Voice { voice, result } => {
                match result {
                    Ok(message) => self.status().log.info(message),
                    Err(e) => self.status().log.warn(format!("Could not select {voice}: {e}")),
                }
                self.refresh_settings_line();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Test helpers
    // -----------------------------------------------------------------------

    /// Wait for the in-flight speak task, then handle every queued report.
    #[cfg(test)]
    async fn drain_reports(&mut self) {
        if let Some(task) = self.speak_task.take() {
            let _ = task.await;
        }
        let mut reports = Vec::new();
        if let Some(rx) = self.report_rx.as_mut() {
            while let Ok(report) = rx.try_recv() {
                reports.push(report);
            }
        }
        for report in reports {
            self.handle_report(report);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
