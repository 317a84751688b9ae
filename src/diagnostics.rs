//! Read-only diagnostic report: installation probe, voices with their
//! download state, and the current engine configuration.

use std::fmt;

use chrono::Local;
use serde::Serialize;

use crate::dispatch::ListenState;
use crate::engine::{EngineSettings, Probe};
use crate::registry::EngineRegistry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceEntry {
    pub name: String,
    /// BCP 47 tag, when the engine reports one.
    pub language: Option<String>,
    /// `None` for engines whose voices need no download.
    pub downloaded: Option<bool>,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub generated_at: String,
    /// Display name of the live engine, if any.
    pub engine: Option<String>,
    pub switch_state: String,
    pub listen_state: String,
    pub probe: Option<Probe>,
    pub settings: EngineSettings,
    pub voices: Vec<VoiceEntry>,
    pub english_voices: usize,
    pub last_error: Option<String>,
}

/// By language tag when known, otherwise by the voice name.
fn is_english(voice: &VoiceEntry) -> bool {
    match &voice.language {
        Some(tag) => {
            let primary = tag.split(['-', '_']).next().unwrap_or_default();
            primary.eq_ignore_ascii_case("en")
        }
        None => {
            let lower = voice.name.to_ascii_lowercase();
            lower.starts_with("en_") || lower.starts_with("en-") || lower.contains("english")
        }
    }
}

/// Query the registry and its live engine.  Nothing is changed.
pub async fn collect(registry: &EngineRegistry, listen: ListenState) -> DiagnosticReport {
    let settings = registry.settings();
    let engine = registry.current();

    let mut probe = None;
    let mut voices = Vec::new();
    if let Some(engine) = &engine {
        probe = Some(engine.is_available().await);
        let mut names = registry.voices();
        if names.is_empty() {
            names = engine.list_voices().await;
        }
        for name in names {
            let downloaded = engine.is_voice_downloaded(&name).await;
            let language = engine.voice_language(&name).await;
            voices.push(VoiceEntry {
                selected: name == settings.voice,
                downloaded,
                language,
                name,
            });
        }
    }

    DiagnosticReport {
        generated_at: Local::now().to_rfc3339(),
        engine: engine.map(|e| e.name().to_string()),
        switch_state: registry.state().label().to_string(),
        listen_state: listen.label().to_string(),
        english_voices: voices.iter().filter(|v| is_english(v)).count(),
        probe,
        settings,
        voices,
        last_error: registry.last_error(),
    }
}

impl DiagnosticReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Speech diagnostics ({}) ===", self.generated_at)?;
        writeln!(
            f,
            "Engine: {} [{}] | listening: {}",
            self.engine.as_deref().unwrap_or("not initialized"),
            self.switch_state,
            self.listen_state
        )?;
        match &self.probe {
            Some(p) => writeln!(
                f,
                "Installed: {} ({})",
                if p.available { "yes" } else { "no" },
                p.message
            )?,
            None => writeln!(f, "Installed: unknown")?,
        }
        writeln!(f, "Settings: {}", self.settings.summary())?;
        writeln!(
            f,
            "Voices: {} ({} English)",
            self.voices.len(),
            self.english_voices
        )?;
        for voice in &self.voices {
            let marker = if voice.selected { "*" } else { " " };
            let state = match voice.downloaded {
                Some(true) => " [downloaded]",
                Some(false) => " [not downloaded]",
                None => "",
            };
            let language = voice
                .language
                .as_deref()
                .map(|l| format!(" ({l})"))
                .unwrap_or_default();
            writeln!(f, " {marker} {}{language}{state}", voice.name)?;
        }
        if let Some(err) = &self.last_error {
            writeln!(f, "Last error: {err}")?;
        }
        Ok(())
    }
}
