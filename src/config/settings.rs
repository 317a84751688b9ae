//! Settings persisted in `settings.toml`.  Every section is `#[serde(default)]`
//! so a partial or older file still loads.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::engine::{EngineKind, EngineSettings};

/// Which engine to start with and the last-known speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine selected at startup.
    pub kind: EngineKind,
    /// Speaking rate multiplier (0.5 – 2.0, 1.0 is normal).
    pub speed: f32,
    /// Output volume (0 – 100).
    pub volume: u8,
    /// Voice name; empty means "first voice the engine offers".
    pub voice: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Native,
            speed: 1.0,
            volume: 100,
            voice: String::new(),
        }
    }
}

impl EngineConfig {
    /// Settings snapshot handed to the registry (clamped).
    pub fn settings(&self) -> EngineSettings {
        EngineSettings::new(self.speed, self.volume, self.voice.clone())
    }

    /// Copy the registry's last-known settings back for persistence.
    pub fn absorb(&mut self, kind: EngineKind, settings: &EngineSettings) {
        self.kind = kind;
        self.speed = settings.speed;
        self.volume = settings.volume;
        self.voice = settings.voice.clone();
    }
}

/// Clipboard polling and filtering behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Interval between clipboard polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Fragments with more words than this are rejected, never truncated.
    pub max_words: usize,
    /// Delay between a copy keystroke and the forced re-check, giving the
    /// foreground application time to publish the new clipboard content.
    pub hotkey_settle_ms: u64,
    /// Number of status lines kept in memory.
    pub status_capacity: usize,
    /// Start listening as soon as the engine is ready.
    pub auto_start: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_words: 4,
            hotkey_settle_ms: 80,
            status_capacity: 200,
            auto_start: true,
        }
    }
}

/// Global copy-keystroke binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Install the global keyboard hook at all.
    pub enabled: bool,
    /// Modifier that must be held (`"Ctrl"`, `"Alt"`, `"Shift"`, `"Meta"`).
    pub modifier: String,
    /// Key that completes the combination (e.g. `"C"`).
    pub key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            modifier: "Ctrl".into(),
            key: "C".into(),
        }
    }
}

/// Settings for the Piper runtime driven as an external process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Python interpreter to use.  `None` probes `python`, `python3`, `py`.
    pub interpreter: Option<PathBuf>,
    /// Voice data directory.  `None` uses [`AppPaths::voices_dir`].
    pub data_dir: Option<PathBuf>,
    /// Package installed by `pip` when the runtime is missing.
    pub package: String,
    /// Voice model used until the user picks another one.
    pub default_voice: String,
    /// Pass `--use-npu` to the synthesiser.
    pub use_npu: bool,
    /// Kill a synthesis process that runs longer than this; `0` disables.
    pub synthesis_timeout_secs: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            data_dir: None,
            package: "piper-tts".into(),
            default_voice: "en_US-lessac-medium".into(),
            use_npu: false,
            synthesis_timeout_secs: 60,
        }
    }
}

impl ProcessConfig {
    /// Effective voice data directory.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().voices_dir)
    }
}

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use auto_voice::config::AppConfig;
///
/// let mut config = AppConfig::load()?;
/// config.listen.max_words = 6;
/// config.save()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine selection and speech settings.
    pub engine: EngineConfig,
    /// Clipboard polling behaviour.
    pub listen: ListenConfig,
    /// Global hotkey binding.
    pub hotkey: HotkeyConfig,
    /// External-process engine settings.
    pub process: ProcessConfig,
}

impl AppConfig {
    /// Read `settings.toml` from the per-user config directory.  A missing
    /// file yields the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Write the settings, creating missing parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("serialising settings")?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_run_loads_defaults_and_creates_dirs_on_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.engine.kind, EngineKind::Native);
        assert!(!path.exists());

        cfg.save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[engine
kind = ").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.engine.kind, EngineKind::Native);
        assert!((cfg.engine.speed - 1.0).abs() < f32::EPSILON);
        assert_eq!(cfg.engine.volume, 100);
        assert!(cfg.engine.voice.is_empty());
        assert_eq!(cfg.listen.poll_interval_ms, 100);
        assert_eq!(cfg.listen.max_words, 4);
        assert_eq!(cfg.hotkey.modifier, "Ctrl");
        assert_eq!(cfg.hotkey.key, "C");
        assert_eq!(cfg.process.package, "piper-tts");
        assert_eq!(cfg.process.default_voice, "en_US-lessac-medium");
        assert!(!cfg.process.use_npu);
        assert_eq!(cfg.process.synthesis_timeout_secs, 60);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.engine.kind = EngineKind::Process;
        cfg.engine.speed = 1.5;
        cfg.engine.volume = 40;
        cfg.engine.voice = "en_GB-alan-medium".into();
        cfg.listen.max_words = 6;
        cfg.process.interpreter = Some(PathBuf::from("/usr/bin/python3"));
        cfg.process.use_npu = true;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.engine.kind, EngineKind::Process);
        assert!((loaded.engine.speed - 1.5).abs() < f32::EPSILON);
        assert_eq!(loaded.engine.volume, 40);
        assert_eq!(loaded.engine.voice, "en_GB-alan-medium");
        assert_eq!(loaded.listen.max_words, 6);
        assert_eq!(
            loaded.process.interpreter,
            Some(PathBuf::from("/usr/bin/python3"))
        );
        assert!(loaded.process.use_npu);
    }

    #[test]
    fn partial_file_fills_missing_sections_with_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[engine]\nkind = \"process\"\nvolume = 55\n").expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.engine.kind, EngineKind::Process);
        assert_eq!(cfg.engine.volume, 55);
        assert!((cfg.engine.speed - 1.0).abs() < f32::EPSILON);
        assert_eq!(cfg.listen.poll_interval_ms, 100);
    }

    #[test]
    fn settings_are_clamped_on_the_way_out() {
        let mut cfg = EngineConfig::default();
        cfg.speed = 9.0;
        cfg.volume = 250;
        let s = cfg.settings();
        assert!((s.speed - 2.0).abs() < f32::EPSILON);
        assert_eq!(s.volume, 100);
    }

    #[test]
    fn explicit_data_dir_wins() {
        let mut cfg = ProcessConfig::default();
        cfg.data_dir = Some(PathBuf::from("/tmp/voices"));
        assert_eq!(cfg.resolved_data_dir(), PathBuf::from("/tmp/voices"));
        cfg.data_dir = None;
        assert!(cfg.resolved_data_dir().ends_with("piper_data"));
    }
}
