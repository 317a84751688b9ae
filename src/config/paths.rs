//! Per-user locations for settings and Piper voice data.
//!
//! | what            | Linux                                   | Windows                          |
//! |-----------------|-----------------------------------------|----------------------------------|
//! | `settings.toml` | `~/.config/auto-voice/`                 | `%APPDATA%\auto-voice\`          |
//! | voice data      | `~/.local/share/auto-voice/piper_data/` | `%LOCALAPPDATA%\auto-voice\piper_data\` |
//!
//! macOS keeps both under `~/Library/Application Support/auto-voice/`.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "auto-voice";
const SETTINGS_FILE: &str = "settings.toml";
const VOICES_DIR: &str = "piper_data";

#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Handed to the Piper runtime as `--data-dir` unless overridden.
    pub voices_dir: PathBuf,
}

impl AppPaths {
    /// Platform directories, or the working directory when the platform
    /// has none (e.g. `$HOME` unset).
    pub fn new() -> Self {
        let here = || PathBuf::from(".");
        Self::under(
            &dirs::config_dir().unwrap_or_else(here),
            &dirs::data_local_dir().unwrap_or_else(here),
        )
    }

    fn under(config_base: &Path, data_base: &Path) -> Self {
        let config_dir = config_base.join(APP_DIR);
        Self {
            settings_file: config_dir.join(SETTINGS_FILE),
            voices_dir: data_base.join(APP_DIR).join(VOICES_DIR),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
