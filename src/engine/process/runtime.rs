//! Piper helper runtime: interpreter discovery and the `python -m ...`
//! commands used to check, install and manage voices.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;

use crate::engine::speech::{EngineError, Probe};

/// Interpreters tried in order when none is configured.
pub const PYTHON_CANDIDATES: &[&str] = &["python", "python3", "py"];

/// Voices offered when the runtime cannot list its catalogue.
pub const FALLBACK_VOICES: &[&str] = &[
    "en_US-lessac-medium",
    "en_US-amy-medium",
    "en_GB-alan-medium",
];

/// Find a working interpreter.
///
/// An explicitly configured interpreter is used as-is if it answers
/// `--version`; otherwise [`PYTHON_CANDIDATES`] are probed in order.
pub async fn detect_interpreter(configured: Option<&Path>) -> Result<PathBuf, EngineError> {
    if let Some(path) = configured {
        if answers_version(path.as_os_str()).await {
            return Ok(path.to_path_buf());
        }
        return Err(EngineError::Unavailable(format!(
            "configured interpreter {} does not run",
            path.display()
        )));
    }

    for candidate in PYTHON_CANDIDATES {
        if answers_version(std::ffi::OsStr::new(candidate)).await {
            log::debug!("process: using interpreter '{candidate}'");
            return Ok(PathBuf::from(candidate));
        }
    }

    Err(EngineError::Unavailable(format!(
        "no Python interpreter found (tried {})",
        PYTHON_CANDIDATES.join(", ")
    )))
}

async fn answers_version(program: &std::ffi::OsStr) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .is_ok_and(|s| s.success())
}

/// Keep `en_`/`zh_` catalogue lines and take their first token.
pub fn parse_voice_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.contains("en_") || line.contains("zh_"))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

/// Language of a Piper voice id: `en_US-lessac-medium` is `en-US`.
pub fn voice_language(voice: &str) -> Option<String> {
    let locale = voice.split('-').next()?;
    let (lang, region) = locale.split_once('_')?;
    let valid = |part: &str, len: usize| part.len() == len && part.chars().all(|c| c.is_ascii_alphabetic());
    (valid(lang, 2) && valid(region, 2)).then(|| format!("{lang}-{region}"))
}

pub fn fallback_voices() -> Vec<String> {
    FALLBACK_VOICES.iter().map(|v| v.to_string()).collect()
}

/// `true` when the voice's model file is present under `data_dir`, either
/// as `<voice>/*.onnx` or `<voice>.onnx`.
pub fn voice_downloaded(data_dir: &Path, voice: &str) -> bool {
    if voice.is_empty() {
        return false;
    }
    if data_dir.join(format!("{voice}.onnx")).is_file() {
        return true;
    }
    let Ok(entries) = std::fs::read_dir(data_dir.join(voice)) else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .any(|e| e.path().extension().is_some_and(|ext| ext == "onnx"))
}

fn exit_code(output: &Output) -> String {
    output
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string())
}

// ---------------------------------------------------------------------------
// HelperRuntime
// ---------------------------------------------------------------------------

/// A resolved interpreter plus the settings every command shares.
#[derive(Debug, Clone)]
pub struct HelperRuntime {
    interpreter: PathBuf,
    data_dir: PathBuf,
    package: String,
}

impl HelperRuntime {
    pub fn new(interpreter: PathBuf, data_dir: PathBuf, package: impl Into<String>) -> Self {
        Self {
            interpreter,
            data_dir,
            package: package.into(),
        }
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Interpreter command with captured output that dies with its handle.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<Output, EngineError> {
        log::debug!("process: {} {}", self.interpreter.display(), args.join(" "));
        Ok(self.command(args).output().await?)
    }

    /// `python -c "import piper"`.
    pub async fn check_installed(&self) -> Probe {
        match self.run(&["-c", "import piper"]).await {
            Ok(out) if out.status.success() => Probe::available("Piper TTS is installed"),
            Ok(out) => Probe::unavailable(format!(
                "Piper TTS is not installed (exit code {}): {} {}",
                exit_code(&out),
                String::from_utf8_lossy(&out.stderr).trim(),
                String::from_utf8_lossy(&out.stdout).trim(),
            )),
            Err(e) => Probe::unavailable(format!("could not run interpreter: {e}")),
        }
    }

    /// `python -m pip install <package>`.
    pub async fn install(&self) -> Result<String, EngineError> {
        let out = self.run(&["-m", "pip", "install", self.package.as_str()]).await?;
        if out.status.success() {
            return Ok(format!("{} installed", self.package));
        }
        Err(EngineError::Install(format!(
            "pip install {} failed (exit code {})\nstderr: {}\nstdout: {}",
            self.package,
            exit_code(&out),
            String::from_utf8_lossy(&out.stderr).trim(),
            String::from_utf8_lossy(&out.stdout).trim(),
        )))
    }

    /// Installed-or-install.
    pub async fn ensure_installed(&self) -> Result<(), EngineError> {
        let probe = self.check_installed().await;
        if probe.available {
            return Ok(());
        }
        log::info!("process: {}; installing {}", probe.message, self.package);
        self.install().await.map(|_| ())
    }

    /// Catalogue from `python -m piper.download_voices`, or the fallback list.
    pub async fn list_voices(&self) -> Vec<String> {
        match self.run(&["-m", "piper.download_voices"]).await {
            Ok(out) if out.status.success() => {
                let voices = parse_voice_listing(&String::from_utf8_lossy(&out.stdout));
                if voices.is_empty() {
                    fallback_voices()
                } else {
                    voices
                }
            }
            Ok(out) => {
                log::warn!(
                    "process: voice listing failed (exit code {}), using fallback list",
                    exit_code(&out)
                );
                fallback_voices()
            }
            Err(e) => {
                log::warn!("process: voice listing failed ({e}), using fallback list");
                fallback_voices()
            }
        }
    }

    pub fn is_voice_downloaded(&self, voice: &str) -> bool {
        voice_downloaded(&self.data_dir, voice)
    }

    /// `python -m piper.download_voices <voice> --data-dir <dir>`.
    pub async fn download_voice(&self, voice: &str) -> Result<String, EngineError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let data_dir = self.data_dir.to_string_lossy().into_owned();
        let out = self
            .run(&["-m", "piper.download_voices", voice, "--data-dir", data_dir.as_str()])
            .await?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        if out.status.success() || stdout.contains("already exists") {
            return Ok(format!("voice {voice} is ready"));
        }
        Err(EngineError::Download(format!(
            "{voice}: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
