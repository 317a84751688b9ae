//! One synthesis request: the helper's argument list and the temporary WAV
//! file it writes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Arguments for `python -m piper ...`.
#[derive(Debug, Clone)]
pub struct SynthesisInvocation {
    pub model: String,
    pub data_dir: PathBuf,
    /// `0..=100`, passed to the helper as a multiplier.
    pub volume: u8,
    pub speed: f32,
    pub use_npu: bool,
    pub output: PathBuf,
    pub text: String,
}

impl SynthesisInvocation {
    /// Volume multiplier as passed on the command line (`0.35`).
    pub fn volume_arg(&self) -> String {
        format!("{:.2}", self.volume.min(100) as f32 / 100.0)
    }

    /// `--length-scale` value, only when the speed differs from normal.
    pub fn length_scale_arg(&self) -> Option<String> {
        if (self.speed - 1.0).abs() < 0.01 || self.speed <= 0.0 {
            return None;
        }
        Some(format!("{:.2}", 1.0 / self.speed))
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-m".into(),
            "piper".into(),
            "-m".into(),
            self.model.clone().into(),
            "--data-dir".into(),
            self.data_dir.clone().into(),
            "--volume".into(),
            self.volume_arg().into(),
        ];
        if let Some(scale) = self.length_scale_arg() {
            args.push("--length-scale".into());
            args.push(scale.into());
        }
        if self.use_npu {
            args.push("--use-npu".into());
        }
        args.push("-f".into());
        args.push(self.output.clone().into());
        args.push("--".into());
        args.push(self.text.clone().into());
        args
    }
}

// ---------------------------------------------------------------------------
// AudioArtifact
// ---------------------------------------------------------------------------

/// Owns the helper's output path and deletes the file on every exit path.
#[derive(Debug)]
pub struct AudioArtifact {
    path: PathBuf,
}

impl AudioArtifact {
    /// Reserve `piper_<uuid>.wav` inside `dir`.  Nothing is created yet.
    pub fn reserve(dir: &Path) -> Self {
        let name = format!("piper_{}.wav", uuid::Uuid::new_v4());
        Self {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the whole file and delete it straight away.
    pub async fn read_and_remove(self) -> std::io::Result<Vec<u8>> {
        let bytes = tokio::fs::read(&self.path).await?;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            log::warn!("process: could not delete {}: {e}", self.path.display());
        }
        Ok(bytes)
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("process: could not delete {}: {e}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn invocation() -> SynthesisInvocation {
        SynthesisInvocation {
            model: "en_US-lessac-medium".into(),
            data_dir: PathBuf::from("/data/piper"),
            volume: 35,
            speed: 1.0,
            use_npu: false,
            output: PathBuf::from("/tmp/piper_x.wav"),
            text: "hello world".into(),
        }
    }

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn default_arguments_in_order() {
        assert_eq!(
            as_strings(invocation().args()),
            vec![
                "-m",
                "piper",
                "-m",
                "en_US-lessac-medium",
                "--data-dir",
                "/data/piper",
                "--volume",
                "0.35",
                "-f",
                "/tmp/piper_x.wav",
                "--",
                "hello world",
            ]
        );
    }

    #[test]
    fn npu_and_speed_add_flags() {
        let mut inv = invocation();
        inv.use_npu = true;
        inv.speed = 2.0;
        let args = as_strings(inv.args());
        let scale = args.iter().position(|a| a == "--length-scale").unwrap();
        assert_eq!(args[scale + 1], "0.50");
        assert!(args.contains(&"--use-npu".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("hello world"));
    }

    #[test]
    fn volume_formats_with_two_decimals() {
        let mut inv = invocation();
        inv.volume = 100;
        assert_eq!(inv.volume_arg(), "1.00");
        inv.volume = 0;
        assert_eq!(inv.volume_arg(), "0.00");
    }

    #[test]
    fn text_starting_with_dash_stays_after_separator() {
        let mut inv = invocation();
        inv.text = "-f oops".into();
        let args = as_strings(inv.args());
        let sep = args.iter().position(|a| a == "--").unwrap();
        assert_eq!(args[sep + 1], "-f oops");
    }

    #[test]
    fn artifact_names_are_unique() {
        let dir = tempdir().expect("temp dir");
        let a = AudioArtifact::reserve(dir.path());
        let b = AudioArtifact::reserve(dir.path());
        assert_ne!(a.path(), b.path());
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("piper_") && name.ends_with(".wav"));
    }

    #[test]
    fn dropping_artifact_deletes_file() {
        let dir = tempdir().expect("temp dir");
        let artifact = AudioArtifact::reserve(dir.path());
        std::fs::write(artifact.path(), b"RIFF").unwrap();
        let path = artifact.path().to_path_buf();
        drop(artifact);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn read_and_remove_returns_bytes() {
        let dir = tempdir().expect("temp dir");
        let artifact = AudioArtifact::reserve(dir.path());
        std::fs::write(artifact.path(), b"RIFFdata").unwrap();
        let path = artifact.path().to_path_buf();
        let bytes = artifact.read_and_remove().await.unwrap();
        assert_eq!(bytes, b"RIFFdata");
        assert!(!path.exists());
    }
}
