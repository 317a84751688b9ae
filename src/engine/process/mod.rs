//! Engine variant that drives the Piper neural voice runtime as an external
//! Python process.
//!
//! # Protocol
//!
//! ```text
//! check     <py> -c "import piper"
//! install   <py> -m pip install piper-tts
//! voices    <py> -m piper.download_voices
//! download  <py> -m piper.download_voices <voice> --data-dir <dir>
//! speak     <py> -m piper -m <voice> --data-dir <dir> --volume <v>
//!                [--length-scale <s>] [--use-npu] -f <tmp.wav> -- <text>
//! ```
//!
//! The synthesised WAV is read into memory and deleted before it is played.

pub mod engine;
pub mod runtime;
pub mod synthesis;

pub use engine::{ProcessEngine, ProcessOptions};
pub use runtime::{
    detect_interpreter, parse_voice_listing, voice_downloaded, voice_language, HelperRuntime,
    FALLBACK_VOICES, PYTHON_CANDIDATES,
};
pub use synthesis::{AudioArtifact, SynthesisInvocation};
