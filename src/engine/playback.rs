//! In-memory WAV playback via `rodio`.
//!
//! [`AudioSink::play`] blocks until the clip has finished (or was stopped),
//! so callers run it on `tokio::task::spawn_blocking`.
//!
//! Opening the output device takes a while.  A `stop` issued in that window
//! has no clip to reach, so `play` asks the caller whether the clip is still
//! wanted before it becomes audible.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use rodio::{Decoder, OutputStream, Sink};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    #[error("no audio output device: {0}")]
    OutputStream(String),

    #[error("could not decode audio: {0}")]
    Decode(String),
}

/// Blocking audio output used by the external-process engine.
pub trait AudioSink: Send + Sync {
    /// Play a complete WAV file held in memory.  Returns once playback ends.
    ///
    /// `still_wanted` is checked while holding the same lock `stop` takes,
    /// right before the clip is registered.  A clip that is no longer wanted
    /// is dropped silently.
    fn play(&self, wav: Vec<u8>, still_wanted: &dyn Fn() -> bool) -> Result<(), PlaybackError>;

    /// Interrupt the clip currently playing, if any.
    fn stop(&self);
}

// ---------------------------------------------------------------------------
// RodioSink
// ---------------------------------------------------------------------------

/// Default output device sink.
///
/// The `OutputStream` is opened per clip on the playing thread because it is
/// not `Send`; only the `Sink` handle is shared so [`AudioSink::stop`] can
/// reach it from another thread.
#[derive(Default)]
pub struct RodioSink {
    current: Mutex<Option<Arc<Sink>>>,
}

impl RodioSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for RodioSink {
    fn play(&self, wav: Vec<u8>, still_wanted: &dyn Fn() -> bool) -> Result<(), PlaybackError> {
        if !still_wanted() {
            return Ok(());
        }
        let (_stream, handle) =
            OutputStream::try_default().map_err(|e| PlaybackError::OutputStream(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| PlaybackError::OutputStream(e.to_string()))?;
        let source = Decoder::new(Cursor::new(wav)).map_err(|e| PlaybackError::Decode(e.to_string()))?;
        let sink = Arc::new(sink);

        {
            let mut current = self
                .current
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !still_wanted() {
                log::debug!("playback: clip superseded while the device opened");
                return Ok(());
            }
            sink.append(source);
            *current = Some(Arc::clone(&sink));
        }

        log::debug!("playback: clip started");
        sink.sleep_until_end();

        if let Ok(mut current) = self.current.lock() {
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &sink)) {
                *current = None;
            }
        }
        Ok(())
    }

    fn stop(&self) {
        let sink = self.current.lock().ok().and_then(|mut c| c.take());
        if let Some(sink) = sink {
            log::debug!("playback: stopping clip");
            sink.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_without_clip_is_a_no_op() {
        let sink = RodioSink::new();
        sink.stop();
        sink.stop();
    }

    #[test]
    fn unwanted_clip_never_opens_the_device() {
        let sink = RodioSink::new();
        assert!(sink.play(b"not a wav".to_vec(), &|| false).is_ok());
        assert!(sink.current.lock().unwrap().is_none());
    }

    #[test]
    fn sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RodioSink>();
    }
}
