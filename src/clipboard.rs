//! Clipboard source polled by the dispatch loop.
//!
//! [`SystemClipboard`] creates a short-lived [`arboard::Clipboard`] handle on
//! every read; `arboard::Clipboard` is not `Send` on all platforms, so it is
//! never stored across calls.

use arboard::Clipboard;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClipboardError {
    /// The OS clipboard could not be opened.
    #[error("clipboard unavailable: {0}")]
    Access(String),

    /// The clipboard was opened but reading failed.
    #[error("clipboard read failed: {0}")]
    Read(String),
}

/// Anything that can hand the dispatch loop the current clipboard text.
///
/// Called from `spawn_blocking`, so implementations may block.
pub trait ClipboardSource: Send + Sync {
    /// Current plain-text content; `""` when empty or non-text.
    fn read_text(&self) -> Result<String, ClipboardError>;
}

/// The real system clipboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardSource for SystemClipboard {
    fn read_text(&self) -> Result<String, ClipboardError> {
        let mut clipboard =
            Clipboard::new().map_err(|e| ClipboardError::Access(e.to_string()))?;
        match clipboard.get_text() {
            Ok(text) => Ok(text),
            // Images and an empty clipboard both land here.
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(ClipboardError::Read(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedClipboard (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use scripted::ScriptedClipboard;

#[cfg(test)]
mod scripted {
    use std::sync::Mutex;

    use super::*;

    /// In-memory clipboard whose content and failure mode tests control.
    pub struct ScriptedClipboard {
        content: Mutex<Result<String, ClipboardError>>,
    }

    impl ScriptedClipboard {
        pub fn new(text: &str) -> Self {
            Self {
                content: Mutex::new(Ok(text.to_owned())),
            }
        }

        pub fn set(&self, text: &str) {
            *self.content.lock().unwrap() = Ok(text.to_owned());
        }

        pub fn fail(&self, message: &str) {
            *self.content.lock().unwrap() = Err(ClipboardError::Read(message.to_owned()));
        }
    }

    impl ClipboardSource for ScriptedClipboard {
        fn read_text(&self) -> Result<String, ClipboardError> {
            self.content.lock().unwrap().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_clipboard_returns_content_then_error() {
        let clip = ScriptedClipboard::new("hello");
        assert_eq!(clip.read_text().unwrap(), "hello");

        clip.fail("locked");
        let err = clip.read_text().unwrap_err();
        assert!(err.to_string().contains("locked"));

        clip.set("again");
        assert_eq!(clip.read_text().unwrap(), "again");
    }

    #[test]
    fn errors_name_the_failure() {
        let err = ClipboardError::Access("no display".into());
        assert_eq!(err.to_string(), "clipboard unavailable: no display");
    }

    #[test]
    fn sources_are_object_safe() {
        let clip: Box<dyn ClipboardSource> = Box::new(ScriptedClipboard::new(""));
        assert_eq!(clip.read_text().unwrap(), "");
    }
}
