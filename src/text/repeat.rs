//! Repeat-suppression memory owned by the dispatch loop.
//!
//! Only dispatched fragments are recorded; rejected text leaves it untouched.

/// Payload and normalized text of the last dispatched fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepeatMemory {
    last_raw: Option<String>,
    last_spoken_normalized: Option<String>,
}

impl RepeatMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when `normalized` matches the last spoken fragment, ignoring case.
    pub fn is_repeat(&self, normalized: &str) -> bool {
        self.last_spoken_normalized
            .as_deref()
            .is_some_and(|last| last.eq_ignore_ascii_case(normalized))
    }

    /// Record the payload a spoken fragment came from.
    pub fn observe(&mut self, raw: &str) {
        self.last_raw = Some(raw.to_owned());
    }

    /// Record a fragment that is about to be spoken.
    pub fn record_spoken(&mut self, normalized: &str) {
        self.last_spoken_normalized = Some(normalized.to_owned());
    }

    pub fn last_raw(&self) -> Option<&str> {
        self.last_raw.as_deref()
    }

    pub fn last_spoken(&self) -> Option<&str> {
        self.last_spoken_normalized.as_deref()
    }

    pub fn reset(&mut self) {
        self.last_raw = None;
        self.last_spoken_normalized = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_memory_repeats_nothing() {
        let m = RepeatMemory::new();
        assert!(m.last_raw().is_none());
        assert!(!m.is_repeat("hello"));
    }

    #[test]
    fn repeat_check_ignores_case() {
        let mut m = RepeatMemory::new();
        m.record_spoken("Hello World");
        assert!(m.is_repeat("hello world"));
        assert!(m.is_repeat("HELLO WORLD"));
        assert!(!m.is_repeat("hello"));
    }

    #[test]
    fn observe_keeps_payload_verbatim() {
        let mut m = RepeatMemory::new();
        m.observe("Hello, world!");
        m.record_spoken("Hello world");
        assert_eq!(m.last_raw(), Some("Hello, world!"));
        assert_eq!(m.last_spoken(), Some("Hello world"));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut m = RepeatMemory::new();
        m.observe("a");
        m.record_spoken("a");
        m.reset();
        assert_eq!(m, RepeatMemory::default());
        assert!(m.last_raw().is_none());
        assert!(m.last_spoken().is_none());
    }
}
