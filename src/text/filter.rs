//! Latin word extraction.

use std::sync::OnceLock;

use regex::Regex;

/// Words derived from one clipboard payload, in original order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpeakableFragment {
    pub words: Vec<String>,
}

impl SpeakableFragment {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words joined by a single space; the form that is spoken and compared.
    pub fn normalized(&self) -> String {
        self.words.join(" ")
    }

    /// `true` when the fragment has more words than `max_words`.
    pub fn exceeds(&self, max_words: usize) -> bool {
        self.words.len() > max_words
    }
}

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[A-Za-z]+").expect("static word pattern compiles"))
}

/// Return every maximal run of ASCII Latin letters in `raw`.
///
/// Digits, punctuation, whitespace and non-Latin scripts all act as
/// separators and never appear in the output.
pub fn extract(raw: &str) -> Vec<String> {
    word_pattern()
        .find_iter(raw)
        .map(|m| m.as_str().to_owned())
        .collect()
}

/// [`extract`] wrapped in a [`SpeakableFragment`].
pub fn fragment(raw: &str) -> SpeakableFragment {
    SpeakableFragment {
        words: extract(raw),
    }
}
