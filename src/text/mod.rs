//! Speakable-text extraction and repeat suppression.
//!
//! [`extract`] pulls Latin-alphabet word runs out of a raw clipboard payload;
//! [`RepeatMemory`] remembers what was last observed and last spoken so the
//! dispatch loop never reads the same fragment twice in a row.

pub mod filter;
pub mod repeat;

pub use filter::{extract, fragment, SpeakableFragment};
pub use repeat::RepeatMemory;
