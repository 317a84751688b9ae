//! Engine registry and switcher.
//!
//! Exactly one engine is live at a time.  Switching retires the old engine
//! before the new one is constructed, so two engines never hold the audio
//! device together.

pub mod factory;
pub mod switcher;

pub use factory::{ControlSurface, DefaultEngineFactory, EngineFactory, NoControls};
pub use switcher::{EngineRegistry, SwitchError, SwitchOutcome, SwitchState};
