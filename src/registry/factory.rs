//! Construction seam for engines and the control surface the switcher
//! disables while a hand-off is in progress.

use std::sync::Arc;

use crate::config::ProcessConfig;
use crate::engine::{
    AudioSink, EngineKind, NativeEngine, ProcessEngine, ProcessOptions, RodioSink, SpeechEngine,
};

/// Builds a fresh engine of the requested kind.
pub trait EngineFactory: Send + Sync {
    fn create(&self, kind: EngineKind) -> Arc<dyn SpeechEngine>;
}

/// Whatever front-end exposes engine controls.
pub trait ControlSurface: Send + Sync {
    fn set_controls_enabled(&self, enabled: bool);
}

/// Control surface for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoControls;

impl ControlSurface for NoControls {
    fn set_controls_enabled(&self, enabled: bool) {
        log::debug!("registry: controls {}", if enabled { "enabled" } else { "disabled" });
    }
}

/// Production factory: `tts` for native voices, Piper plus `rodio` for the
/// external-process variant.
pub struct DefaultEngineFactory {
    process: ProcessOptions,
    sink: Arc<dyn AudioSink>,
}

impl DefaultEngineFactory {
    pub fn new(process: &ProcessConfig) -> Self {
        Self {
            process: ProcessOptions::from_config(process),
            sink: Arc::new(RodioSink::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl EngineFactory for DefaultEngineFactory {
    fn create(&self, kind: EngineKind) -> Arc<dyn SpeechEngine> {
        log::info!("registry: constructing {kind}");
        match kind {
            EngineKind::Native => Arc::new(NativeEngine::new()),
            EngineKind::Process => Arc::new(ProcessEngine::new(
                self.process.clone(),
                Arc::clone(&self.sink),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_requested_process_kind() {
        let factory = DefaultEngineFactory::new(&ProcessConfig::default());
        let engine = factory.create(EngineKind::Process);
        assert_eq!(engine.kind(), EngineKind::Process);
        assert_eq!(engine.name(), "Piper TTS");
        assert_eq!(engine.settings().voice, "en_US-lessac-medium");
    }

    #[test]
    fn factory_and_controls_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DefaultEngineFactory>();
        assert_send_sync::<NoControls>();
    }
}
