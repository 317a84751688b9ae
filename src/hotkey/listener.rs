//! Dedicated OS-thread hotkey listener using `rdev::listen`.
//!
//! # Shutdown caveat
//!
//! `rdev::listen` has no graceful shutdown API.  Dropping the handle sets a
//! stop flag so nothing more is forwarded, but the thread stays blocked in
//! the rdev event loop until the process exits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use super::{ComboTracker, HotkeyBinding, HotkeyError, HotkeyEvent, HotkeyGate};

/// Handle to a running hotkey listener thread.
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    /// Never joined; `rdev::listen` does not return.
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Spawn the listener thread.
    ///
    /// Each completed `binding` is forwarded as [`HotkeyEvent::CopyPressed`]
    /// while `gate` is armed.  `try_send` is used so a busy dispatch loop
    /// drops surplus pulses instead of stalling the OS hook.
    pub fn start(
        binding: HotkeyBinding,
        gate: HotkeyGate,
        tx: mpsc::Sender<HotkeyEvent>,
    ) -> Result<Self, HotkeyError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut tracker = ComboTracker::new(binding);
                let result = rdev::listen(move |event| {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    if tracker.handle(&event.event_type) && gate.is_armed() {
                        if let Err(e) = tx.try_send(HotkeyEvent::CopyPressed) {
                            log::debug!("hotkey-listener: pulse dropped ({e})");
                        }
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {:?}", e);
                }
            })?;

        log::info!(
            "hotkey-listener: watching {:?}+{:?}",
            binding.modifier,
            binding.key
        );
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
