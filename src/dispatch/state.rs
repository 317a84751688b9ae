//! Dispatch-loop state shared with the front-end.
//!
//! [`DispatchStatus`] is the single source of truth for what the operator
//! sees: listen state, the timestamped status log, the last spoken fragment
//! and the current settings line.  [`SharedStatus`] is
//! `Arc<Mutex<DispatchStatus>>`; only the dispatch loop writes to it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

// ---------------------------------------------------------------------------
// ListenState
// ---------------------------------------------------------------------------

/// ```text
/// Stopped ──start()──▶ Listening ──stop()──▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenState {
    #[default]
    Stopped,
    Listening,
}

impl ListenState {
    pub fn is_listening(&self) -> bool {
        matches!(self, ListenState::Listening)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ListenState::Stopped => "Stopped",
            ListenState::Listening => "Listening",
        }
    }
}

// ---------------------------------------------------------------------------
// Status log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warn,
}

/// One line of the status log.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub at: DateTime<Local>,
    pub level: StatusLevel,
    pub message: String,
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Bounded, newest-last log of operator-facing messages.  Every entry is
/// mirrored to the `log` facade.
#[derive(Debug, Clone)]
pub struct StatusLog {
    entries: VecDeque<StatusEntry>,
    capacity: usize,
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(StatusLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(StatusLevel::Warn, message.into());
    }

    fn push(&mut self, level: StatusLevel, message: String) {
        match level {
            StatusLevel::Info => log::info!("status: {message}"),
            StatusLevel::Warn => log::warn!("status: {message}"),
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(StatusEntry {
            at: Local::now(),
            level,
            message,
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&StatusEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).map(|e| e.to_string()).collect()
    }
}

// ---------------------------------------------------------------------------
// DispatchStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DispatchStatus {
    pub listen: ListenState,
    pub log: StatusLog,
    /// Most recently dispatched fragment.
    pub last_spoken: Option<String>,
    /// Number of fragments handed to an engine since launch.
    pub speak_count: u64,
    /// `voice: … | speed: …x | volume: …%`.
    pub settings_line: String,
}

impl DispatchStatus {
    pub fn new(capacity: usize) -> Self {
        Self {
            listen: ListenState::Stopped,
            log: StatusLog::new(capacity),
            last_spoken: None,
            speak_count: 0,
            settings_line: String::new(),
        }
    }
}

pub type SharedStatus = Arc<Mutex<DispatchStatus>>;

pub fn new_shared_status(capacity: usize) -> SharedStatus {
    Arc::new(Mutex::new(DispatchStatus::new(capacity)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
