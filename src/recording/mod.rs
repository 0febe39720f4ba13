// Recording modules

pub mod capture;
pub mod controller;
pub mod midi;

pub use capture::{CaptureOptions, CaptureSession};
pub use controller::{SessionController, StartOutcome, StopOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current recording state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// Ready to record
    Idle,
    /// Currently recording
    Recording,
}

/// Recording state reported to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingState {
    pub status: RecordingStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// File name of the most recent successful recording
    pub last_recording: Option<String>,
    /// Why the most recent session failed, if it did
    pub last_error: Option<String>,
}

impl RecordingState {
    pub fn is_recording(&self) -> bool {
        self.status == RecordingStatus::Recording
    }
}
