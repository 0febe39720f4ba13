// Error types for MIDI capture

use std::path::PathBuf;

/// Error type for capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No MIDI input device found")]
    DeviceUnavailable,

    #[error("MIDI device '{device}' could not be opened: {reason}")]
    DeviceBusy { device: String, reason: String },

    #[error("MIDI backend error: {0}")]
    Backend(String),

    #[error("Failed to write recording {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("MIDI encoding error: {0}")]
    Encode(String),

    #[error("Capture task failed: {0}")]
    TaskFailed(String),
}

impl From<midir::InitError> for CaptureError {
    fn from(e: midir::InitError) -> Self {
        CaptureError::Backend(e.to_string())
    }
}
