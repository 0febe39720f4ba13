// Recording file metadata structures

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix and extension shared by every recording file name
pub const RECORDING_PREFIX: &str = "recording_";
pub const RECORDING_EXTENSION: &str = "mid";

/// Timestamp layout embedded in file names. Lexicographic order matches time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// A finished recording on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFile {
    pub filename: String,

    #[serde(skip)]
    pub path: PathBuf,

    pub size_bytes: u64,

    /// Parsed from the file name; None for files named some other way
    pub recorded_at: Option<DateTime<Local>>,

    /// Note-on count, or None if the file could not be parsed
    pub note_count: Option<usize>,
}

/// Build `recording_<timestamp>.mid` for the given start time.
pub fn recording_filename(started_at: &DateTime<Local>) -> String {
    format!(
        "{}{}.{}",
        RECORDING_PREFIX,
        started_at.format(TIMESTAMP_FORMAT),
        RECORDING_EXTENSION
    )
}

/// Parse the start time back out of a recording file name.
/// Accepts the `_N` suffix added for same-second collisions.
pub fn parse_recording_timestamp(filename: &str) -> Option<DateTime<Local>> {
    let stem = filename
        .strip_prefix(RECORDING_PREFIX)?
        .strip_suffix(&format!(".{}", RECORDING_EXTENSION))?;

    // "2026-02-21_14-32-45" is 19 characters
    let stamp = stem.get(..19)?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

/// Position of a recording among those started in the same second: 1 for the
/// plain name, N for the `_N` collision suffix.
pub fn recording_take(filename: &str) -> u32 {
    filename
        .strip_prefix(RECORDING_PREFIX)
        .and_then(|rest| rest.strip_suffix(&format!(".{}", RECORDING_EXTENSION)))
        .and_then(|stem| stem.get(19..))
        .and_then(|suffix| suffix.strip_prefix('_'))
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}
