// Recording directory management - listing, naming and lookup

use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::{
    parse_recording_timestamp, recording_filename, recording_take, RecordingFile,
    RECORDING_EXTENSION,
};
use crate::recording::midi::count_note_ons;

/// Flat directory of recordings. The directory listing is the only catalog.
#[derive(Debug, Clone)]
pub struct RecordingStore {
    root: PathBuf,
}

impl RecordingStore {
    /// Open the store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a new recording started at `started_at`.
    /// Never returns the path of an existing file.
    pub fn next_recording_path(&self, started_at: &DateTime<Local>) -> PathBuf {
        let filename = recording_filename(started_at);
        let candidate = self.root.join(&filename);
        if !candidate.exists() {
            return candidate;
        }

        let stem = filename.trim_end_matches(&format!(".{}", RECORDING_EXTENSION));
        (2..)
            .map(|n| self.root.join(format!("{}_{}.{}", stem, n, RECORDING_EXTENSION)))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }

    /// All recordings, newest first. Same-second takes order by their suffix number.
    pub fn list(&self) -> anyhow::Result<Vec<RecordingFile>> {
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            let fname = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };

            if !is_recording_name(&fname) || !path.is_file() {
                continue;
            }

            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let note_count = match count_note_ons(&path) {
                Ok(n) => Some(n),
                Err(e) => {
                    log::warn!("Could not read {}: {}", fname, e);
                    None
                }
            };

            files.push(RecordingFile {
                recorded_at: parse_recording_timestamp(&fname),
                filename: fname,
                path,
                size_bytes,
                note_count,
            });
        }

        files.sort_by_cached_key(|f| {
            Reverse((f.recorded_at, recording_take(&f.filename), f.filename.clone()))
        });
        Ok(files)
    }

    /// Resolve a client-supplied file name to a recording inside the store.
    /// Anything that could escape the directory is rejected.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename.contains("..")
            || !is_recording_name(filename)
        {
            return None;
        }

        let path = self.root.join(filename);
        path.is_file().then_some(path)
    }
}

fn is_recording_name(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .map(|ext| ext == RECORDING_EXTENSION)
        .unwrap_or(false)
}
