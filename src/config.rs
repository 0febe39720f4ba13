// Configuration management for midirec

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::recording::CaptureOptions;
use crate::recording::midi::MidiFileWriter;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Path where recordings are stored
    pub storage_path: PathBuf,

    /// Address the web interface listens on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Client name registered with the host MIDI subsystem
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// How often an idle capture re-checks for a stop request
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// MIDI file resolution
    #[serde(default = "default_ticks_per_quarter")]
    pub ticks_per_quarter: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: get_default_storage_path(),
            bind_address: default_bind_address(),
            client_name: default_client_name(),
            poll_interval_ms: default_poll_interval_ms(),
            ticks_per_quarter: default_ticks_per_quarter(),
        }
    }
}

impl Config {
    /// Load config from disk or return default
    pub fn load_or_default(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(contents) => {
                    match toml::from_str(&contents) {
                        Ok(config) => return config,
                        Err(e) => {
                            log::warn!("Failed to parse config: {}", e);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Save config to disk
    pub fn save(&self, config_path: &Path) -> anyhow::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(config_path, contents)?;

        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            // Zero would turn the idle wait into a busy loop
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            ticks_per_quarter: self.ticks_per_quarter,
        }
    }
}

/// Get the default storage path for recordings
fn get_default_storage_path() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("midi_recordings")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("midirec")
        .join("config.toml")
}

fn default_bind_address() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_client_name() -> String {
    "midirec".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_ticks_per_quarter() -> u16 {
    MidiFileWriter::TICKS_PER_QUARTER
}
