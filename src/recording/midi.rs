// Standard MIDI file encoding and decoding using midly

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use midly::live::LiveEvent;
use midly::num::{u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::error::CaptureError;

/// Largest delta a track event can hold (28-bit VLQ)
const MAX_DELTA_TICKS: u64 = 0x0FFF_FFFF;

/// Captured MIDI message with the time elapsed since the previous one
#[derive(Debug, Clone, PartialEq)]
pub struct MidiEvent {
    pub delta: Duration,
    pub data: Vec<u8>,
}

/// Writes captured events as SMF format 0 with a single track.
#[derive(Debug, Clone)]
pub struct MidiFileWriter {
    ticks_per_quarter: u16,
}

impl MidiFileWriter {
    /// MIDI timing: 480 ticks per quarter note at 120 BPM (500000 us per beat)
    pub const TICKS_PER_QUARTER: u16 = 480;
    pub const US_PER_QUARTER: u32 = 500_000;

    pub fn new(ticks_per_quarter: u16) -> Self {
        // u15 range, and zero would make every delta collapse
        let ticks_per_quarter = ticks_per_quarter.clamp(1, 0x7FFF);
        Self { ticks_per_quarter }
    }

    fn ticks_per_us(&self) -> f64 {
        self.ticks_per_quarter as f64 / Self::US_PER_QUARTER as f64
    }

    /// Encode events into SMF bytes.
    pub fn encode(&self, events: &[MidiEvent]) -> Result<Vec<u8>, CaptureError> {
        let header = Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(self.ticks_per_quarter)),
        );
        let mut smf = Smf::new(header);

        let mut track = Vec::with_capacity(events.len() + 2);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(Self::US_PER_QUARTER))),
        });

        // Ticks come from the running total so per-event rounding never accumulates
        let ticks_per_us = self.ticks_per_us();
        let mut elapsed_us: u128 = 0;
        let mut last_tick: u64 = 0;
        let mut pending_ticks: u64 = 0;
        let mut skipped = 0usize;

        for event in events {
            elapsed_us += event.delta.as_micros();
            let tick = (elapsed_us as f64 * ticks_per_us).round() as u64;
            pending_ticks += tick.saturating_sub(last_tick);
            last_tick = tick;

            let Some(kind) = track_event_kind(&event.data) else {
                skipped += 1;
                continue;
            };

            track.push(TrackEvent {
                delta: u28::new(pending_ticks.min(MAX_DELTA_TICKS) as u32),
                kind,
            });
            pending_ticks = 0;
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);

        if skipped > 0 {
            log::debug!("Skipped {} non-channel MIDI messages", skipped);
        }

        let mut bytes = Vec::new();
        smf.write_std(&mut bytes)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Encode and persist. The bytes land in a `.part` file first and are
    /// renamed into place, so a listing never shows a half-written recording.
    pub fn write(&self, events: &[MidiEvent], path: &Path) -> Result<(), CaptureError> {
        let bytes = self.encode(events)?;

        let mut part_path = path.as_os_str().to_owned();
        part_path.push(".part");
        let part_path = PathBuf::from(part_path);

        if let Err(source) = write_and_rename(&bytes, &part_path, path) {
            // Only complete recordings may remain in the directory
            if part_path.exists() {
                if let Err(e) = std::fs::remove_file(&part_path) {
                    log::warn!("Could not remove {}: {}", part_path.display(), e);
                }
            }
            return Err(CaptureError::Write {
                path: path.to_path_buf(),
                source,
            });
        }

        Ok(())
    }
}

fn write_and_rename(bytes: &[u8], part_path: &Path, path: &Path) -> std::io::Result<()> {
    {
        let mut file = std::fs::File::create(part_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(part_path, path)
}

impl Default for MidiFileWriter {
    fn default() -> Self {
        Self::new(Self::TICKS_PER_QUARTER)
    }
}

/// Map raw bytes from the driver onto a track event.
/// System real-time and common messages (other than SysEx) are not stored.
fn track_event_kind(data: &[u8]) -> Option<TrackEventKind<'_>> {
    if data.first() == Some(&0xF0) {
        // SMF SysEx payload omits the leading F0 but keeps the trailing F7
        return Some(TrackEventKind::SysEx(&data[1..]));
    }

    match LiveEvent::parse(data) {
        Ok(LiveEvent::Midi { channel, message }) => Some(TrackEventKind::Midi { channel, message }),
        Ok(_) => None,
        Err(e) => {
            log::debug!("Ignoring malformed MIDI message {:02X?}: {}", data, e);
            None
        }
    }
}

/// Decoded event from a recording on disk
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Seconds since the previous stored event
    pub delta_secs: f64,
    pub data: Vec<u8>,
}

/// Parse a recording back into its channel and SysEx events, with deltas in
/// seconds resolved through the file's tempo map.
pub fn read_midi_file(path: &Path) -> anyhow::Result<Vec<RecordedEvent>> {
    let data = std::fs::read(path)?;
    let smf = Smf::parse(&data)
        .map_err(|e| anyhow::anyhow!("Failed to parse MIDI: {}", e))?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int().max(1) as f64,
        Timing::Timecode(..) => return Err(anyhow::anyhow!("SMPTE timing is not supported")),
    };

    let mut events = Vec::new();
    for track in &smf.tracks {
        let mut usec_per_beat = MidiFileWriter::US_PER_QUARTER as f64;
        let mut pending_secs = 0.0;

        for event in track {
            let beats = event.delta.as_int() as f64 / ticks_per_beat;
            pending_secs += beats * usec_per_beat / 1_000_000.0;

            let bytes = match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let mut bytes = Vec::with_capacity(3);
                    LiveEvent::Midi { channel, message }.write_std(&mut bytes)?;
                    bytes
                }
                TrackEventKind::SysEx(payload) => {
                    let mut bytes = Vec::with_capacity(payload.len() + 1);
                    bytes.push(0xF0);
                    bytes.extend_from_slice(payload);
                    bytes
                }
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => {
                    usec_per_beat = t.as_int() as f64;
                    continue;
                }
                _ => continue,
            };

            events.push(RecordedEvent {
                delta_secs: pending_secs,
                data: bytes,
            });
            pending_secs = 0.0;
        }
    }

    Ok(events)
}

/// Count NoteOn events with velocity > 0 in a MIDI file.
pub fn count_note_ons(path: &Path) -> anyhow::Result<usize> {
    let data = std::fs::read(path)?;
    let smf = Smf::parse(&data)
        .map_err(|e| anyhow::anyhow!("Failed to parse MIDI: {}", e))?;

    let count = smf
        .tracks
        .iter()
        .flatten()
        .filter(|event| {
            matches!(
                event.kind,
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { vel, .. },
                    ..
                } if vel.as_int() > 0
            )
        })
        .count();

    Ok(count)
}
