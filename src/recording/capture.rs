// MIDI capture loop - drains an input port into a recording file

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::devices::{find_device, IncomingMessage, InputStream, MidiInputProvider, Poll};
use crate::error::CaptureError;
use crate::recording::midi::{MidiEvent, MidiFileWriter};
use crate::session::RecordingStore;

/// Capture tuning
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// How long the loop waits for a message before re-checking the stop signal
    pub poll_interval: Duration,
    pub ticks_per_quarter: u16,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            ticks_per_quarter: MidiFileWriter::TICKS_PER_QUARTER,
        }
    }
}

/// One capture interval: accumulates events with relative deltas.
#[derive(Debug)]
pub struct CaptureSession {
    events: Vec<MidiEvent>,
    last_event_at: Instant,
    target_path: PathBuf,
}

impl CaptureSession {
    pub fn new(target_path: PathBuf, started_at: Instant) -> Self {
        Self {
            events: Vec::new(),
            last_event_at: started_at,
            target_path,
        }
    }

    /// Append a message, timed against the previous one (or the session start).
    pub fn push(&mut self, msg: IncomingMessage) {
        // Saturates so an out-of-order clock still yields non-negative deltas
        let delta = msg.received_at.saturating_duration_since(self.last_event_at);
        self.last_event_at = self.last_event_at.max(msg.received_at);
        self.events.push(MidiEvent {
            delta,
            data: msg.data,
        });
    }

    #[cfg(test)]
    fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Serialize and write the session, consuming it.
    pub fn finish(self, writer: &MidiFileWriter) -> Result<PathBuf, CaptureError> {
        writer.write(&self.events, &self.target_path)?;
        Ok(self.target_path)
    }
}

/// Receive from `stream` until `should_stop` reports true or the port closes,
/// then write the recording to `target_path`.
///
/// A message that arrives once stop has been requested is dropped, not
/// recorded. The port is released when `stream` is dropped on return.
pub fn run(
    stream: InputStream,
    target_path: PathBuf,
    should_stop: &dyn Fn() -> bool,
    options: &CaptureOptions,
) -> Result<PathBuf, CaptureError> {
    let device_name = stream.device().name.clone();
    let mut session = CaptureSession::new(target_path, Instant::now());

    log::info!("Recording MIDI from {}...", device_name);

    loop {
        match stream.poll(options.poll_interval) {
            Poll::Message(msg) => {
                if should_stop() {
                    log::debug!("Dropping message {:02X?} received after stop", msg.data);
                    break;
                }
                session.push(msg);
            }
            Poll::Idle => {
                if should_stop() {
                    break;
                }
            }
            Poll::Closed => {
                log::warn!("MIDI input {} closed, ending capture", device_name);
                break;
            }
        }
    }

    drop(stream);

    let event_count = session.event_count();
    let path = session.finish(&MidiFileWriter::new(options.ticks_per_quarter))?;
    log::info!("MIDI recording saved as {} ({} events)", path.display(), event_count);

    Ok(path)
}

/// Full background job: locate a device, open it, capture until stopped.
pub fn record(
    provider: &dyn MidiInputProvider,
    store: &RecordingStore,
    should_stop: &dyn Fn() -> bool,
    options: &CaptureOptions,
) -> Result<PathBuf, CaptureError> {
    let device = find_device(provider).ok_or_else(|| {
        log::warn!("No MIDI device found!");
        CaptureError::DeviceUnavailable
    })?;

    log::info!("Using MIDI input {} ({})", device.name, device.id);

    let stream = provider.open(&device)?;

    // Named after the moment capture actually begins
    let started_at: DateTime<Local> = Local::now();
    let target_path = store.next_recording_path(&started_at);

    run(stream, target_path, should_stop, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::MidiDevice;
    use crate::recording::midi::read_midi_file;
    use crossbeam_channel::{Receiver, Sender};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn piano() -> MidiDevice {
        MidiDevice {
            id: "midi-0".into(),
            name: "Piano".into(),
        }
    }

    /// Stands in for the driver connection and records when it is released
    struct ConnectionGuard(Arc<AtomicBool>);

    impl Drop for ConnectionGuard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn guarded_stream(rx: Receiver<IncomingMessage>) -> (InputStream, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let guard = ConnectionGuard(released.clone());
        (InputStream::new(piano(), rx, Box::new(guard)), released)
    }

    fn message_at(at: Instant, data: &[u8]) -> IncomingMessage {
        IncomingMessage {
            received_at: at,
            data: data.to_vec(),
        }
    }

    fn fast_options() -> CaptureOptions {
        CaptureOptions {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[test]
    fn session_deltas_are_relative_to_previous_event() {
        let start = Instant::now();
        let mut session = CaptureSession::new(PathBuf::from("unused.mid"), start);

        session.push(message_at(start, &[0x90, 60, 100]));
        session.push(message_at(start + Duration::from_millis(500), &[0x90, 62, 100]));
        session.push(message_at(start + Duration::from_millis(1200), &[0x90, 64, 100]));

        let deltas: Vec<_> = session.events().iter().map(|e| e.delta).collect();
        assert_eq!(
            deltas,
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(700)
            ]
        );
    }

    #[test]
    fn session_deltas_never_go_negative() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut session = CaptureSession::new(PathBuf::from("unused.mid"), start);

        session.push(message_at(start + Duration::from_millis(300), &[0x90, 60, 100]));
        session.push(message_at(start + Duration::from_millis(100), &[0x80, 60, 0]));
        session.push(message_at(start + Duration::from_millis(400), &[0x90, 61, 100]));

        let deltas: Vec<_> = session.events().iter().map(|e| e.delta).collect();
        assert_eq!(
            deltas,
            vec![
                Duration::from_millis(300),
                Duration::ZERO,
                Duration::from_millis(100)
            ]
        );
    }

    #[test]
    fn stop_on_idle_port_finishes_within_poll_interval() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = crossbeam_channel::unbounded();
        let (stream, released) = guarded_stream(rx);
        let stop = AtomicBool::new(true);

        let started = Instant::now();
        let path = run(
            stream,
            dir.path().join("idle.mid"),
            &|| stop.load(Ordering::SeqCst),
            &fast_options(),
        )
        .unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(released.load(Ordering::SeqCst));
        assert!(path.exists());
        assert!(read_midi_file(&path).unwrap().is_empty());
    }

    #[test]
    fn message_received_after_stop_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded::<IncomingMessage>();
        let stream = InputStream::new(piano(), rx, Box::new(()));
        let stop = Arc::new(AtomicBool::new(false));

        // Stop flips the moment the third message is pulled off the channel
        let seen = Arc::new(Mutex::new(0usize));
        let send = |tx: &Sender<IncomingMessage>, note: u8| {
            tx.send(IncomingMessage::now(&[0x90, note, 100])).unwrap();
        };
        send(&tx, 60);
        send(&tx, 62);
        send(&tx, 64);

        let should_stop = {
            let seen = seen.clone();
            let stop = stop.clone();
            move || {
                let mut seen = seen.lock();
                *seen += 1;
                if *seen == 3 {
                    stop.store(true, Ordering::SeqCst);
                }
                stop.load(Ordering::SeqCst)
            }
        };

        let path = run(stream, dir.path().join("drop.mid"), &should_stop, &fast_options()).unwrap();
        let events = read_midi_file(&path).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, vec![0x90, 60, 100]);
        assert_eq!(events[1].data, vec![0x90, 62, 100]);
    }

    #[test]
    fn closed_port_saves_what_was_captured() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let (stream, released) = guarded_stream(rx);

        tx.send(IncomingMessage::now(&[0x90, 60, 100])).unwrap();
        tx.send(IncomingMessage::now(&[0x80, 60, 0])).unwrap();
        drop(tx);

        let path = run(stream, dir.path().join("closed.mid"), &|| false, &fast_options()).unwrap();

        assert!(released.load(Ordering::SeqCst));
        assert_eq!(read_midi_file(&path).unwrap().len(), 2);
    }

    #[test]
    fn write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = crossbeam_channel::unbounded();
        let (stream, released) = guarded_stream(rx);
        let target = dir.path().join("missing").join("take.mid");

        let result = run(stream, target, &|| true, &fast_options());

        assert!(matches!(result, Err(CaptureError::Write { .. })));
        assert!(released.load(Ordering::SeqCst));
    }

    struct NoDevices;

    impl MidiInputProvider for NoDevices {
        fn list_inputs(&self) -> Vec<MidiDevice> {
            Vec::new()
        }

        fn open(&self, _device: &MidiDevice) -> Result<InputStream, CaptureError> {
            Err(CaptureError::DeviceUnavailable)
        }
    }

    #[test]
    fn record_without_device_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::open(dir.path()).unwrap();

        let result = record(&NoDevices, &store, &|| false, &fast_options());

        assert!(matches!(result, Err(CaptureError::DeviceUnavailable)));
        assert!(store.list().unwrap().is_empty());
    }
}
