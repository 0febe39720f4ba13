// Session controller - owns the single active capture task

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::capture::{self, CaptureOptions};
use super::{RecordingState, RecordingStatus};
use crate::devices::MidiInputProvider;
use crate::error::CaptureError;
use crate::session::RecordingStore;

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
}

/// Result of a stop request
#[derive(Debug)]
pub enum StopOutcome {
    /// Nothing was recording
    NotActive,
    /// The capture task was stopped and joined
    Finished(Result<PathBuf, CaptureError>),
}

struct ActiveSession {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<PathBuf, CaptureError>>,
    started_at: DateTime<Utc>,
}

enum SessionState {
    Idle,
    Recording(ActiveSession),
}

#[derive(Default)]
struct LastOutcome {
    recording: Option<String>,
    error: Option<String>,
}

/// Starts and stops the background capture. At most one session exists at a time.
pub struct SessionController {
    provider: Arc<dyn MidiInputProvider>,
    store: RecordingStore,
    options: CaptureOptions,
    state: tokio::sync::Mutex<SessionState>,
    last: Mutex<LastOutcome>,
}

impl SessionController {
    pub fn new(
        provider: Arc<dyn MidiInputProvider>,
        store: RecordingStore,
        options: CaptureOptions,
    ) -> Self {
        Self {
            provider,
            store,
            options,
            state: tokio::sync::Mutex::new(SessionState::Idle),
            last: Mutex::new(LastOutcome::default()),
        }
    }

    pub fn store(&self) -> &RecordingStore {
        &self.store
    }

    /// Launch a capture task unless one is already running.
    pub async fn start(&self) -> StartOutcome {
        let mut state = self.state.lock().await;
        self.reap_finished(&mut state).await;

        if let SessionState::Recording(_) = *state {
            log::info!("Start requested while already recording");
            return StartOutcome::AlreadyActive;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let provider = self.provider.clone();
        let store = self.store.clone();
        let options = self.options.clone();
        let stop_flag = stop.clone();

        let handle = tokio::task::spawn_blocking(move || {
            capture::record(
                provider.as_ref(),
                &store,
                &|| stop_flag.load(Ordering::SeqCst),
                &options,
            )
        });

        *state = SessionState::Recording(ActiveSession {
            stop,
            handle,
            started_at: Utc::now(),
        });

        log::info!("Recording session started");
        StartOutcome::Started
    }

    /// Signal the capture task and wait for it to write its file.
    /// Returns promptly when idle; otherwise within one poll interval plus the write.
    pub async fn stop(&self) -> StopOutcome {
        let mut state = self.state.lock().await;
        // A task that ended on its own is not "active"; its outcome is already recorded
        self.reap_finished(&mut state).await;

        match std::mem::replace(&mut *state, SessionState::Idle) {
            SessionState::Idle => StopOutcome::NotActive,
            SessionState::Recording(session) => {
                session.stop.store(true, Ordering::SeqCst);
                let result = join(session.handle).await;
                self.record_outcome(&result);
                StopOutcome::Finished(result)
            }
        }
    }

    /// True while a capture task is running.
    pub async fn is_active(&self) -> bool {
        let mut state = self.state.lock().await;
        self.reap_finished(&mut state).await;
        matches!(*state, SessionState::Recording(_))
    }

    /// Snapshot for the front end.
    pub async fn status(&self) -> RecordingState {
        let started_at = {
            let mut state = self.state.lock().await;
            self.reap_finished(&mut state).await;
            match &*state {
                SessionState::Recording(s) => Some(s.started_at),
                SessionState::Idle => None,
            }
        };

        let last = self.last.lock();
        RecordingState {
            status: if started_at.is_some() {
                RecordingStatus::Recording
            } else {
                RecordingStatus::Idle
            },
            started_at,
            last_recording: last.recording.clone(),
            last_error: last.error.clone(),
        }
    }

    async fn reap_finished(&self, state: &mut SessionState) {
        let finished = matches!(state, SessionState::Recording(s) if s.handle.is_finished());
        if !finished {
            return;
        }

        if let SessionState::Recording(session) = std::mem::replace(state, SessionState::Idle) {
            let result = join(session.handle).await;
            self.record_outcome(&result);
        }
    }

    fn record_outcome(&self, result: &Result<PathBuf, CaptureError>) {
        let mut last = self.last.lock();
        match result {
            Ok(path) => {
                last.recording = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string);
                last.error = None;
            }
            Err(e) => {
                log::error!("Recording failed: {}", e);
                last.error = Some(e.to_string());
            }
        }
    }
}

async fn join(handle: JoinHandle<Result<PathBuf, CaptureError>>) -> Result<PathBuf, CaptureError> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(CaptureError::TaskFailed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{IncomingMessage, InputStream, MidiDevice};
    use crate::recording::midi::read_midi_file;
    use crossbeam_channel::{Receiver, Sender};
    use std::time::Duration;

    /// Hands out one pre-wired channel; a second open finds the device busy.
    struct ScriptedProvider {
        devices: Vec<MidiDevice>,
        feed: Mutex<Option<Receiver<IncomingMessage>>>,
    }

    impl ScriptedProvider {
        fn with_device() -> (Arc<Self>, Sender<IncomingMessage>) {
            let (tx, rx) = crossbeam_channel::unbounded();
            let provider = Arc::new(Self {
                devices: vec![MidiDevice {
                    id: "midi-0".into(),
                    name: "Test Keys".into(),
                }],
                feed: Mutex::new(Some(rx)),
            });
            (provider, tx)
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                devices: Vec::new(),
                feed: Mutex::new(None),
            })
        }
    }

    impl MidiInputProvider for ScriptedProvider {
        fn list_inputs(&self) -> Vec<MidiDevice> {
            self.devices.clone()
        }

        fn open(&self, device: &MidiDevice) -> Result<InputStream, CaptureError> {
            let rx = self.feed.lock().take().ok_or_else(|| CaptureError::DeviceBusy {
                device: device.name.clone(),
                reason: "already open".into(),
            })?;
            Ok(InputStream::new(device.clone(), rx, Box::new(())))
        }
    }

    fn controller(provider: Arc<dyn MidiInputProvider>) -> (SessionController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::open(dir.path()).unwrap();
        let options = CaptureOptions {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        (SessionController::new(provider, store, options), dir)
    }

    async fn wait_until_idle(controller: &SessionController) {
        for _ in 0..200 {
            if !controller.is_active().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("controller never went idle");
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_recording() {
        let (provider, _tx) = ScriptedProvider::with_device();
        let (controller, _dir) = controller(provider);

        assert_eq!(controller.start().await, StartOutcome::Started);
        assert!(controller.is_active().await);
        assert_eq!(controller.start().await, StartOutcome::AlreadyActive);

        assert!(matches!(controller.stop().await, StopOutcome::Finished(Ok(_))));
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_no_op() {
        let (provider, _tx) = ScriptedProvider::with_device();
        let (controller, _dir) = controller(provider);

        assert!(matches!(controller.stop().await, StopOutcome::NotActive));
        assert!(matches!(controller.stop().await, StopOutcome::NotActive));
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn stop_returns_the_written_file() {
        let (provider, tx) = ScriptedProvider::with_device();
        let (controller, _dir) = controller(provider);

        controller.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(IncomingMessage::now(&[0x90, 60, 100])).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(IncomingMessage::now(&[0x80, 60, 0])).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let path = match controller.stop().await {
            StopOutcome::Finished(Ok(path)) => path,
            other => panic!("unexpected stop outcome: {:?}", other),
        };

        let events = read_midi_file(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[1].delta_secs > 0.03);

        let status = controller.status().await;
        assert_eq!(status.status, RecordingStatus::Idle);
        assert_eq!(
            status.last_recording.as_deref(),
            path.file_name().and_then(|n| n.to_str())
        );
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn missing_device_settles_back_to_idle() {
        let (controller, _dir) = controller(ScriptedProvider::empty());

        assert_eq!(controller.start().await, StartOutcome::Started);
        wait_until_idle(&controller).await;

        assert!(matches!(controller.stop().await, StopOutcome::NotActive));
        assert!(controller.store().list().unwrap().is_empty());

        let status = controller.status().await;
        assert_eq!(status.status, RecordingStatus::Idle);
        assert!(status.last_error.unwrap().contains("No MIDI input device"));
    }

    #[tokio::test]
    async fn failed_session_does_not_block_next_start() {
        let (provider, _tx) = ScriptedProvider::with_device();
        let (controller, _dir) = controller(provider);

        controller.start().await;
        controller.stop().await;

        // The scripted port was consumed, so this open reports busy and exits
        assert_eq!(controller.start().await, StartOutcome::Started);
        wait_until_idle(&controller).await;
        let status = controller.status().await;
        assert!(status.last_error.unwrap().contains("already open"));

        assert_eq!(controller.start().await, StartOutcome::Started);
    }
}
