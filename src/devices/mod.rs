// Device discovery and enumeration

pub mod enumeration;

pub use enumeration::*;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::CaptureError;

/// Represents a MIDI input device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MidiDevice {
    pub id: String,
    pub name: String,
}

/// A raw MIDI message as delivered by the driver callback
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// When the callback saw the message
    pub received_at: Instant,
    pub data: Vec<u8>,
}

impl IncomingMessage {
    pub fn now(data: &[u8]) -> Self {
        Self {
            received_at: Instant::now(),
            data: data.to_vec(),
        }
    }
}

/// Result of waiting on an input stream for one poll interval
#[derive(Debug)]
pub enum Poll {
    Message(IncomingMessage),
    Idle,
    Closed,
}

/// An open input port. Dropping it closes the underlying connection.
pub struct InputStream {
    device: MidiDevice,
    receiver: Receiver<IncomingMessage>,
    _connection: Box<dyn Send>,
}

impl InputStream {
    /// Wrap a receiver together with whatever keeps the port open.
    pub fn new(
        device: MidiDevice,
        receiver: Receiver<IncomingMessage>,
        connection: Box<dyn Send>,
    ) -> Self {
        Self {
            device,
            receiver,
            _connection: connection,
        }
    }

    pub fn device(&self) -> &MidiDevice {
        &self.device
    }

    /// Wait at most `timeout` for the next message.
    pub fn poll(&self, timeout: Duration) -> Poll {
        match self.receiver.recv_timeout(timeout) {
            Ok(msg) => Poll::Message(msg),
            Err(RecvTimeoutError::Timeout) => Poll::Idle,
            Err(RecvTimeoutError::Disconnected) => Poll::Closed,
        }
    }
}

/// Access to the host MIDI subsystem.
///
/// The capture loop only talks to this trait, so it can run against real
/// hardware ([`MidirProvider`]) or a scripted source.
pub trait MidiInputProvider: Send + Sync {
    /// Available input ports, in host enumeration order.
    fn list_inputs(&self) -> Vec<MidiDevice>;

    /// Open an exclusive connection to `device`.
    fn open(&self, device: &MidiDevice) -> Result<InputStream, CaptureError>;
}

/// Pick the first available input device.
///
/// Enumeration order is whatever the host reports and may change between calls.
pub fn find_device(provider: &dyn MidiInputProvider) -> Option<MidiDevice> {
    provider.list_inputs().into_iter().next()
}
