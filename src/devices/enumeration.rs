// Device enumeration implementations

use super::{IncomingMessage, InputStream, MidiDevice, MidiInputProvider};
use crate::error::CaptureError;
use midir::{Ignore, MidiInput};

/// Enumerate all available MIDI input devices
pub fn enumerate_midi_devices(client_name: &str) -> Vec<MidiDevice> {
    let mut devices = Vec::new();

    if let Ok(midi_in) = MidiInput::new(&format!("{}-probe", client_name)) {
        let ports = midi_in.ports();
        for (index, port) in ports.iter().enumerate() {
            if let Ok(name) = midi_in.port_name(port) {
                devices.push(MidiDevice {
                    id: format!("midi-{}", index),
                    name,
                });
            }
        }
    }

    devices
}

/// Host MIDI subsystem backed by midir
pub struct MidirProvider {
    client_name: String,
}

impl MidirProvider {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }
}

impl MidiInputProvider for MidirProvider {
    fn list_inputs(&self) -> Vec<MidiDevice> {
        enumerate_midi_devices(&self.client_name)
    }

    fn open(&self, device: &MidiDevice) -> Result<InputStream, CaptureError> {
        let mut midi_in = MidiInput::new(&format!("{}-capture", self.client_name))?;
        // Clock and active sensing would swamp a recording
        midi_in.ignore(Ignore::TimeAndActiveSense);

        // Port indices shift when devices come and go, so match by name
        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).map(|n| n == device.name).unwrap_or(false))
            .ok_or(CaptureError::DeviceUnavailable)?;

        let (tx, rx) = crossbeam_channel::unbounded();

        let connection = midi_in
            .connect(
                &port,
                &format!("{}-input", self.client_name),
                move |_timestamp_us, data, _| {
                    // Receiver gone means the capture loop already exited
                    let _ = tx.send(IncomingMessage::now(data));
                },
                (),
            )
            .map_err(|e| CaptureError::DeviceBusy {
                device: device.name.clone(),
                reason: e.to_string(),
            })?;

        log::info!("Opened MIDI input {} ({})", device.name, device.id);

        Ok(InputStream::new(device.clone(), rx, Box::new(connection)))
    }
}
