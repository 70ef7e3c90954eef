/// MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};
use thiserror::Error;

use crate::sequencer::playback::PlaybackEvent;

const CLIENT_NAME: &str = "STEPSQNC MIDI Output";

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to create MIDI output: {0}")]
    Init(#[from] midir::InitError),

    #[error("no MIDI port at index {0}")]
    InvalidPort(usize),

    #[error("no MIDI port named '{0}'")]
    UnknownPort(String),

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send: {0}")]
    Send(#[from] midir::SendError),
}

/// Status byte plus data bytes for a playback event, `None` for events
/// that carry no MIDI message.
pub fn encode_event(channel: u8, event: &PlaybackEvent) -> Option<Vec<u8>> {
    let channel = channel & 0x0f;
    match *event {
        PlaybackEvent::NoteOn(note, velocity) => {
            Some(vec![0x90 | channel, note & 0x7f, velocity & 0x7f])
        }
        PlaybackEvent::NoteOff(note) => Some(vec![0x80 | channel, note & 0x7f, 0]),
        PlaybackEvent::ControlChange(controller, value) => {
            Some(vec![0xb0 | channel, controller & 0x7f, value & 0x7f])
        }
        PlaybackEvent::PitchBend(value) => {
            let value = value.min(0x3fff);
            Some(vec![0xe0 | channel, (value & 0x7f) as u8, (value >> 7) as u8])
        }
        PlaybackEvent::StepAdvanced(_) => None,
    }
}

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    channel: u8,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            channel: 0,
        }
    }

    pub fn available_ports() -> Vec<String> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(e) => {
                log::warn!("cannot list MIDI ports: {}", e);
                vec![]
            }
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or(MidiError::InvalidPort(port_index))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "stepsqnc")
            .map_err(|e| MidiError::Connect(e.to_string()))?;

        log::info!("connected to MIDI port '{}'", name);
        self.connection = Some(connection);
        Ok(())
    }

    /// Connects to the first port whose name contains `name`.
    pub fn connect_by_name(&mut self, name: &str) -> Result<usize, MidiError> {
        let index = Self::available_ports()
            .iter()
            .position(|p| p.contains(name))
            .ok_or_else(|| MidiError::UnknownPort(name.to_string()))?;
        self.connect(index)?;
        Ok(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel & 0x0f;
    }

    /// Sends a playback event. A no-op while disconnected.
    pub fn send_event(&mut self, event: &PlaybackEvent) -> Result<(), MidiError> {
        let Some(message) = encode_event(self.channel, event) else {
            return Ok(());
        };
        if let Some(ref mut conn) = self.connection {
            conn.send(&message)?;
        }
        Ok(())
    }

    pub fn send_note_on(&mut self, note: u8, velocity: u8) -> Result<(), MidiError> {
        self.send_event(&PlaybackEvent::NoteOn(note, velocity))
    }

    pub fn send_note_off(&mut self, note: u8) -> Result<(), MidiError> {
        self.send_event(&PlaybackEvent::NoteOff(note))
    }

    pub fn send_control_change(&mut self, controller: u8, value: u8) -> Result<(), MidiError> {
        self.send_event(&PlaybackEvent::ControlChange(controller, value))
    }

    pub fn send_pitch_bend(&mut self, value: u16) -> Result<(), MidiError> {
        self.send_event(&PlaybackEvent::PitchBend(value))
    }

    /// CC 123 on the current channel.
    pub fn all_notes_off(&mut self) -> Result<(), MidiError> {
        self.send_control_change(123, 0)
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}
