/// Preview tone using cpal
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex, PoisonError};

/// Semitones covered by a full pitch bend in either direction
const BEND_RANGE_SEMITONES: f32 = 2.0;
const MAX_AMPLITUDE: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Voice {
    frequency: Option<f32>,
    amplitude: f32,
    bend_ratio: f32,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            frequency: None,
            amplitude: 0.0,
            bend_ratio: 1.0,
        }
    }
}

pub struct AudioOutput {
    _stream: Option<cpal::Stream>,
    voice: Arc<Mutex<Voice>>,
}

impl AudioOutput {
    pub fn new() -> Option<Self> {
        let voice = Arc::new(Mutex::new(Voice::default()));
        let stream = Self::setup_audio_stream(Arc::clone(&voice))?;

        Some(Self {
            _stream: Some(stream),
            voice,
        })
    }

    /// An output without a device; notes are tracked but never heard.
    pub fn silent() -> Self {
        Self {
            _stream: None,
            voice: Arc::new(Mutex::new(Voice::default())),
        }
    }

    fn setup_audio_stream(voice: Arc<Mutex<Voice>>) -> Option<cpal::Stream> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let mut phase = 0.0_f32;
                device.build_output_stream(
                    &config.into(),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let voice = *voice.lock().unwrap_or_else(PoisonError::into_inner);

                        for frame in data.chunks_mut(channels.max(1)) {
                            let sample = match voice.frequency {
                                Some(frequency) => {
                                    let s = (phase * 2.0 * std::f32::consts::PI).sin()
                                        * voice.amplitude;
                                    phase += frequency * voice.bend_ratio / sample_rate;
                                    if phase >= 1.0 {
                                        phase -= 1.0;
                                    }
                                    s
                                }
                                None => {
                                    phase = 0.0;
                                    0.0
                                }
                            };
                            frame.fill(sample);
                        }
                    },
                    |err| log::error!("audio stream error: {}", err),
                    None,
                )
            }
            format => {
                log::warn!("unsupported output sample format {:?}", format);
                return None;
            }
        };

        match stream {
            Ok(stream) => {
                if let Err(e) = stream.play() {
                    log::warn!("could not start audio stream: {}", e);
                }
                Some(stream)
            }
            Err(e) => {
                log::warn!("could not open audio stream: {}", e);
                None
            }
        }
    }

    pub fn is_audible(&self) -> bool {
        self._stream.is_some()
    }

    pub fn trigger_note(&mut self, note: u8, velocity: u8) {
        let mut voice = self.voice.lock().unwrap_or_else(PoisonError::into_inner);
        voice.frequency = Some(midi_note_to_frequency(note));
        voice.amplitude = velocity_to_amplitude(velocity);
    }

    /// Applies a 14-bit pitch bend, 8192 being no bend.
    pub fn bend(&mut self, pitch_bend: u16) {
        self.voice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bend_ratio = pitch_bend_ratio(pitch_bend);
    }

    pub fn stop_note(&mut self) {
        self.voice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frequency = None;
    }

    pub fn is_sounding(&self) -> bool {
        self.voice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frequency
            .is_some()
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new().unwrap_or_else(|| {
            log::warn!("no audio output device, preview is silent");
            Self::silent()
        })
    }
}

fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

fn velocity_to_amplitude(velocity: u8) -> f32 {
    MAX_AMPLITUDE * velocity.min(127) as f32 / 127.0
}

fn pitch_bend_ratio(pitch_bend: u16) -> f32 {
    let offset = (pitch_bend.min(16383) as f32 - 8192.0) / 8192.0;
    2.0_f32.powf(offset * BEND_RANGE_SEMITONES / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_frequency() {
        assert!((midi_note_to_frequency(69) - 440.0).abs() < 1e-3);
        assert!((midi_note_to_frequency(81) - 880.0).abs() < 1e-2);
    }

    #[test]
    fn test_velocity_amplitude() {
        assert_eq!(velocity_to_amplitude(0), 0.0);
        assert!((velocity_to_amplitude(127) - MAX_AMPLITUDE).abs() < 1e-6);
    }

    #[test]
    fn test_pitch_bend_ratio() {
        assert_eq!(pitch_bend_ratio(8192), 1.0);
        let down = pitch_bend_ratio(0);
        assert!((down - 2.0_f32.powf(-2.0 / 12.0)).abs() < 1e-6);
        assert!(pitch_bend_ratio(16383) > 1.12);
    }

    #[test]
    fn test_silent_output_tracks_voice() {
        let mut out = AudioOutput::silent();
        assert!(!out.is_audible());
        out.trigger_note(60, 100);
        assert!(out.is_sounding());
        out.stop_note();
        assert!(!out.is_sounding());
    }
}
