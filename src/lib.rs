/// STEPSQNC - step sequencer editing core
///
/// This library provides the pieces behind a step sequencer instrument:
/// - Step data with per-step pitch, velocity, modulation and pitch bend
/// - Knob mapping between normalized control positions and raw values
/// - A controller that pushes full step snapshots to an audio engine
/// - Playback, MIDI output and a preview tone for standalone use

pub mod audio;
pub mod config;
pub mod controller;
pub mod engine;
pub mod knob;
pub mod midi;
pub mod range;
pub mod sequencer;
pub mod theory;

// Re-export commonly used types
pub use audio::AudioOutput;
pub use config::Config;
pub use controller::{ControllerObserver, SequencerController};
pub use engine::{AudioEngine, EngineError, ObservableParameter, SharedEngine};
pub use knob::{GesturePhase, KnobControl, KnobControlType};
pub use midi::{MidiError, MidiOutputDevice};
pub use range::{convert, RangeConvert, RangeError};
pub use sequencer::playback::{PlaybackEngine, PlaybackEvent};
pub use sequencer::{NoteData, SequencerData, SequencerStepData, StepPropertyType};
pub use theory::{midi_note_name, ArpeggioType, Chord, ChordType, NoteValue, Pitch};
