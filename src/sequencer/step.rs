/// Per-step data and the knob mapping of its editable parameters
use std::ops::RangeInclusive;

use crate::range::convert;
use crate::theory::{midi_note_name, Chord, NoteValue, Pitch};

/// Slack added before truncating a mapped knob value, so that
/// `x / 127 * 127` landing at 62.999999... still truncates to 63.
const TRUNCATE_EPSILON: f64 = 1e-9;

/// The integer parameter of a step edited by the shared knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepPropertyType {
    #[default]
    Pitch,
    Velocity,
    Modulation,
    PitchBend,
}

impl StepPropertyType {
    pub const ALL: [StepPropertyType; 4] = [
        Self::Pitch,
        Self::Velocity,
        Self::Modulation,
        Self::PitchBend,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Pitch => 0,
            Self::Velocity => 1,
            Self::Modulation => 2,
            Self::PitchBend => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pitch => "Pitch",
            Self::Velocity => "Velocity",
            Self::Modulation => "Modulation",
            Self::PitchBend => "Pitch Bend",
        }
    }

    /// Inclusive raw value range
    pub fn range(&self) -> RangeInclusive<u16> {
        match self {
            Self::Pitch | Self::Velocity | Self::Modulation => 0..=127,
            Self::PitchBend => 0..=16383,
        }
    }

    /// Normalized knob position for a raw value.
    pub fn knob_value(&self, raw: u16) -> f64 {
        let range = self.range();
        let (lo, hi) = (*range.start() as f64, *range.end() as f64);
        // Property ranges are constant and never degenerate.
        convert(raw as f64, lo..=hi, 0.0..=1.0).unwrap_or_default()
    }

    /// Raw value for a knob position, truncated toward the lower integer.
    /// Positions outside `0.0..=1.0` are clamped, NaN reads as 0.
    pub fn item_value(&self, knob: f64) -> u16 {
        let knob = if knob.is_nan() { 0.0 } else { knob.clamp(0.0, 1.0) };
        let range = self.range();
        let (lo, hi) = (*range.start() as f64, *range.end() as f64);
        let mapped = convert(knob, 0.0..=1.0, lo..=hi).unwrap_or(lo);
        ((mapped + TRUNCATE_EPSILON).trunc() as u16).min(*range.end())
    }

    /// Display text for a raw value: note names for pitch, numbers otherwise.
    pub fn label(&self, raw: u16) -> String {
        match self {
            Self::Pitch => midi_note_name(raw.min(127) as u8),
            _ => raw.to_string(),
        }
    }
}

/// What a step plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteData {
    Rest,
    Pitch(Pitch),
    Chord(Chord),
}

impl Default for NoteData {
    fn default() -> Self {
        Self::Pitch(Pitch::MIDDLE_C)
    }
}

/// One slot of the sequencer pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerStepData {
    pub note: NoteData,
    pub rate: NoteValue,
    /// Fraction of the step the note sustains
    pub gate: f64,
    pub pitch: f64,
    pub modulation_amount: f64,
    pub is_enabled: bool,
    pub midi_note: u8,
    pub velocity: u8,
    pub modulation: u8,
    pub pitch_bend: u16,
}

impl SequencerStepData {
    pub const DEFAULT_VELOCITY: u8 = 100;
    pub const PITCH_BEND_CENTER: u16 = 8192;

    pub fn new() -> Self {
        Self::with_midi_note(Pitch::MIDDLE_C.midi_note())
    }

    pub fn with_midi_note(midi_note: u8) -> Self {
        Self::with_parameters(
            midi_note,
            Self::DEFAULT_VELOCITY,
            0,
            Self::PITCH_BEND_CENTER,
            true,
        )
    }

    pub fn with_parameters(
        midi_note: u8,
        velocity: u8,
        modulation: u8,
        pitch_bend: u16,
        is_enabled: bool,
    ) -> Self {
        let midi_note = midi_note.min(127);
        Self {
            note: NoteData::Pitch(Pitch(midi_note)),
            rate: NoteValue::Quarter,
            gate: 1.0,
            pitch: 0.0,
            modulation_amount: 0.0,
            is_enabled,
            midi_note,
            velocity: velocity.min(127),
            modulation: modulation.min(127),
            pitch_bend: pitch_bend.min(16383),
        }
    }

    pub fn value(&self, property: StepPropertyType) -> u16 {
        match property {
            StepPropertyType::Pitch => self.midi_note as u16,
            StepPropertyType::Velocity => self.velocity as u16,
            StepPropertyType::Modulation => self.modulation as u16,
            StepPropertyType::PitchBend => self.pitch_bend,
        }
    }

    /// Writes one integer parameter, clamped to the property range.
    ///
    /// Pitch edits also retune `note`: a single pitch is replaced and a chord
    /// is moved to the new root. Rests stay rests.
    pub fn set_value(&mut self, property: StepPropertyType, raw: u16) {
        let raw = raw.min(*property.range().end());
        match property {
            StepPropertyType::Pitch => {
                self.midi_note = raw as u8;
                let root = Pitch(self.midi_note);
                self.note = match self.note {
                    NoteData::Rest => NoteData::Rest,
                    NoteData::Pitch(_) => NoteData::Pitch(root),
                    NoteData::Chord(chord) => NoteData::Chord(Chord::new(root, chord.kind)),
                };
            }
            StepPropertyType::Velocity => self.velocity = raw as u8,
            StepPropertyType::Modulation => self.modulation = raw as u8,
            StepPropertyType::PitchBend => self.pitch_bend = raw,
        }
    }

    pub fn label(&self, property: StepPropertyType) -> String {
        match (property, self.note) {
            (StepPropertyType::Pitch, NoteData::Rest) => "Rest".to_string(),
            (StepPropertyType::Pitch, NoteData::Chord(chord)) => chord.to_string(),
            _ => property.label(self.value(property)),
        }
    }

    /// MIDI notes this step sounds, ascending.
    pub fn notes(&self) -> Vec<u8> {
        match self.note {
            NoteData::Rest => Vec::new(),
            NoteData::Pitch(pitch) => vec![pitch.midi_note()],
            NoteData::Chord(chord) => chord.notes(),
        }
    }
}

impl Default for SequencerStepData {
    fn default() -> Self {
        Self::new()
    }
}
