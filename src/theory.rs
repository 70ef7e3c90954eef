/// Pitch naming, chords, note values and arpeggio orders
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Name of a MIDI note, octave numbering with middle C as `C4`.
pub fn midi_note_name(note: u8) -> String {
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PitchParseError {
    #[error("no tone letter given")]
    MissingTone,

    #[error("unrecognized tone '{0}'")]
    UnrecognizedTone(String),

    #[error("no octave given")]
    MissingOctave,

    #[error("invalid octave '{0}'")]
    InvalidOctave(String),

    #[error("pitch is outside the MIDI range (note {0})")]
    OutOfRange(i32),
}

/// A MIDI note number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pitch(pub u8);

impl Pitch {
    pub const MIDDLE_C: Pitch = Pitch(60);

    pub fn midi_note(&self) -> u8 {
        self.0
    }

    /// Shift by semitones, `None` when the result leaves 0..=127.
    pub fn transposed(&self, semitones: i16) -> Option<Pitch> {
        let shifted = self.0 as i16 + semitones;
        u8::try_from(shifted).ok().filter(|n| *n <= 127).map(Pitch)
    }
}

impl Default for Pitch {
    fn default() -> Self {
        Self::MIDDLE_C
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", midi_note_name(self.0))
    }
}

impl FromStr for Pitch {
    type Err = PitchParseError;

    /// Parses names like `c4`, `C#3`, `eb5` or `a-1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let tone = chars.next().ok_or(PitchParseError::MissingTone)?;
        let semitone: i32 = match tone.to_ascii_lowercase() {
            'c' => 0,
            'd' => 2,
            'e' => 4,
            'f' => 5,
            'g' => 7,
            'a' => 9,
            'b' => 11,
            other => return Err(PitchParseError::UnrecognizedTone(other.to_string())),
        };

        let rest = chars.as_str();
        let accidental_len = rest
            .chars()
            .take_while(|c| matches!(c, '#' | 'b'))
            .count();
        let (accidentals, octave) = rest.split_at(accidental_len);
        let accidental: i32 = accidentals
            .chars()
            .map(|c| if c == '#' { 1 } else { -1 })
            .sum();

        if octave.is_empty() {
            return Err(PitchParseError::MissingOctave);
        }
        let octave: i32 = octave
            .parse()
            .map_err(|_| PitchParseError::InvalidOctave(octave.to_string()))?;

        let note = (octave + 1) * 12 + semitone + accidental;
        u8::try_from(note)
            .ok()
            .filter(|n| *n <= 127)
            .map(Pitch)
            .ok_or(PitchParseError::OutOfRange(note))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChordType {
    #[default]
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    Major7,
    Minor7,
    Dominant7,
}

impl ChordType {
    /// Semitone offsets above the root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Sus2 => &[0, 2, 7],
            Self::Sus4 => &[0, 5, 7],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
            Self::Dominant7 => &[0, 4, 7, 10],
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Major => "",
            Self::Minor => "m",
            Self::Diminished => "dim",
            Self::Augmented => "aug",
            Self::Sus2 => "sus2",
            Self::Sus4 => "sus4",
            Self::Major7 => "maj7",
            Self::Minor7 => "m7",
            Self::Dominant7 => "7",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub root: Pitch,
    pub kind: ChordType,
}

impl Chord {
    pub fn new(root: Pitch, kind: ChordType) -> Self {
        Self { root, kind }
    }

    /// Chord tones in ascending order. Tones above 127 are dropped.
    pub fn notes(&self) -> Vec<u8> {
        self.kind
            .intervals()
            .iter()
            .filter_map(|i| self.root.transposed(*i as i16))
            .map(|p| p.midi_note())
            .collect()
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.kind.suffix())
    }
}

/// Note duration as a subdivision of a whole note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteValue {
    Whole,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    /// Values selectable as the global beat rate, in parameter index order.
    pub const RATES: [NoteValue; 4] = [Self::Whole, Self::Half, Self::Quarter, Self::Eighth];

    /// Length in quarter-note beats
    pub fn beats(&self) -> f64 {
        match self {
            Self::Whole => 4.0,
            Self::Half => 2.0,
            Self::Quarter => 1.0,
            Self::Eighth => 0.5,
            Self::Sixteenth => 0.25,
        }
    }

    pub fn from_rate_index(index: usize) -> Option<Self> {
        Self::RATES.get(index).copied()
    }

    pub fn rate_index(&self) -> Option<usize> {
        Self::RATES.iter().position(|r| r == self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Whole => "1/1",
            Self::Half => "1/2",
            Self::Quarter => "1/4",
            Self::Eighth => "1/8",
            Self::Sixteenth => "1/16",
        }
    }
}

/// Playback order of chord tones within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArpeggioType {
    #[default]
    Up,
    Down,
    UpDown,
    Random,
}

impl ArpeggioType {
    pub const ALL: [ArpeggioType; 4] = [Self::Up, Self::Down, Self::UpDown, Self::Random];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::UpDown => 2,
            Self::Random => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::UpDown => "Up-Down",
            Self::Random => "Random",
        }
    }

    /// One cycle of the arpeggio over `notes`.
    ///
    /// Up-down does not repeat the top and bottom tones at the turn,
    /// so `[60, 64, 67]` cycles as `60 64 67 64`.
    pub fn order(&self, notes: &[u8], rng: &mut fastrand::Rng) -> Vec<u8> {
        let mut sorted = notes.to_vec();
        sorted.sort_unstable();
        match self {
            Self::Up => sorted,
            Self::Down => {
                sorted.reverse();
                sorted
            }
            Self::UpDown => {
                let inner = sorted.len().saturating_sub(1);
                let descent: Vec<u8> = sorted
                    .iter()
                    .rev()
                    .skip(1)
                    .take(inner.saturating_sub(1))
                    .copied()
                    .collect();
                sorted.extend(descent);
                sorted
            }
            Self::Random => {
                rng.shuffle(&mut sorted);
                sorted
            }
        }
    }
}
