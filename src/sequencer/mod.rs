/// Sequencer pattern state - ordered steps plus the global rate and arpeggio
pub mod playback;
pub mod step;

use thiserror::Error;

use crate::theory::{ArpeggioType, NoteValue};
pub use step::{NoteData, SequencerStepData, StepPropertyType};

pub const MIN_BPM: f32 = 40.0;
pub const MAX_BPM: f32 = 240.0;

pub fn clamp_bpm(bpm: f32) -> f32 {
    if bpm.is_nan() {
        return 120.0;
    }
    bpm.clamp(MIN_BPM, MAX_BPM)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("beat rate index {0} is out of range 0..=3")]
    RateIndex(usize),

    #[error("arpeggiator type index {0} is out of range 0..=3")]
    ArpeggioIndex(usize),

    #[error("step index {index} is out of range for {count} steps")]
    StepIndex { index: usize, count: usize },
}

/// The full pattern. Always holds at least one step.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerData {
    steps: Vec<SequencerStepData>,
    rate: NoteValue,
    arpeggio: ArpeggioType,
}

impl SequencerData {
    pub fn new(step_count: usize) -> Self {
        Self::with_globals(step_count, NoteValue::Quarter, ArpeggioType::Up)
    }

    /// Default steps with the given global rate and arpeggio. A rate that is
    /// not selectable globally (sixteenth) falls back to quarter.
    pub fn with_globals(step_count: usize, rate: NoteValue, arpeggio: ArpeggioType) -> Self {
        let rate = if rate.rate_index().is_some() {
            rate
        } else {
            NoteValue::Quarter
        };
        Self {
            steps: vec![SequencerStepData::default(); step_count.max(1)],
            rate,
            arpeggio,
        }
    }

    /// Builds from an existing step list, `None` if it is empty.
    pub fn from_steps(
        steps: Vec<SequencerStepData>,
        rate: NoteValue,
        arpeggio: ArpeggioType,
    ) -> Option<Self> {
        if steps.is_empty() {
            return None;
        }
        Some(Self {
            steps,
            rate,
            arpeggio,
        })
    }

    pub fn steps(&self) -> &[SequencerStepData] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&SequencerStepData> {
        self.steps.get(index)
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut SequencerStepData> {
        self.steps.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Never true; kept for the usual `len`/`is_empty` pairing.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn rate(&self) -> NoteValue {
        self.rate
    }

    pub fn arpeggio(&self) -> ArpeggioType {
        self.arpeggio
    }

    pub fn append_step(&mut self) {
        self.steps.push(SequencerStepData::default());
    }

    /// Pops the last step. Refuses when only one step is left.
    pub fn remove_last_step(&mut self) -> Option<SequencerStepData> {
        if self.steps.len() <= 1 {
            return None;
        }
        self.steps.pop()
    }

    /// Flips a step on or off and returns its new state.
    pub fn toggle_step(&mut self, index: usize) -> Option<bool> {
        let step = self.steps.get_mut(index)?;
        step.is_enabled = !step.is_enabled;
        Some(step.is_enabled)
    }

    pub fn set_step_value(
        &mut self,
        index: usize,
        property: StepPropertyType,
        raw: u16,
    ) -> Result<(), ParameterError> {
        let count = self.steps.len();
        let step = self
            .steps
            .get_mut(index)
            .ok_or(ParameterError::StepIndex { index, count })?;
        step.set_value(property, raw);
        Ok(())
    }

    pub fn step_label(&self, index: usize, property: StepPropertyType) -> Option<String> {
        self.steps.get(index).map(|step| step.label(property))
    }

    /// Replaces every step. An empty list is ignored.
    pub fn replace_steps(&mut self, steps: Vec<SequencerStepData>) -> bool {
        if steps.is_empty() {
            return false;
        }
        self.steps = steps;
        true
    }

    pub fn rate_index(&self) -> usize {
        // Sixteenth is never the global rate, fall back to quarter.
        self.rate.rate_index().unwrap_or(2)
    }

    pub fn set_rate_index(&mut self, index: usize) -> Result<(), ParameterError> {
        self.rate = NoteValue::from_rate_index(index).ok_or(ParameterError::RateIndex(index))?;
        Ok(())
    }

    pub fn arpeggio_index(&self) -> usize {
        self.arpeggio.index()
    }

    pub fn set_arpeggio_index(&mut self, index: usize) -> Result<(), ParameterError> {
        self.arpeggio =
            ArpeggioType::from_index(index).ok_or(ParameterError::ArpeggioIndex(index))?;
        Ok(())
    }
}

impl Default for SequencerData {
    fn default() -> Self {
        Self::new(8)
    }
}
