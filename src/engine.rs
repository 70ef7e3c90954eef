/// Boundary to the audio engine that plays the pattern
///
/// The editor pushes full step snapshots through [`AudioEngine`]; the render
/// side reads them through a [`RenderHandle`] without ever blocking the
/// editor for longer than an `Arc` swap.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::sequencer::{SequencerData, SequencerStepData};
use crate::theory::{ArpeggioType, NoteValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("the engine needs at least one step")]
    EmptySequence,

    #[error("parameter '{0}' only accepts finite values")]
    NotFinite(&'static str),
}

type Observer = Arc<dyn Fn(f64) + Send + Sync>;

/// A discrete numeric engine parameter with change observers.
///
/// Values are clamped to `[min, max]` and rounded to whole numbers.
pub struct ObservableParameter {
    name: &'static str,
    min: f64,
    max: f64,
    value: AtomicU64,
    observers: Mutex<Vec<Observer>>,
}

impl ObservableParameter {
    pub fn new(name: &'static str, min: f64, max: f64, initial: f64) -> Self {
        let initial = initial.round().clamp(min, max);
        Self {
            name,
            min,
            max,
            value: AtomicU64::new(initial.to_bits()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Current value as an index, for parameters used as selectors.
    pub fn index(&self) -> usize {
        self.value().max(0.0) as usize
    }

    /// Stores a new value and returns what was actually stored.
    pub fn set_value(&self, value: f64) -> Result<f64, EngineError> {
        if !value.is_finite() {
            return Err(EngineError::NotFinite(self.name));
        }
        let stored = value.round().clamp(self.min, self.max);
        let previous = self.value.swap(stored.to_bits(), Ordering::AcqRel);
        if f64::from_bits(previous) != stored {
            log::debug!("{} -> {}", self.name, stored);
            // Dispatch outside the lock, observers may touch this parameter.
            let observers: Vec<Observer> = self
                .observers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for observer in observers {
                observer(stored);
            }
        }
        Ok(stored)
    }

    /// Registers a callback run after every change of value.
    pub fn observe(&self, observer: impl Fn(f64) + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }
}

impl std::fmt::Debug for ObservableParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableParameter")
            .field("name", &self.name)
            .field("value", &self.value())
            .finish()
    }
}

/// What the sequencer controller needs from an engine.
pub trait AudioEngine {
    /// Replaces the whole step sequence.
    fn update_with_contents_of(&mut self, steps: &[SequencerStepData]);

    fn beat_rate_index(&self) -> &ObservableParameter;

    fn arpeggiator_type_index(&self) -> &ObservableParameter;

    /// The engine's own copy of the steps.
    fn sequencer_steps(&self) -> Vec<SequencerStepData>;

    /// Step currently being played.
    fn sequencer_step_index(&self) -> usize;
}

/// Single-slot handoff of the latest step snapshot. Loads never wait on
/// stores.
#[derive(Debug)]
pub struct SnapshotCell {
    current: ArcSwap<Vec<SequencerStepData>>,
}

impl SnapshotCell {
    pub fn new(steps: Vec<SequencerStepData>) -> Self {
        Self {
            current: ArcSwap::from_pointee(steps),
        }
    }

    pub fn store(&self, steps: Vec<SequencerStepData>) {
        self.current.store(Arc::new(steps));
    }

    pub fn load(&self) -> Arc<Vec<SequencerStepData>> {
        self.current.load_full()
    }
}

/// In-process engine shared between the editor and the playback thread.
#[derive(Debug)]
pub struct SharedEngine {
    snapshot: Arc<SnapshotCell>,
    beat_rate_index: Arc<ObservableParameter>,
    arpeggiator_type_index: Arc<ObservableParameter>,
    step_index: Arc<AtomicUsize>,
}

impl SharedEngine {
    pub fn new(steps: Vec<SequencerStepData>) -> Result<Self, EngineError> {
        if steps.is_empty() {
            return Err(EngineError::EmptySequence);
        }
        let default_rate = NoteValue::Quarter.rate_index().unwrap_or(2);
        Ok(Self::build(steps, default_rate, ArpeggioType::Up.index()))
    }

    /// Engine seeded with a pattern's steps and global settings.
    pub fn from_data(data: &SequencerData) -> Self {
        Self::build(
            data.steps().to_vec(),
            data.rate_index(),
            data.arpeggio_index(),
        )
    }

    fn build(steps: Vec<SequencerStepData>, rate_index: usize, arpeggio_index: usize) -> Self {
        Self {
            snapshot: Arc::new(SnapshotCell::new(steps)),
            beat_rate_index: Arc::new(ObservableParameter::new(
                "beatRateIndex",
                0.0,
                (NoteValue::RATES.len() - 1) as f64,
                rate_index as f64,
            )),
            arpeggiator_type_index: Arc::new(ObservableParameter::new(
                "arpeggiatorTypeIndex",
                0.0,
                (ArpeggioType::ALL.len() - 1) as f64,
                arpeggio_index as f64,
            )),
            step_index: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn render_handle(&self) -> RenderHandle {
        RenderHandle {
            snapshot: Arc::clone(&self.snapshot),
            beat_rate_index: Arc::clone(&self.beat_rate_index),
            arpeggiator_type_index: Arc::clone(&self.arpeggiator_type_index),
            step_index: Arc::clone(&self.step_index),
        }
    }
}

impl AudioEngine for SharedEngine {
    fn update_with_contents_of(&mut self, steps: &[SequencerStepData]) {
        if steps.is_empty() {
            log::warn!("ignoring empty step snapshot");
            return;
        }
        self.snapshot.store(steps.to_vec());
    }

    fn beat_rate_index(&self) -> &ObservableParameter {
        &self.beat_rate_index
    }

    fn arpeggiator_type_index(&self) -> &ObservableParameter {
        &self.arpeggiator_type_index
    }

    fn sequencer_steps(&self) -> Vec<SequencerStepData> {
        self.snapshot.load().as_ref().clone()
    }

    fn sequencer_step_index(&self) -> usize {
        self.step_index.load(Ordering::Acquire)
    }
}

/// State the render side reads for one step.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub steps: Arc<Vec<SequencerStepData>>,
    pub rate: NoteValue,
    pub arpeggio: ArpeggioType,
}

/// Read side of a [`SharedEngine`], cloned into the playback thread.
#[derive(Debug, Clone)]
pub struct RenderHandle {
    snapshot: Arc<SnapshotCell>,
    beat_rate_index: Arc<ObservableParameter>,
    arpeggiator_type_index: Arc<ObservableParameter>,
    step_index: Arc<AtomicUsize>,
}

impl RenderHandle {
    pub fn load(&self) -> RenderState {
        RenderState {
            steps: self.snapshot.load(),
            rate: NoteValue::from_rate_index(self.beat_rate_index.index())
                .unwrap_or_default(),
            arpeggio: ArpeggioType::from_index(self.arpeggiator_type_index.index())
                .unwrap_or_default(),
        }
    }

    pub fn publish_step_index(&self, index: usize) {
        self.step_index.store(index, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_requires_steps() {
        assert_eq!(SharedEngine::new(vec![]).unwrap_err(), EngineError::EmptySequence);
        assert!(SharedEngine::new(vec![SequencerStepData::default()]).is_ok());
    }

    #[test]
    fn test_update_replaces_snapshot() {
        let mut engine = SharedEngine::new(vec![SequencerStepData::default()]).unwrap();
        let handle = engine.render_handle();
        let held = handle.load().steps;

        let steps = vec![
            SequencerStepData::with_midi_note(48),
            SequencerStepData::with_midi_note(50),
        ];
        engine.update_with_contents_of(&steps);

        assert_eq!(engine.sequencer_steps(), steps);
        assert_eq!(handle.load().steps.len(), 2);
        // Readers keep the snapshot they loaded.
        assert_eq!(held.len(), 1);
    }

    #[test]
    fn test_empty_update_is_ignored() {
        let mut engine = SharedEngine::new(vec![SequencerStepData::default()]).unwrap();
        engine.update_with_contents_of(&[]);
        assert_eq!(engine.sequencer_steps().len(), 1);
    }

    #[test]
    fn test_parameter_clamps_and_rounds() {
        let param = ObservableParameter::new("test", 0.0, 3.0, 0.0);
        assert_eq!(param.set_value(2.4), Ok(2.0));
        assert_eq!(param.set_value(7.0), Ok(3.0));
        assert_eq!(param.set_value(-1.0), Ok(0.0));
        assert_eq!(param.set_value(f64::NAN), Err(EngineError::NotFinite("test")));
        assert_eq!(param.value(), 0.0);
    }

    #[test]
    fn test_parameter_observers_fire_on_change() {
        let param = ObservableParameter::new("test", 0.0, 3.0, 0.0);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        param.observe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        param.set_value(1.0).unwrap();
        param.set_value(1.0).unwrap();
        param.set_value(2.0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_observer_may_reenter_parameter() {
        let param = Arc::new(ObservableParameter::new("test", 0.0, 3.0, 0.0));
        let inner = Arc::clone(&param);
        param.observe(move |value| {
            // clamp anything above 2 back down from inside the callback
            if value > 2.0 {
                let _ = inner.set_value(2.0);
            }
        });

        assert_eq!(param.set_value(3.0), Ok(3.0));
        assert_eq!(param.value(), 2.0);
    }

    #[test]
    fn test_snapshot_cell_swaps_whole_snapshots() {
        let cell = SnapshotCell::new(vec![SequencerStepData::default()]);
        let before = cell.load();
        cell.store(vec![SequencerStepData::with_midi_note(30); 3]);
        let after = cell.load();
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 3);
        assert!(after.iter().all(|s| s.midi_note == 30));
    }

    #[test]
    fn test_render_handle_reads_parameters() {
        let engine = SharedEngine::new(vec![SequencerStepData::default()]).unwrap();
        let handle = engine.render_handle();
        assert_eq!(handle.load().rate, NoteValue::Quarter);

        engine.beat_rate_index().set_value(3.0).unwrap();
        engine.arpeggiator_type_index().set_value(3.0).unwrap();
        let state = handle.load();
        assert_eq!(state.rate, NoteValue::Eighth);
        assert_eq!(state.arpeggio, ArpeggioType::Random);

        handle.publish_step_index(5);
        assert_eq!(engine.sequencer_step_index(), 5);
    }

    #[test]
    fn test_from_data_seeds_parameters() {
        let mut data = SequencerData::new(3);
        data.set_rate_index(1).unwrap();
        data.set_arpeggio_index(2).unwrap();
        let engine = SharedEngine::from_data(&data);
        assert_eq!(engine.beat_rate_index().index(), 1);
        assert_eq!(engine.arpeggiator_type_index().index(), 2);
        assert_eq!(engine.sequencer_steps().len(), 3);
    }
}
