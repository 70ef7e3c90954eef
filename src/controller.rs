/// Editing logic behind the step grid and the shared knob
///
/// Toolkit independent: a GUI forwards taps and drags here, reads labels
/// back, and every edit is pushed to the engine as a full snapshot.
use crate::engine::{AudioEngine, EngineError};
use crate::sequencer::{clamp_bpm, ParameterError, SequencerData, StepPropertyType};

/// Change notifications for whoever renders the sequencer.
pub trait ControllerObserver {
    fn steps_changed(&mut self, _count: usize) {}
    fn step_changed(&mut self, _index: usize) {}
    fn selection_changed(&mut self, _step: usize, _property: StepPropertyType) {}
}

pub struct SequencerController<E: AudioEngine> {
    data: SequencerData,
    engine: E,
    selected_property: StepPropertyType,
    selected_step: usize,
    bpm: f32,
    observer: Option<Box<dyn ControllerObserver>>,
}

impl<E: AudioEngine> SequencerController<E> {
    /// Takes over `data` and pushes it to the engine right away.
    pub fn new(data: SequencerData, engine: E) -> Result<Self, EngineError> {
        let mut controller = Self {
            data,
            engine,
            selected_property: StepPropertyType::default(),
            selected_step: 0,
            bpm: 120.0,
            observer: None,
        };
        controller.push_steps();
        controller.push_globals()?;
        Ok(controller)
    }

    pub fn set_observer(&mut self, observer: Box<dyn ControllerObserver>) {
        self.observer = Some(observer);
    }

    pub fn data(&self) -> &SequencerData {
        &self.data
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct engine access for host-side changes. Call
    /// [`reload_from_engine`](Self::reload_from_engine) afterwards.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = clamp_bpm(bpm);
    }

    pub fn selected_property(&self) -> StepPropertyType {
        self.selected_property
    }

    pub fn selected_step(&self) -> usize {
        self.selected_step
    }

    pub fn select_property(&mut self, property: StepPropertyType) {
        self.selected_property = property;
        self.notify_selection();
    }

    pub fn select_step(&mut self, index: usize) -> Result<(), ParameterError> {
        let count = self.data.len();
        if index >= count {
            return Err(ParameterError::StepIndex { index, count });
        }
        self.selected_step = index;
        self.notify_selection();
        Ok(())
    }

    pub fn add_step(&mut self) {
        self.data.append_step();
        log::debug!("step added, {} steps", self.data.len());
        self.push_steps();
        let count = self.data.len();
        self.notify(|o| o.steps_changed(count));
    }

    /// Removes the last step. Returns false when only one step is left.
    pub fn remove_step(&mut self) -> bool {
        if self.data.remove_last_step().is_none() {
            return false;
        }
        log::debug!("step removed, {} steps", self.data.len());
        if self.selected_step >= self.data.len() {
            self.selected_step = self.data.len() - 1;
            self.notify_selection();
        }
        self.push_steps();
        let count = self.data.len();
        self.notify(|o| o.steps_changed(count));
        true
    }

    pub fn toggle_step(&mut self, index: usize) -> Result<bool, ParameterError> {
        let count = self.data.len();
        let enabled = self
            .data
            .toggle_step(index)
            .ok_or(ParameterError::StepIndex { index, count })?;
        self.push_steps();
        self.notify(|o| o.step_changed(index));
        Ok(enabled)
    }

    /// Knob position of the selected parameter on the selected step.
    pub fn knob_value(&self) -> f64 {
        self.data
            .step(self.selected_step)
            .map(|step| {
                self.selected_property
                    .knob_value(step.value(self.selected_property))
            })
            .unwrap_or_default()
    }

    /// Writes a knob position into the selected parameter of the selected step.
    pub fn set_knob_value(&mut self, knob: f64) -> Result<u16, ParameterError> {
        let raw = self.selected_property.item_value(knob);
        self.set_step_raw_value(self.selected_step, raw)?;
        Ok(raw)
    }

    /// Writes a raw value into the selected parameter of any step.
    pub fn set_step_raw_value(&mut self, index: usize, raw: u16) -> Result<(), ParameterError> {
        self.data
            .set_step_value(index, self.selected_property, raw)?;
        self.push_steps();
        self.notify(|o| o.step_changed(index));
        Ok(())
    }

    /// Cell text for a step under the selected parameter.
    pub fn step_label(&self, index: usize) -> Option<String> {
        self.data.step_label(index, self.selected_property)
    }

    pub fn set_rate_index(&mut self, index: usize) -> Result<(), EngineError> {
        if let Err(e) = self.data.set_rate_index(index) {
            log::warn!("{}", e);
            return Ok(());
        }
        self.engine.beat_rate_index().set_value(index as f64)?;
        Ok(())
    }

    pub fn set_arpeggio_index(&mut self, index: usize) -> Result<(), EngineError> {
        if let Err(e) = self.data.set_arpeggio_index(index) {
            log::warn!("{}", e);
            return Ok(());
        }
        self.engine.arpeggiator_type_index().set_value(index as f64)?;
        Ok(())
    }

    /// Pulls the engine's steps and parameters back into the editor,
    /// e.g. after the host restored a preset.
    pub fn reload_from_engine(&mut self) {
        if !self.data.replace_steps(self.engine.sequencer_steps()) {
            log::warn!("engine returned no steps, keeping the edited pattern");
            return;
        }
        let rate = self.engine.beat_rate_index().index();
        let arpeggio = self.engine.arpeggiator_type_index().index();
        if let Err(e) = self
            .data
            .set_rate_index(rate)
            .and_then(|_| self.data.set_arpeggio_index(arpeggio))
        {
            log::warn!("engine parameter out of range: {}", e);
        }
        self.selected_step = self.selected_step.min(self.data.len() - 1);
        let count = self.data.len();
        self.notify(|o| o.steps_changed(count));
        self.notify_selection();
    }

    fn push_steps(&mut self) {
        self.engine.update_with_contents_of(self.data.steps());
    }

    fn push_globals(&mut self) -> Result<(), EngineError> {
        self.engine
            .beat_rate_index()
            .set_value(self.data.rate_index() as f64)?;
        self.engine
            .arpeggiator_type_index()
            .set_value(self.data.arpeggio_index() as f64)?;
        Ok(())
    }

    fn notify(&mut self, f: impl FnOnce(&mut dyn ControllerObserver)) {
        if let Some(observer) = self.observer.as_deref_mut() {
            f(observer);
        }
    }

    fn notify_selection(&mut self) {
        let (step, property) = (self.selected_step, self.selected_property);
        self.notify(|o| o.selection_changed(step, property));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ObservableParameter, SharedEngine};
    use crate::sequencer::SequencerStepData;
    use crate::theory::{ArpeggioType, NoteValue};
    use std::sync::{Arc, Mutex};

    /// Engine double that records every snapshot it receives.
    struct RecordingEngine {
        pushes: Vec<Vec<SequencerStepData>>,
        beat_rate_index: ObservableParameter,
        arpeggiator_type_index: ObservableParameter,
    }

    impl RecordingEngine {
        fn new() -> Self {
            Self {
                pushes: Vec::new(),
                beat_rate_index: ObservableParameter::new("rate", 0.0, 3.0, 0.0),
                arpeggiator_type_index: ObservableParameter::new("arp", 0.0, 3.0, 0.0),
            }
        }
    }

    impl AudioEngine for RecordingEngine {
        fn update_with_contents_of(&mut self, steps: &[SequencerStepData]) {
            self.pushes.push(steps.to_vec());
        }

        fn beat_rate_index(&self) -> &ObservableParameter {
            &self.beat_rate_index
        }

        fn arpeggiator_type_index(&self) -> &ObservableParameter {
            &self.arpeggiator_type_index
        }

        fn sequencer_steps(&self) -> Vec<SequencerStepData> {
            self.pushes.last().cloned().unwrap_or_default()
        }

        fn sequencer_step_index(&self) -> usize {
            0
        }
    }

    struct Log(Arc<Mutex<Vec<String>>>);

    impl ControllerObserver for Log {
        fn steps_changed(&mut self, count: usize) {
            self.0.lock().unwrap().push(format!("steps {count}"));
        }

        fn step_changed(&mut self, index: usize) {
            self.0.lock().unwrap().push(format!("step {index}"));
        }
    }

    fn controller(steps: usize) -> SequencerController<RecordingEngine> {
        SequencerController::new(SequencerData::new(steps), RecordingEngine::new()).unwrap()
    }

    #[test]
    fn test_new_pushes_snapshot_and_globals() {
        let c = controller(4);
        assert_eq!(c.engine().pushes.len(), 1);
        assert_eq!(c.engine().pushes[0].len(), 4);
        assert_eq!(c.engine().beat_rate_index().index(), 2);
    }

    #[test]
    fn test_every_edit_pushes_full_snapshot() {
        let mut c = controller(2);
        c.add_step();
        c.toggle_step(0).unwrap();
        c.set_knob_value(1.0).unwrap();
        assert!(c.remove_step());

        let pushes = &c.engine().pushes;
        assert_eq!(pushes.len(), 5);
        assert_eq!(pushes[1].len(), 3);
        assert!(!pushes[2][0].is_enabled);
        assert_eq!(pushes[3][0].midi_note, 127);
        assert_eq!(pushes[4], c.data().steps());
    }

    #[test]
    fn test_remove_refused_at_one_step() {
        let mut c = controller(1);
        assert!(!c.remove_step());
        assert_eq!(c.data().len(), 1);
        assert_eq!(c.engine().pushes.len(), 1);
    }

    #[test]
    fn test_modulation_edit_touches_only_modulation() {
        let mut c = controller(3);
        c.select_step(1).unwrap();
        c.select_property(StepPropertyType::Modulation);
        let before = c.data().steps()[1].clone();

        c.set_step_raw_value(1, 64).unwrap();

        let step = &c.data().steps()[1];
        assert_eq!(step.modulation, 64);
        assert_eq!(step.midi_note, before.midi_note);
        assert_eq!(step.velocity, before.velocity);
        assert_eq!(step.pitch_bend, before.pitch_bend);
        assert_eq!(c.engine().pushes.last().unwrap()[1].modulation, 64);
    }

    #[test]
    fn test_knob_round_trip_through_controller() {
        let mut c = controller(1);
        c.select_property(StepPropertyType::PitchBend);
        assert!((c.knob_value() - 0.5).abs() < 1e-4);

        for raw in [0u16, 1, 8191, 8192, 16382, 16383] {
            let knob = StepPropertyType::PitchBend.knob_value(raw);
            assert_eq!(c.set_knob_value(knob), Ok(raw));
            assert_eq!(c.data().steps()[0].pitch_bend, raw);
        }
    }

    #[test]
    fn test_labels_follow_selected_property() {
        let mut c = controller(1);
        assert_eq!(c.step_label(0).as_deref(), Some("C4"));
        c.select_property(StepPropertyType::Velocity);
        assert_eq!(c.step_label(0).as_deref(), Some("100"));
        assert_eq!(c.step_label(3), None);
    }

    #[test]
    fn test_selection_is_clamped_after_remove() {
        let mut c = controller(3);
        c.select_step(2).unwrap();
        c.remove_step();
        assert_eq!(c.selected_step(), 1);
        assert!(c.select_step(2).is_err());
    }

    #[test]
    fn test_global_parameters_reach_engine() {
        let mut c = controller(1);
        c.set_rate_index(3).unwrap();
        c.set_arpeggio_index(1).unwrap();
        assert_eq!(c.engine().beat_rate_index().index(), 3);
        assert_eq!(c.engine().arpeggiator_type_index().index(), 1);
        assert_eq!(c.data().rate(), NoteValue::Eighth);

        // out of range is ignored
        c.set_rate_index(7).unwrap();
        assert_eq!(c.engine().beat_rate_index().index(), 3);
    }

    #[test]
    fn test_reload_from_engine() {
        let engine = SharedEngine::new(vec![SequencerStepData::default()]).unwrap();
        let mut c = SequencerController::new(SequencerData::new(4), engine).unwrap();
        c.select_step(3).unwrap();

        // preset restored on the engine side
        c.engine_mut()
            .update_with_contents_of(&vec![SequencerStepData::with_midi_note(40); 2]);
        c.engine().arpeggiator_type_index().set_value(3.0).unwrap();
        c.reload_from_engine();

        assert_eq!(c.data().len(), 2);
        assert_eq!(c.data().steps()[0].midi_note, 40);
        assert_eq!(c.data().arpeggio(), ArpeggioType::Random);
        assert_eq!(c.selected_step(), 1);
    }

    #[test]
    fn test_set_bpm_is_clamped() {
        let mut c = controller(1);
        c.set_bpm(300.0);
        assert_eq!(c.bpm(), 240.0);
        c.set_bpm(f32::NAN);
        assert_eq!(c.bpm(), 120.0);
        c.set_bpm(90.0);
        assert_eq!(c.bpm(), 90.0);
    }

    #[test]
    fn test_observer_is_notified() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut c = controller(1);
        c.set_observer(Box::new(Log(Arc::clone(&events))));
        c.add_step();
        c.toggle_step(1).unwrap();
        assert_eq!(*events.lock().unwrap(), vec!["steps 2", "step 1"]);
    }
}
