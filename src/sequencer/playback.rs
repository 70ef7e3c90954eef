/// Playback engine - walks the step snapshot and emits timed events
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{clamp_bpm, SequencerStepData};
use crate::engine::RenderHandle;
use crate::theory::{ArpeggioType, NoteValue};

/// MIDI controller number of the modulation wheel
pub const MODULATION_CC: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    NoteOn(u8, u8), // note, velocity
    NoteOff(u8),    // note
    ControlChange(u8, u8),
    PitchBend(u16),
}

impl PlaybackEvent {
    // Offs first so a repeated note is released before it restarts.
    fn order_key(&self) -> u8 {
        match self {
            Self::NoteOff(_) => 0,
            Self::StepAdvanced(_) | Self::ControlChange(..) | Self::PitchBend(_) => 1,
            Self::NoteOn(..) => 2,
        }
    }
}

/// Timed events of a single step, offsets relative to the step start.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSchedule {
    pub duration: Duration,
    pub events: Vec<(Duration, PlaybackEvent)>,
}

fn beats_to_secs(beats: f64, bpm: f32) -> f64 {
    beats * 60.0 / clamp_bpm(bpm) as f64
}

/// Lays out what one step plays.
///
/// Single pitches sound for `gate` of the step. Chord tones are arpeggiated,
/// one every `rate`, each held for `gate` of its slot. Disabled steps and
/// rests schedule nothing.
pub fn schedule_step(
    step: &SequencerStepData,
    rate: NoteValue,
    arpeggio: ArpeggioType,
    bpm: f32,
    rng: &mut fastrand::Rng,
) -> StepSchedule {
    let step_secs = beats_to_secs(step.rate.beats(), bpm);
    let duration = Duration::from_secs_f64(step_secs);
    let notes = step.notes();
    if !step.is_enabled || notes.is_empty() {
        return StepSchedule {
            duration,
            events: Vec::new(),
        };
    }

    let gate = if step.gate.is_nan() { 1.0 } else { step.gate.clamp(0.0, 1.0) };
    let mut events = vec![
        (Duration::ZERO, PlaybackEvent::PitchBend(step.pitch_bend)),
        (
            Duration::ZERO,
            PlaybackEvent::ControlChange(MODULATION_CC, step.modulation),
        ),
    ];

    let mut push_note = |note: u8, start: f64, length: f64| {
        if length <= 0.0 {
            return;
        }
        events.push((
            Duration::from_secs_f64(start),
            PlaybackEvent::NoteOn(note, step.velocity),
        ));
        events.push((
            Duration::from_secs_f64(start + length),
            PlaybackEvent::NoteOff(note),
        ));
    };

    if let [note] = notes.as_slice() {
        push_note(*note, 0.0, step_secs * gate);
    } else {
        let slot = beats_to_secs(rate.beats(), bpm);
        let order = arpeggio.order(&notes, rng);
        let count = ((step_secs / slot).ceil() as usize).max(1);
        for (k, note) in order.iter().cycle().take(count).enumerate() {
            let start = k as f64 * slot;
            let length = slot.min(step_secs - start) * gate;
            push_note(*note, start, length);
        }
    }

    events.sort_by_key(|(offset, event)| (*offset, event.order_key()));
    StepSchedule { duration, events }
}

/// One playback thread and the flag that keeps it going.
struct Run {
    is_running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct PlaybackEngine {
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    run: Option<Run>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            run: None,
        }
    }

    /// Starts the playback thread. Steps, rate and arpeggio are re-read from
    /// the engine at every step boundary, so edits apply on the next step.
    pub fn start(&mut self, bpm: f32, engine: RenderHandle) {
        if self.is_running() {
            return;
        }
        // reap a thread that ended on its own
        self.stop();
        log::info!("playback started at {} bpm", bpm);

        let run_flag = Arc::new(AtomicBool::new(true));
        let is_running = Arc::clone(&run_flag);
        let sender = self.sender.clone();

        let thread = thread::spawn(move || {
            let mut rng = fastrand::Rng::new();
            let mut current_step = 0;
            let mut sounding: Vec<u8> = Vec::new();

            'playback: while is_running.load(Ordering::Acquire) {
                let state = engine.load();
                if current_step >= state.steps.len() {
                    current_step = 0;
                }
                let Some(step) = state.steps.get(current_step) else {
                    break;
                };

                engine.publish_step_index(current_step);
                let _ = sender.send(PlaybackEvent::StepAdvanced(current_step));

                let schedule = schedule_step(step, state.rate, state.arpeggio, bpm, &mut rng);
                let step_start = Instant::now();

                for (offset, event) in schedule.events {
                    if !wait_until(&is_running, step_start + offset) {
                        break 'playback;
                    }
                    match event {
                        PlaybackEvent::NoteOn(note, _) => sounding.push(note),
                        PlaybackEvent::NoteOff(note) => sounding.retain(|n| *n != note),
                        _ => {}
                    }
                    let _ = sender.send(event);
                }

                if !wait_until(&is_running, step_start + schedule.duration) {
                    break;
                }
                current_step = (current_step + 1) % state.steps.len();
            }

            for note in sounding.drain(..) {
                let _ = sender.send(PlaybackEvent::NoteOff(note));
            }
            log::info!("playback stopped");
        });

        self.run = Some(Run {
            is_running: run_flag,
            thread,
        });
    }

    /// Stops playback and waits for the thread to send its final note-offs.
    pub fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.is_running.store(false, Ordering::Release);
            if run.thread.join().is_err() {
                log::error!("playback thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.is_running.load(Ordering::Acquire) && !run.thread.is_finished())
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleeps until `deadline`, returning false early if playback was stopped.
fn wait_until(is_running: &AtomicBool, deadline: Instant) -> bool {
    loop {
        if !is_running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SharedEngine;
    use crate::sequencer::NoteData;
    use crate::theory::{Chord, ChordType, Pitch};

    fn rng() -> fastrand::Rng {
        fastrand::Rng::with_seed(1)
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_single_note_schedule() {
        let mut step = SequencerStepData::with_midi_note(64);
        step.gate = 0.5;
        step.modulation = 10;
        let schedule = schedule_step(&step, NoteValue::Quarter, ArpeggioType::Up, 120.0, &mut rng());

        assert_eq!(schedule.duration, secs(0.5));
        assert_eq!(
            schedule.events,
            vec![
                (Duration::ZERO, PlaybackEvent::PitchBend(8192)),
                (Duration::ZERO, PlaybackEvent::ControlChange(MODULATION_CC, 10)),
                (Duration::ZERO, PlaybackEvent::NoteOn(64, 100)),
                (secs(0.25), PlaybackEvent::NoteOff(64)),
            ]
        );
    }

    #[test]
    fn test_disabled_and_rest_steps_are_silent() {
        let mut step = SequencerStepData::default();
        step.is_enabled = false;
        let schedule = schedule_step(&step, NoteValue::Quarter, ArpeggioType::Up, 120.0, &mut rng());
        assert!(schedule.events.is_empty());
        assert_eq!(schedule.duration, secs(0.5));

        let mut rest = SequencerStepData::default();
        rest.note = NoteData::Rest;
        let schedule = schedule_step(&rest, NoteValue::Quarter, ArpeggioType::Up, 120.0, &mut rng());
        assert!(schedule.events.is_empty());
    }

    #[test]
    fn test_zero_gate_plays_nothing() {
        let mut step = SequencerStepData::default();
        step.gate = 0.0;
        let schedule = schedule_step(&step, NoteValue::Quarter, ArpeggioType::Up, 120.0, &mut rng());
        assert!(!schedule
            .events
            .iter()
            .any(|(_, e)| matches!(e, PlaybackEvent::NoteOn(..))));
    }

    #[test]
    fn test_chord_is_arpeggiated_at_global_rate() {
        let mut step = SequencerStepData::default();
        step.rate = NoteValue::Whole;
        step.note = NoteData::Chord(Chord::new(Pitch(60), ChordType::Major));

        // a whole note at 60 bpm is 4 s, split into quarter slots
        let schedule = schedule_step(&step, NoteValue::Quarter, ArpeggioType::UpDown, 60.0, &mut rng());
        let ons: Vec<(Duration, u8)> = schedule
            .events
            .iter()
            .filter_map(|(t, e)| match e {
                PlaybackEvent::NoteOn(n, _) => Some((*t, *n)),
                _ => None,
            })
            .collect();
        assert_eq!(
            ons,
            vec![
                (secs(0.0), 60),
                (secs(1.0), 64),
                (secs(2.0), 67),
                (secs(3.0), 64),
            ]
        );
    }

    #[test]
    fn test_repeated_note_releases_before_retrigger() {
        let mut step = SequencerStepData::default();
        step.rate = NoteValue::Half;
        step.note = NoteData::Chord(Chord::new(Pitch(121), ChordType::Major));
        // only 121 and 125 fit, at eighth slots the order repeats
        let schedule = schedule_step(&step, NoteValue::Eighth, ArpeggioType::Up, 120.0, &mut rng());
        let at_half: Vec<&PlaybackEvent> = schedule
            .events
            .iter()
            .filter(|(t, _)| *t == secs(0.5))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(at_half, vec![&PlaybackEvent::NoteOff(125), &PlaybackEvent::NoteOn(121, 100)]);
    }

    #[test]
    fn test_engine_start_stop() {
        let engine = SharedEngine::new(vec![SequencerStepData::default()]).unwrap();
        let mut playback = PlaybackEngine::new();
        playback.start(240.0, engine.render_handle());
        assert!(playback.is_running());

        thread::sleep(Duration::from_millis(50));
        playback.stop();
        assert!(!playback.is_running());
        thread::sleep(Duration::from_millis(20));

        let events = playback.poll_events();
        assert_eq!(events.first(), Some(&PlaybackEvent::StepAdvanced(0)));
        assert!(events.contains(&PlaybackEvent::NoteOn(60, 100)));
        assert!(events.contains(&PlaybackEvent::NoteOff(60)));
    }

    #[test]
    fn test_restart_runs_a_single_thread() {
        let engine = SharedEngine::new(vec![SequencerStepData::default()]).unwrap();
        let mut playback = PlaybackEngine::new();

        playback.start(240.0, engine.render_handle());
        thread::sleep(Duration::from_millis(20));
        playback.stop();
        playback.poll_events();

        // restart straight away, a quarter at 240 bpm lasts 250 ms
        playback.start(240.0, engine.render_handle());
        thread::sleep(Duration::from_millis(100));
        playback.stop();

        let steps = playback
            .poll_events()
            .into_iter()
            .filter(|e| matches!(e, PlaybackEvent::StepAdvanced(_)))
            .count();
        assert_eq!(steps, 1);
        assert!(!playback.is_running());
    }
}
