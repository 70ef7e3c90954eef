use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::knob::{KnobControl, KnobControlType};
use crate::sequencer::{clamp_bpm, SequencerData};
use crate::theory::{ArpeggioType, NoteValue};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

pub const MAX_STEPS: usize = 64;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    knob: KnobConfig,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    bpm: Option<f32>,
    steps: Option<usize>,
    rate: Option<NoteValue>,
    arpeggio: Option<ArpeggioType>,
    midi_port: Option<String>,
}

#[derive(Deserialize, Default)]
struct KnobConfig {
    continuous: Option<bool>,
    control_type: Option<String>,
}

pub struct Config {
    defaults: DefaultsConfig,
    knob: KnobConfig,
}

impl Config {
    /// Embedded defaults overlaid with the user's config file, if any.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::embedded(),
        }
    }

    /// Embedded defaults overlaid with the file at `path`. Unreadable or
    /// malformed files are logged and skipped.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::embedded();
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => {
                    merge_defaults(&mut config.defaults, user.defaults);
                    merge_knob(&mut config.knob, user.knob);
                }
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    fn embedded() -> Self {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        Config {
            defaults: base.defaults,
            knob: base.knob,
        }
    }

    /// Tempo, clamped to 40..=240
    pub fn bpm(&self) -> f32 {
        clamp_bpm(self.defaults.bpm.unwrap_or(120.0))
    }

    /// Initial step count, clamped to 1..=64
    pub fn steps(&self) -> usize {
        self.defaults.steps.unwrap_or(8).clamp(1, MAX_STEPS)
    }

    pub fn rate(&self) -> NoteValue {
        match self.defaults.rate {
            Some(rate) if rate.rate_index().is_some() => rate,
            Some(rate) => {
                log::warn!(target: "config", "{:?} is not a global rate, using quarter", rate);
                NoteValue::Quarter
            }
            None => NoteValue::Quarter,
        }
    }

    pub fn arpeggio(&self) -> ArpeggioType {
        self.defaults.arpeggio.unwrap_or_default()
    }

    pub fn midi_port(&self) -> Option<&str> {
        self.defaults.midi_port.as_deref()
    }

    /// Fresh pattern built from the defaults.
    pub fn sequencer_data(&self) -> SequencerData {
        SequencerData::with_globals(self.steps(), self.rate(), self.arpeggio())
    }

    pub fn knob(&self) -> KnobControl {
        let mut knob = KnobControl::new();
        knob.continuous = self.knob.continuous.unwrap_or(true);
        knob.control_type = self
            .knob
            .control_type
            .as_deref()
            .and_then(KnobControlType::parse)
            .unwrap_or_default();
        knob
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stepsqnc").join("config.toml"))
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.steps.is_some() {
        base.steps = user.steps;
    }
    if user.rate.is_some() {
        base.rate = user.rate;
    }
    if user.arpeggio.is_some() {
        base.arpeggio = user.arpeggio;
    }
    if user.midi_port.is_some() {
        base.midi_port = user.midi_port;
    }
}

fn merge_knob(base: &mut KnobConfig, user: KnobConfig) {
    if user.continuous.is_some() {
        base.continuous = user.continuous;
    }
    if user.control_type.is_some() {
        base.control_type = user.control_type;
    }
}
