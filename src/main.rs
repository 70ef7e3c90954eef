#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use stepsqnc::{
    ArpeggioType, AudioEngine, AudioOutput, Config, GesturePhase, KnobControl, MidiOutputDevice,
    NoteValue, PlaybackEngine, PlaybackEvent, SequencerController, SequencerStepData,
    SharedEngine, StepPropertyType,
};

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    env_logger::init();
    log::info!("starting stepsqnc");

    let config = Config::load();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 600.0])
            .with_title("STEPSQNC - Step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "STEPSQNC",
        options,
        Box::new(move |_cc| Ok(Box::new(SequencerApp::new(&config)?))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
struct SequencerApp {
    controller: SequencerController<SharedEngine>,
    knob: KnobControl,
    audio_output: AudioOutput,
    midi_output: MidiOutputDevice,
    playback_engine: PlaybackEngine,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    current_visual_step: usize,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(config: &Config) -> Result<Self, stepsqnc::EngineError> {
        let data = config.sequencer_data();
        let engine = SharedEngine::from_data(&data);
        let mut controller = SequencerController::new(data, engine)?;
        controller.set_bpm(config.bpm());

        let mut midi_output = MidiOutputDevice::new();
        let selected_port = config.midi_port().and_then(|name| {
            midi_output
                .connect_by_name(name)
                .map_err(|e| log::warn!("MIDI port from config: {}", e))
                .ok()
        });

        let mut app = Self {
            controller,
            knob: config.knob(),
            audio_output: AudioOutput::default(),
            midi_output,
            playback_engine: PlaybackEngine::new(),
            available_midi_ports: MidiOutputDevice::available_ports(),
            selected_port,
            current_visual_step: 0,
        };
        app.sync_knob();
        Ok(app)
    }

    /// Moves the knob to the selected step's value.
    fn sync_knob(&mut self) {
        self.knob.set_value(self.controller.knob_value());
    }

    fn apply_knob(&mut self, value: f64) {
        if let Err(e) = self.controller.set_knob_value(value) {
            log::warn!("knob edit dropped: {}", e);
        }
    }

    fn handle_playback_events(&mut self) {
        let events = self.playback_engine.poll_events();

        for event in events {
            match event {
                PlaybackEvent::StepAdvanced(step) => {
                    self.current_visual_step = step;
                    continue;
                }
                PlaybackEvent::NoteOn(note, velocity) => {
                    self.audio_output.trigger_note(note, velocity);
                }
                PlaybackEvent::NoteOff(_) => {
                    self.audio_output.stop_note();
                }
                PlaybackEvent::PitchBend(value) => {
                    self.audio_output.bend(value);
                }
                PlaybackEvent::ControlChange(..) => {}
            }
            if let Err(e) = self.midi_output.send_event(&event) {
                log::warn!("{}", e);
            }
        }
    }

    fn start_playback(&mut self) {
        let handle = self.controller.engine().render_handle();
        self.playback_engine.start(self.controller.bpm(), handle);
    }

    fn stop_playback(&mut self) {
        self.playback_engine.stop();
        self.audio_output.stop_note();
        if let Err(e) = self.midi_output.all_notes_off() {
            log::warn!("{}", e);
        }
    }

    fn transport_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.playback_engine.is_running() {
                if ui.button("⏸ Stop").clicked() {
                    self.stop_playback();
                }
            } else if ui.button("▶ Play").clicked() {
                self.start_playback();
            }

            ui.add_space(20.0);

            ui.label("BPM:");
            let mut bpm = self.controller.bpm();
            let running = self.playback_engine.is_running();
            if ui
                .add_enabled(!running, egui::Slider::new(&mut bpm, 40.0..=240.0).step_by(1.0))
                .changed()
            {
                self.controller.set_bpm(bpm);
            }

            ui.add_space(20.0);

            let mut rate = self.controller.data().rate_index();
            egui::ComboBox::from_label("Rate")
                .selected_text(NoteValue::RATES[rate].name())
                .show_ui(ui, |ui| {
                    for (i, value) in NoteValue::RATES.iter().enumerate() {
                        ui.selectable_value(&mut rate, i, value.name());
                    }
                });
            if rate != self.controller.data().rate_index() {
                if let Err(e) = self.controller.set_rate_index(rate) {
                    log::warn!("{}", e);
                }
            }

            let mut arpeggio = self.controller.data().arpeggio_index();
            egui::ComboBox::from_label("Arpeggio")
                .selected_text(self.controller.data().arpeggio().name())
                .show_ui(ui, |ui| {
                    for arp in ArpeggioType::ALL {
                        ui.selectable_value(&mut arpeggio, arp.index(), arp.name());
                    }
                });
            if arpeggio != self.controller.data().arpeggio_index() {
                if let Err(e) = self.controller.set_arpeggio_index(arpeggio) {
                    log::warn!("{}", e);
                }
            }
        });
    }

    fn midi_ui(&mut self, ui: &mut egui::Ui) {
        let mut selected_port_changed = None;
        ui.horizontal(|ui| {
            ui.label("MIDI Output:");
            if self.available_midi_ports.is_empty() {
                ui.label("No MIDI ports available");
            } else {
                egui::ComboBox::from_id_source("midi_port")
                    .selected_text(
                        self.selected_port
                            .and_then(|i| self.available_midi_ports.get(i))
                            .map(String::as_str)
                            .unwrap_or("Select port..."),
                    )
                    .show_ui(ui, |ui| {
                        for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                            if ui
                                .selectable_label(self.selected_port == Some(i), port_name)
                                .clicked()
                            {
                                selected_port_changed = Some(i);
                            }
                        }
                    });
            }
        });

        if let Some(port_idx) = selected_port_changed {
            match self.midi_output.connect(port_idx) {
                Ok(()) => self.selected_port = Some(port_idx),
                Err(e) => log::warn!("{}", e),
            }
        }
    }

    fn property_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for property in StepPropertyType::ALL {
                let selected = self.controller.selected_property() == property;
                if ui.selectable_label(selected, property.name()).clicked() && !selected {
                    self.controller.select_property(property);
                    self.sync_knob();
                }
            }
        });
    }

    fn steps_ui(&mut self, ui: &mut egui::Ui) {
        let is_playing = self.playback_engine.is_running();
        let mut clicked = None;
        let mut toggled = None;

        ui.horizontal_wrapped(|ui| {
            for (i, step) in self.controller.data().steps().iter().enumerate() {
                let label = self.controller.step_label(i).unwrap_or_default();
                let is_current = is_playing && self.current_visual_step == i;
                let button_text = if is_current {
                    format!("● {}\n{}", i + 1, label)
                } else {
                    format!("{}\n{}", i + 1, label)
                };

                let button = egui::Button::new(button_text)
                    .min_size(egui::vec2(80.0, 60.0))
                    .selected(self.controller.selected_step() == i)
                    .fill(step_color(step, is_current));

                let response = ui.add(button);
                if response.double_clicked() {
                    toggled = Some(i);
                } else if response.clicked() {
                    clicked = Some(i);
                }
            }
        });

        if let Some(i) = toggled {
            if let Err(e) = self.controller.toggle_step(i) {
                log::warn!("{}", e);
            }
        }
        if let Some(i) = clicked {
            if self.controller.select_step(i).is_ok() {
                self.sync_knob();
            }
        }

        ui.horizontal(|ui| {
            if ui.button("+ Add step").clicked() {
                self.controller.add_step();
            }
            if ui.button("− Remove step").clicked() && self.controller.remove_step() {
                self.sync_knob();
            }
        });
    }

    fn knob_ui(&mut self, ui: &mut egui::Ui) {
        let property = self.controller.selected_property();
        ui.horizontal(|ui| {
            ui.label(format!(
                "Step {} {}:",
                self.controller.selected_step() + 1,
                property.name()
            ));

            let (rect, response) =
                ui.allocate_exact_size(egui::vec2(240.0, 28.0), egui::Sense::drag());
            let phase = if response.drag_started() {
                Some(GesturePhase::Began)
            } else if response.drag_stopped() {
                Some(GesturePhase::Ended)
            } else if response.dragged() {
                Some(GesturePhase::Changed)
            } else {
                None
            };
            if let Some(phase) = phase {
                let delta = response.drag_delta();
                let reported = self.knob.drag(
                    (delta.x / rect.width()) as f64,
                    (delta.y / rect.width()) as f64,
                    phase,
                );
                if let Some(value) = reported {
                    self.apply_knob(value);
                }
            }

            let painter = ui.painter();
            painter.rect_filled(rect, 4.0, egui::Color32::from_rgb(40, 40, 40));
            let mut filled = rect;
            filled.set_width(rect.width() * self.knob.value() as f32);
            painter.rect_filled(filled, 4.0, egui::Color32::from_rgb(60, 60, 200));

            let raw = property.item_value(self.knob.value());
            ui.label(property.label(raw));
        });
    }
}

#[cfg(feature = "gui")]
fn step_color(step: &SequencerStepData, is_current: bool) -> egui::Color32 {
    if is_current {
        egui::Color32::from_rgb(100, 200, 100)
    } else if step.is_enabled {
        egui::Color32::from_rgb(60, 60, 200)
    } else {
        egui::Color32::from_rgb(40, 40, 40)
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("STEPSQNC - Step Sequencer");
            ui.add_space(10.0);

            self.midi_ui(ui);
            ui.add_space(10.0);
            self.transport_ui(ui);
            ui.add_space(20.0);
            self.property_ui(ui);
            ui.add_space(10.0);
            self.steps_ui(ui);
            ui.add_space(10.0);
            self.knob_ui(ui);

            // Info
            ui.separator();
            ui.label("Click a step to edit it, double-click to enable/disable it");
            ui.label(format!(
                "Engine step: {}",
                self.controller.engine().sequencer_step_index() + 1
            ));
            if !self.midi_output.is_connected() {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No MIDI output connected - audio playback only",
                );
            }
        });
    }
}
