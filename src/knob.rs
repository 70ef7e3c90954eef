/// Drag-gesture knob: turns pointer movement into a bounded value
use crate::range::RangeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnobControlType {
    Horizontal,
    Vertical,
    #[default]
    HorizontalAndVertical,
    Rotary,
}

impl KnobControlType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Some(Self::Horizontal),
            "vertical" => Some(Self::Vertical),
            "horizontal-and-vertical" | "both" => Some(Self::HorizontalAndVertical),
            "rotary" => Some(Self::Rotary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Began,
    Changed,
    Ended,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnobControl {
    minimum: f64,
    maximum: f64,
    value: f64,
    /// Report every change while dragging, not only when the drag ends
    pub continuous: bool,
    pub control_type: KnobControlType,
}

impl KnobControl {
    pub fn new() -> Self {
        Self {
            minimum: 0.0,
            maximum: 1.0,
            value: 0.5,
            continuous: true,
            control_type: KnobControlType::default(),
        }
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.value = value.clamp(self.minimum, self.maximum);
    }

    /// Changes the bounds; the current value is pulled inside them.
    pub fn set_range(&mut self, minimum: f64, maximum: f64) -> Result<(), RangeError> {
        if !minimum.is_finite() || !maximum.is_finite() {
            return Err(RangeError::NotFinite);
        }
        if minimum == maximum {
            return Err(RangeError::DegenerateRange);
        }
        self.minimum = minimum.min(maximum);
        self.maximum = minimum.max(maximum);
        self.set_value(self.value);
        Ok(())
    }

    /// Applies a drag, `dx`/`dy` as fractions of the control size.
    ///
    /// Dragging right or up increases the value. Returns the value to report,
    /// which for a non-continuous knob only happens when the gesture finishes.
    pub fn drag(&mut self, dx: f64, dy: f64, phase: GesturePhase) -> Option<f64> {
        let span = self.maximum - self.minimum;
        let delta = match self.control_type {
            KnobControlType::Horizontal => dx * span,
            KnobControlType::Vertical => -dy * span,
            KnobControlType::HorizontalAndVertical => dx * span - dy * span,
            KnobControlType::Rotary => 0.0,
        };
        self.set_value(self.value + delta);

        let finished = matches!(phase, GesturePhase::Ended | GesturePhase::Cancelled);
        (self.continuous || finished).then_some(self.value)
    }
}

impl Default for KnobControl {
    fn default() -> Self {
        Self::new()
    }
}
