//! Pair of door contacts that must agree.

use super::button::{Button, ButtonEvent};
use crate::clock::{Deadline, Millis};

/// Contacts may disagree this long before the disagreement becomes an anomaly.
pub const ANOMALY_GRACE_MS: u32 = 1_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorState {
    Unpressed,
    Pressed,
    DisagreeingTemporarily,
    /// Sticky until [`RedundantSensor::try_clear_anomaly`] succeeds.
    Anomaly,
}

/// Two debounced contacts watching the same door.
#[derive(Clone, Debug)]
pub struct RedundantSensor {
    first: Button,
    second: Button,
    anomaly: bool,
    anomaly_due: Option<Deadline>,
}

impl RedundantSensor {
    #[must_use]
    pub fn new(first_pressed: bool, second_pressed: bool, now: Millis) -> Self {
        let mut sensor = Self {
            first: Button::new(first_pressed, now),
            second: Button::new(second_pressed, now),
            anomaly: false,
            anomaly_due: None,
        };
        sensor.arm_anomaly(now);
        sensor
    }

    #[must_use]
    pub fn state(&self) -> SensorState {
        if self.anomaly {
            return SensorState::Anomaly;
        }

        match (self.first.is_pressed(), self.second.is_pressed()) {
            (true, true) => SensorState::Pressed,
            (false, false) => SensorState::Unpressed,
            _ => SensorState::DisagreeingTemporarily,
        }
    }

    /// Samples both contacts and returns the new state when it changed.
    pub fn poll(&mut self, first: bool, second: bool, now: Millis) -> Option<SensorState> {
        let first_changed = has_changed(&mut self.first, first, now);
        let second_changed = has_changed(&mut self.second, second, now);

        let mut report = None;
        if (first_changed || second_changed) && !self.anomaly {
            self.arm_anomaly(now);
            report = Some(self.state());
        }

        if let Some(due) = self.anomaly_due
            && due.is_reached(now)
        {
            self.anomaly_due = None;
            if !self.anomaly {
                self.anomaly = true;
                report = Some(SensorState::Anomaly);
            }
        }

        report
    }

    /// Leaves the anomaly state if both contacts agree again.
    pub fn try_clear_anomaly(&mut self) -> Option<SensorState> {
        if self.anomaly && self.first.is_pressed() == self.second.is_pressed() {
            self.anomaly = false;
            return Some(self.state());
        }
        None
    }

    fn arm_anomaly(&mut self, now: Millis) {
        self.anomaly_due = if self.first.is_pressed() == self.second.is_pressed() {
            None
        } else {
            Some(Deadline::after(now, ANOMALY_GRACE_MS))
        };
    }
}

fn has_changed(contact: &mut Button, reading: bool, now: Millis) -> bool {
    contact
        .poll(reading, now)
        .iter()
        .any(|event| matches!(event, ButtonEvent::Changed(_)))
}
