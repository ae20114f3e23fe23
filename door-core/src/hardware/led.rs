//! LED driver stepping through [`LedPattern`]s from the control loop.

use core::ptr;

use super::{DigitalOutput, LedPattern, PatternOutput};
use crate::clock::{Deadline, Millis};

/// LED on a digital pin, either steady or blinking.
///
/// Even pattern indices are lit, odd ones unlit. A step ends once its
/// duration has strictly passed.
pub struct BlinkingLed<P> {
    pin: P,
    lit: bool,
    pattern: Option<&'static LedPattern>,
    index: usize,
    step: Deadline,
}

impl<P: DigitalOutput> BlinkingLed<P> {
    /// Wraps `pin` and drives it low.
    #[must_use]
    pub fn new(mut pin: P) -> Self {
        pin.set_level(false);
        Self {
            pin,
            lit: false,
            pattern: None,
            index: 0,
            step: Deadline::after(Millis::ZERO, 0),
        }
    }

    #[must_use]
    pub fn is_blinking(&self) -> bool {
        self.pattern.is_some()
    }

    #[must_use]
    pub fn pin(&self) -> &P {
        &self.pin
    }

    /// Advances the running pattern, if any.
    pub fn poll(&mut self, now: Millis) {
        let Some(pattern) = self.pattern else {
            return;
        };
        if !self.step.has_passed(now) {
            return;
        }

        self.index = (self.index + 1) % pattern.len();
        self.step = Deadline::after(now, u32::from(pattern.step(self.index)));
        self.write(self.index % 2 == 0);
    }

    fn write(&mut self, lit: bool) {
        self.lit = lit;
        self.pin.set_level(lit);
    }
}

impl<P: DigitalOutput> PatternOutput for BlinkingLed<P> {
    fn set(&mut self, lit: bool) {
        self.pattern = None;
        self.write(lit);
    }

    fn blink(&mut self, pattern: &'static LedPattern, now: Millis) {
        if self.pattern.is_some_and(|current| ptr::eq(current, pattern)) {
            return;
        }
        if pattern.is_empty() {
            self.set(false);
            return;
        }

        self.pattern = Some(pattern);
        self.index = if pattern.step(0) == 0 && pattern.len() > 1 {
            1
        } else {
            0
        };
        self.step = Deadline::after(now, u32::from(pattern.step(self.index)));
        self.write(self.index == 0);
    }

    fn is_lit(&self) -> bool {
        self.lit
    }
}
