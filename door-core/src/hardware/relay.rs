//! Relay powered for a bounded time.

use super::{DigitalOutput, PulsedOutput};
use crate::clock::{Deadline, Millis};

pub struct PulsedRelay<P> {
    pin: P,
    release: Option<Deadline>,
}

impl<P: DigitalOutput> PulsedRelay<P> {
    /// Wraps `pin` with the relay released.
    #[must_use]
    pub fn new(mut pin: P) -> Self {
        pin.set_level(false);
        Self { pin, release: None }
    }

    #[must_use]
    pub fn pin(&self) -> &P {
        &self.pin
    }

    /// Releases the relay once its pulse has strictly elapsed.
    pub fn poll(&mut self, now: Millis) {
        if self.release.is_some_and(|deadline| deadline.has_passed(now)) {
            self.power_off();
        }
    }
}

impl<P: DigitalOutput> PulsedOutput for PulsedRelay<P> {
    fn power_on_for(&mut self, duration_ms: u32, now: Millis) {
        self.release = Some(Deadline::after(now, duration_ms));
        self.pin.set_level(true);
    }

    fn power_off(&mut self) {
        self.release = None;
        self.pin.set_level(false);
    }

    fn is_powered(&self) -> bool {
        self.release.is_some()
    }
}
