//! Hardware capabilities reached by actions, and the pin-level drivers behind them.
//!
//! Actions only see the capability traits ([`PatternOutput`], [`ToneOutput`],
//! [`PulsedOutput`]). The drivers in the submodules implement them as pure
//! logic over the two pin traits ([`DigitalOutput`], [`ToneDriver`]) so the
//! firmware and the emulator only have to provide the pins.

pub mod button;
pub mod buzzer;
pub mod led;
pub mod relay;
pub mod sensor;

pub use button::{Button, ButtonEvent, ButtonEvents};
pub use buzzer::{Melody, MelodyPlayer, Note, Volume};
pub use led::BlinkingLed;
pub use relay::PulsedRelay;
pub use sensor::{RedundantSensor, SensorState};

use crate::clock::Millis;

/// Indicator LEDs across both nodes.
///
/// The controller only fits [`OutputId::KeptOpen`] and
/// [`OutputId::Disconnected`]; the dashboard fits all five, numbered 1 to 5 in
/// declaration order for the strip animations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputId {
    Open,
    KeptOpen,
    Closing,
    AutoClosed,
    Disconnected,
}

impl OutputId {
    pub const COUNT: usize = 5;

    pub const ALL: [OutputId; Self::COUNT] = [
        OutputId::Open,
        OutputId::KeptOpen,
        OutputId::Closing,
        OutputId::AutoClosed,
        OutputId::Disconnected,
    ];

    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            OutputId::Open => 0,
            OutputId::KeptOpen => 1,
            OutputId::Closing => 2,
            OutputId::AutoClosed => 3,
            OutputId::Disconnected => 4,
        }
    }

    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OutputId::Open => "open",
            OutputId::KeptOpen => "kept-open",
            OutputId::Closing => "closing",
            OutputId::AutoClosed => "auto-closed",
            OutputId::Disconnected => "disconnected",
        }
    }
}

/// Door motor relays on the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RelayId {
    Door1,
    Door2,
}

impl RelayId {
    pub const COUNT: usize = 2;

    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            RelayId::Door1 => 0,
            RelayId::Door2 => 1,
        }
    }
}

/// Longest on/off sequence an [`LedPattern`] can hold.
pub const MAX_PATTERN_STEPS: usize = 16;

/// Alternating on/off durations in milliseconds, starting with "on".
///
/// A leading zero with more steps following starts the pattern unlit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LedPattern {
    durations: [u16; MAX_PATTERN_STEPS],
    count: usize,
}

impl LedPattern {
    /// Builds a pattern from the given durations; extra steps are dropped.
    #[must_use]
    pub const fn new(steps: &[u16]) -> Self {
        let mut durations = [0; MAX_PATTERN_STEPS];
        let count = if steps.len() < MAX_PATTERN_STEPS {
            steps.len()
        } else {
            MAX_PATTERN_STEPS
        };

        let mut index = 0;
        while index < count {
            durations[index] = steps[index];
            index += 1;
        }

        Self { durations, count }
    }

    #[must_use]
    pub fn steps(&self) -> &[u16] {
        &self.durations[..self.count]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Duration of one full pass through the pattern.
    #[must_use]
    pub const fn total_ms(&self) -> u32 {
        let mut total = 0u32;
        let mut index = 0;
        while index < self.count {
            total += self.durations[index] as u32;
            index += 1;
        }
        total
    }

    #[must_use]
    pub const fn step(&self, index: usize) -> u16 {
        if index < self.count {
            self.durations[index]
        } else {
            0
        }
    }
}

/// Two complementary patterns lighting a pair of LEDs in turn.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AlternatingBlink {
    pub first: LedPattern,
    pub second: LedPattern,
}

impl AlternatingBlink {
    /// Each LED stays lit `period_ms` before handing over to the other one.
    #[must_use]
    pub const fn new(period_ms: u16) -> Self {
        Self {
            first: LedPattern::new(&[period_ms, period_ms]),
            second: LedPattern::new(&[0, period_ms, period_ms]),
        }
    }
}

/// Binary output that can also run a blinking pattern.
pub trait PatternOutput {
    /// Sets the output level and cancels any running pattern.
    fn set(&mut self, lit: bool);

    /// Starts `pattern`; a no-op when that same pattern is already running.
    fn blink(&mut self, pattern: &'static LedPattern, now: Millis);

    fn is_lit(&self) -> bool;

    fn turn_on(&mut self) {
        self.set(true);
    }

    fn turn_off(&mut self) {
        self.set(false);
    }
}

/// Melody playback capability.
pub trait ToneOutput {
    fn play(&mut self, melody: &'static Melody, now: Millis);

    fn stop(&mut self);

    fn set_volume(&mut self, volume: Volume);
}

/// Output powered for a bounded duration.
pub trait PulsedOutput {
    fn power_on_for(&mut self, duration_ms: u32, now: Millis);

    fn power_off(&mut self);

    fn is_powered(&self) -> bool;
}

/// Single GPIO output line.
pub trait DigitalOutput {
    fn set_level(&mut self, high: bool);
}

/// Square-wave generator behind a buzzer.
pub trait ToneDriver {
    /// Starts a tone at `frequency_hz`, with `volume` from 1 to 10.
    fn tone(&mut self, frequency_hz: u16, volume: u8);

    fn silence(&mut self);
}

/// Pin that ignores every write.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPin;

impl DigitalOutput for NoopPin {
    fn set_level(&mut self, _high: bool) {}
}

impl ToneDriver for NoopPin {
    fn tone(&mut self, _frequency_hz: u16, _volume: u8) {}

    fn silence(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_total_sums_every_step() {
        let pattern = LedPattern::new(&[0, 200, 400, 200, 400, 200, 2_000]);

        assert_eq!(pattern.len(), 7);
        assert_eq!(pattern.total_ms(), 3_400);
        assert_eq!(pattern.step(7), 0);
    }

    #[test]
    fn alternating_blink_starts_second_output_unlit() {
        let alternating = AlternatingBlink::new(300);

        assert_eq!(alternating.first.steps(), &[300, 300]);
        assert_eq!(alternating.second.steps(), &[0, 300, 300]);
    }

    #[test]
    fn output_ids_round_trip_through_index() {
        for output in OutputId::ALL {
            assert_eq!(OutputId::from_index(output.as_index()), Some(output));
        }
        assert_eq!(OutputId::from_index(OutputId::COUNT), None);
    }
}
