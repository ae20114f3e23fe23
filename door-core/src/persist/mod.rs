//! Settings that survive a restart, stored one byte per setting.
//!
//! Stored values are sentinels that mix ones and zeros, so bytes left behind
//! by a previously flashed program read back as "unset" rather than as a
//! valid setting.

use core::fmt;

use crate::clock::Millis;
use crate::hardware::Volume;
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};

/// Byte-addressed non-volatile storage.
pub trait ByteStore {
    type Error: fmt::Debug;

    /// Reads the byte at `address`; unwritten cells read as erased.
    fn read(&self, address: u16) -> u8;

    /// Writes `value` unless the cell already holds it.
    fn update(&mut self, address: u16, value: u8) -> Result<(), Self::Error>;
}

/// Value an erased cell reads back as.
pub const ERASED: u8 = 0xFF;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StoreError {
    OutOfRange,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// RAM-backed store for host builds and tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryStore<const N: usize> {
    bytes: [u8; N],
    writes: u32,
}

impl<const N: usize> MemoryStore<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: [ERASED; N],
            writes: 0,
        }
    }

    /// Cell writes performed so far; unchanged values are not written.
    #[must_use]
    pub const fn writes(&self) -> u32 {
        self.writes
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl<const N: usize> Default for MemoryStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ByteStore for MemoryStore<N> {
    type Error = StoreError;

    fn read(&self, address: u16) -> u8 {
        self.bytes
            .get(usize::from(address))
            .copied()
            .unwrap_or(ERASED)
    }

    fn update(&mut self, address: u16, value: u8) -> Result<(), Self::Error> {
        let cell = self
            .bytes
            .get_mut(usize::from(address))
            .ok_or(StoreError::OutOfRange)?;
        if *cell != value {
            *cell = value;
            self.writes = self.writes.saturating_add(1);
        }
        Ok(())
    }
}

/// Records a failed write; the setting stays applied in memory.
pub fn report_write<T, E, const N: usize>(
    result: Result<T, E>,
    telemetry: &mut TelemetryRecorder<N>,
    now: Millis,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(_) => {
            telemetry.record(
                TelemetryEventKind::StoreWriteFailed,
                TelemetryPayload::none(),
                now,
            );
            None
        }
    }
}

pub const AUTO_CLOSE_ADDRESS: u16 = 0;
pub const AUTO_CLOSED_VALUE: u8 = 0b1001_1001;
const NOT_AUTO_CLOSED_VALUE: u8 = 0;

/// Remembers that the door closed by itself until someone acknowledges it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AutoCloseFeedback {
    auto_closed: bool,
}

impl AutoCloseFeedback {
    #[must_use]
    pub fn load<S: ByteStore>(store: &S) -> Self {
        Self {
            auto_closed: store.read(AUTO_CLOSE_ADDRESS) == AUTO_CLOSED_VALUE,
        }
    }

    #[must_use]
    pub const fn is_auto_closed(&self) -> bool {
        self.auto_closed
    }

    /// Sets the flag, then persists it. The flag stays set if the write fails.
    pub fn register_successful_auto_close<S: ByteStore>(
        &mut self,
        store: &mut S,
    ) -> Result<(), S::Error> {
        self.auto_closed = true;
        store.update(AUTO_CLOSE_ADDRESS, AUTO_CLOSED_VALUE)
    }

    pub fn acknowledge<S: ByteStore>(&mut self, store: &mut S) -> Result<(), S::Error> {
        self.auto_closed = false;
        store.update(AUTO_CLOSE_ADDRESS, NOT_AUTO_CLOSED_VALUE)
    }
}

pub const VOLUME_ADDRESS: u16 = 1;
pub const VOLUME_BASE_VALUE: u8 = 0b0101_0110;

/// Buzzer volumes selectable from the dashboard, quietest first.
pub const DASHBOARD_VOLUME_STEPS: [Volume; 6] = [
    Volume::OFF,
    Volume::new(1),
    Volume::new(4),
    Volume::new(7),
    Volume::new(9),
    Volume::new(10),
];
pub const DEFAULT_VOLUME_STEP: u8 = 1;

/// Persisted position within a list of volume steps.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VolumeSteps {
    steps: &'static [Volume],
    step: u8,
}

impl VolumeSteps {
    /// Restores the stored step, falling back to `default_step` when the
    /// cell holds anything outside the valid range.
    #[must_use]
    pub fn load<S: ByteStore>(store: &S, steps: &'static [Volume], default_step: u8) -> Self {
        let count = step_count(steps);
        let stored = store.read(VOLUME_ADDRESS).wrapping_sub(VOLUME_BASE_VALUE);
        let step = if stored < count {
            stored
        } else {
            default_step.min(count.saturating_sub(1))
        };

        Self { steps, step }
    }

    #[must_use]
    pub const fn step(&self) -> u8 {
        self.step
    }

    #[must_use]
    pub fn count(&self) -> u8 {
        step_count(self.steps)
    }

    #[must_use]
    pub fn volume(&self) -> Volume {
        self.steps
            .get(usize::from(self.step))
            .copied()
            .unwrap_or(Volume::OFF)
    }

    /// Moves one step up, wrapping to the quietest.
    ///
    /// `Ok(true)` when the step changed. On `Err` the step changed but was not
    /// persisted.
    pub fn increase<S: ByteStore>(&mut self, store: &mut S) -> Result<bool, S::Error> {
        let count = self.count();
        if count == 0 {
            return Ok(false);
        }
        self.change_to((self.step + 1) % count, store)
    }

    /// Moves one step down, wrapping to the loudest.
    pub fn decrease<S: ByteStore>(&mut self, store: &mut S) -> Result<bool, S::Error> {
        let count = self.count();
        if count == 0 {
            return Ok(false);
        }
        let below = if self.step == 0 { count } else { self.step };
        self.change_to(below - 1, store)
    }

    fn change_to<S: ByteStore>(&mut self, step: u8, store: &mut S) -> Result<bool, S::Error> {
        if step == self.step {
            return Ok(false);
        }
        self.step = step;
        store.update(VOLUME_ADDRESS, VOLUME_BASE_VALUE.wrapping_add(step))?;
        Ok(true)
    }
}

fn step_count(steps: &[Volume]) -> u8 {
    u8::try_from(steps.len()).unwrap_or(u8::MAX)
}
