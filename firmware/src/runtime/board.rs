//! Pin, buzzer and flash adapters for the STM32G0B1 board.

#[cfg(not(feature = "dashboard"))]
use door_core::controller::ControllerInputs;
#[cfg(feature = "dashboard")]
use door_core::dashboard::DashboardInputs;
use door_core::hardware::{DigitalOutput, ToneDriver};
use embassy_stm32::flash::{Blocking, Error as FlashError, Flash};
use embassy_stm32::gpio::{Input, Level, Output};
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::SimplePwm;

use crate::store::{FlashStore, PageFlash, STORE_BYTES};

/// Erase unit of the STM32G0B1.
const SETTINGS_PAGE_SIZE: u32 = 2 * 1024;
/// Last page of the 512 KiB of flash.
const SETTINGS_PAGE_OFFSET: u32 = 512 * 1024 - SETTINGS_PAGE_SIZE;

/// Loudest duty cycle is half the period; volume 10 maps onto it.
const DUTY_DENOMINATOR: u16 = 20;

pub struct GpioOutput(Output<'static>);

impl GpioOutput {
    pub fn new(output: Output<'static>) -> Self {
        Self(output)
    }
}

impl DigitalOutput for GpioOutput {
    fn set_level(&mut self, high: bool) {
        self.0.set_level(if high { Level::High } else { Level::Low });
    }
}

/// Piezo buzzer on TIM3 channel 1.
pub struct PwmBuzzer {
    pwm: SimplePwm<'static, TIM3>,
}

impl PwmBuzzer {
    pub fn new(pwm: SimplePwm<'static, TIM3>) -> Self {
        let mut buzzer = Self { pwm };
        buzzer.silence();
        buzzer
    }
}

impl ToneDriver for PwmBuzzer {
    fn tone(&mut self, frequency_hz: u16, volume: u8) {
        if frequency_hz == 0 || volume == 0 {
            self.silence();
            return;
        }
        self.pwm.set_frequency(Hertz(u32::from(frequency_hz)));
        let mut channel = self.pwm.ch1();
        channel.set_duty_cycle_fraction(u16::from(volume.min(10)), DUTY_DENOMINATOR);
        channel.enable();
    }

    fn silence(&mut self) {
        self.pwm.ch1().disable();
    }
}

/// The flash page holding the node settings.
pub struct SettingsPage {
    flash: Flash<'static, Blocking>,
}

impl SettingsPage {
    pub fn new(flash: Flash<'static, Blocking>) -> Self {
        Self { flash }
    }
}

impl PageFlash for SettingsPage {
    type Error = FlashError;

    fn read(&mut self, bytes: &mut [u8]) -> Result<(), FlashError> {
        self.flash.blocking_read(SETTINGS_PAGE_OFFSET, bytes)
    }

    fn erase(&mut self) -> Result<(), FlashError> {
        self.flash
            .blocking_erase(SETTINGS_PAGE_OFFSET, SETTINGS_PAGE_OFFSET + SETTINGS_PAGE_SIZE)
    }

    fn program(&mut self, bytes: &[u8]) -> Result<(), FlashError> {
        self.flash.blocking_write(SETTINGS_PAGE_OFFSET, bytes)
    }
}

pub type NodeStore = FlashStore<SettingsPage, STORE_BYTES>;

/// Opens the settings page, falling back to defaults when it cannot be read.
pub fn open_store(flash: Flash<'static, Blocking>) -> NodeStore {
    match NodeStore::open(SettingsPage::new(flash)) {
        Ok(store) => store,
        Err((page, error)) => {
            defmt::warn!("settings: flash read failed: {}", defmt::Debug2Format(&error));
            NodeStore::erased(page)
        }
    }
}

/// Door contacts and keep-open button; all close to ground.
#[cfg(not(feature = "dashboard"))]
pub struct ControllerInputPins {
    pub door_contact_a: Input<'static>,
    pub door_contact_b: Input<'static>,
    pub keep_open_button: Input<'static>,
}

#[cfg(not(feature = "dashboard"))]
impl ControllerInputPins {
    pub fn read(&self) -> ControllerInputs {
        ControllerInputs {
            door_contact_a: self.door_contact_a.is_low(),
            door_contact_b: self.door_contact_b.is_low(),
            keep_open_button: self.keep_open_button.is_low(),
        }
    }
}

/// Dashboard buttons; all close to ground.
#[cfg(feature = "dashboard")]
pub struct DashboardInputPins {
    pub keep_open_button: Input<'static>,
    pub close_button: Input<'static>,
    pub ack_button: Input<'static>,
}

#[cfg(feature = "dashboard")]
impl DashboardInputPins {
    pub fn read(&self) -> DashboardInputs {
        DashboardInputs {
            keep_open_button: self.keep_open_button.is_low(),
            close_button: self.close_button.is_low(),
            ack_button: self.ack_button.is_low(),
        }
    }
}
