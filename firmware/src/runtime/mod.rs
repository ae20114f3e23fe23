use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use door_core::clock::Millis;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pull, Speed};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_time::Instant;

use crate::link::NodeLinkQueue;

mod board;
mod control_task;
mod link_task;

use board::{GpioOutput, PwmBuzzer};

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static LINK_QUEUE: NodeLinkQueue = NodeLinkQueue::new();

/// Node clock; wraps like the core's `Millis`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn now() -> Millis {
    Millis::new(Instant::now().as_millis() as u32)
}

fn output(pin: Peri<'static, impl hal::gpio::Pin>) -> GpioOutput {
    GpioOutput::new(Output::new(pin, Level::Low, Speed::Low))
}

fn button(pin: Peri<'static, impl hal::gpio::Pin>) -> Input<'static> {
    Input::new(pin, Pull::Up)
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let p = hal::init(hal::Config::default());

    // No task runs and no output is driven until the link is up, so a node
    // without a link never acts on the door.
    let uart = match link_task::open_uart(p.USART5, p.PB0, p.PB1) {
        Ok(uart) => uart,
        Err(error) => {
            defmt::error!(
                "link: UART init failed, halting: {}",
                defmt::Debug2Format(&error)
            );
            loop {
                cortex_m::asm::wfi();
            }
        }
    };

    let buzzer = PwmBuzzer::new(SimplePwm::new(
        p.TIM3,
        Some(PwmPin::new(p.PA6, OutputType::PushPull)),
        None,
        None,
        None,
        Hertz::khz(2),
        CountingMode::EdgeAlignedUp,
    ));
    let store = board::open_store(Flash::new_blocking(p.FLASH));

    #[cfg(not(feature = "dashboard"))]
    let (node, inputs) = {
        use door_core::controller::{ControllerConfig, ControllerPins};

        let inputs = board::ControllerInputPins {
            door_contact_a: button(p.PA0),
            door_contact_b: button(p.PA1),
            keep_open_button: button(p.PA4),
        };
        let pins = ControllerPins {
            kept_open_led: output(p.PB3),
            disconnected_led: output(p.PB4),
            door_relay_1: output(p.PB5),
            door_relay_2: output(p.PB6),
            buzzer,
        };
        let node = control_task::Node::new(
            pins,
            store,
            ControllerConfig::default(),
            inputs.read(),
            now(),
        );
        (node, inputs)
    };

    #[cfg(feature = "dashboard")]
    let (node, inputs) = {
        use door_core::dashboard::{DashboardConfig, DashboardPins};

        let inputs = board::DashboardInputPins {
            keep_open_button: button(p.PA0),
            close_button: button(p.PA1),
            ack_button: button(p.PA4),
        };
        let pins = DashboardPins {
            open_led: output(p.PB3),
            kept_open_led: output(p.PB4),
            closing_led: output(p.PB5),
            auto_closed_led: output(p.PB6),
            disconnected_led: output(p.PB7),
            buzzer,
        };
        let node = control_task::Node::new(
            pins,
            store,
            DashboardConfig::default(),
            inputs.read(),
            now(),
        );
        (node, inputs)
    };

    spawner
        .spawn(link_task::run(&LINK_QUEUE, uart))
        .expect("failed to spawn link task");

    spawner
        .spawn(control_task::run(node, inputs, &LINK_QUEUE))
        .expect("failed to spawn control task");

    core::future::pending::<()>().await;
}
