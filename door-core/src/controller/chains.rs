//! Action chains played by the controller on each state entry.

use crate::chain::{Action, ActionChain, ActionContext};
use crate::clock::{MINUTE_MS, Millis, SECOND_MS};
use crate::hardware::buzzer::pitch;
use crate::hardware::{Melody, Note, OutputId, RelayId};
use crate::link::DoorState;

use super::ControllerEvent;

/// Time the door may stay open before the closing warnings start.
pub const OPEN_DURATION_MS: u32 = 10 * MINUTE_MS;
pub const OPEN_DURATION_DEMO_MS: u32 = 10 * SECOND_MS;

/// Warning period between the first warning and the automatic close.
pub const WILL_CLOSE_SOON_DURATION_MS: u32 = 2 * MINUTE_MS;
pub const WILL_CLOSE_SOON_DURATION_DEMO_MS: u32 = 10 * SECOND_MS;
pub const WILL_CLOSE_SOON_WARNINGS: u16 = 2;

/// Relay pulse driving the door motor.
pub const RELAY_PULSE_MS: u32 = 1_000;
/// Gap between the two relays so they never draw current together.
pub const RELAY_STAGGER_MS: u32 = 150;
/// A full door travel takes about 20 s.
pub const CLOSING_RETRY_DELAY_MS: u32 = 25 * SECOND_MS;
pub const CLOSING_RETRY_DELAY_DEMO_MS: u32 = 5 * SECOND_MS;
/// At least two attempts: a door stopped mid-way first re-opens, then closes.
pub const CLOSING_ATTEMPTS: u16 = 4;

pub static WILL_CLOSE_SOON_MELODY: Melody = Melody::new(
    "will-close-soon",
    &[
        Note::new(pitch::E5, 200),
        Note::rest(50),
        Note::new(pitch::E5, 200),
        Note::rest(50),
        Note::new(pitch::E5, 200),
        Note::rest(50),
    ],
);

fn start_will_close_soon(ctx: &mut dyn ActionContext<ControllerEvent>, _now: Millis) {
    ctx.raise(ControllerEvent::StartWillCloseSoon);
}

fn start_auto_close(ctx: &mut dyn ActionContext<ControllerEvent>, _now: Millis) {
    ctx.raise(ControllerEvent::StartAutoClose);
}

fn start_closing_failed(ctx: &mut dyn ActionContext<ControllerEvent>, _now: Millis) {
    ctx.raise(ControllerEvent::StartClosingFailed);
}

// States without effects still get a one-action table: zero-sized statics
// are not guaranteed distinct addresses, and chains compare by address.
static ANOMALY_ACTIONS: [Action<ControllerEvent>; 1] = [Action::Noop];

static CLOSED_ACTIONS: [Action<ControllerEvent>; 1] = [Action::Noop];

static OPEN_ACTIONS: [Action<ControllerEvent>; 2] = [
    Action::DemoAwareWait {
        normal: OPEN_DURATION_MS,
        demo: OPEN_DURATION_DEMO_MS,
    },
    Action::Run(start_will_close_soon),
];

static WILL_CLOSE_SOON_ACTIONS: [Action<ControllerEvent>; 5] = [
    Action::LoopBegin(WILL_CLOSE_SOON_WARNINGS),
    Action::StartMelody {
        melody: &WILL_CLOSE_SOON_MELODY,
        main_transition: false,
    },
    Action::DemoAwareWait {
        normal: WILL_CLOSE_SOON_DURATION_MS / WILL_CLOSE_SOON_WARNINGS as u32,
        demo: WILL_CLOSE_SOON_DURATION_DEMO_MS / WILL_CLOSE_SOON_WARNINGS as u32,
    },
    Action::LoopEnd,
    Action::Run(start_auto_close),
];

static CLOSING_ACTIONS: [Action<ControllerEvent>; 7] = [
    Action::LoopBegin(CLOSING_ATTEMPTS),
    Action::PulseRelay(RelayId::Door1, RELAY_PULSE_MS),
    Action::Wait(RELAY_STAGGER_MS),
    Action::PulseRelay(RelayId::Door2, RELAY_PULSE_MS),
    Action::DemoAwareWait {
        normal: CLOSING_RETRY_DELAY_MS,
        demo: CLOSING_RETRY_DELAY_DEMO_MS,
    },
    Action::LoopEnd,
    Action::Run(start_closing_failed),
];

static CLOSING_FAILED_ACTIONS: [Action<ControllerEvent>; 1] = [Action::Noop];

static KEPT_OPEN_ACTIONS: [Action<ControllerEvent>; 1] = [Action::TurnOn(OutputId::KeptOpen)];

/// Chain started when the controller enters `state`.
#[must_use]
pub fn chain_for(state: DoorState) -> ActionChain<ControllerEvent> {
    let actions: &'static [Action<ControllerEvent>] = match state {
        DoorState::Anomaly => &ANOMALY_ACTIONS,
        DoorState::Closed => &CLOSED_ACTIONS,
        DoorState::Open => &OPEN_ACTIONS,
        DoorState::KeptOpen => &KEPT_OPEN_ACTIONS,
        DoorState::WillCloseSoon => &WILL_CLOSE_SOON_ACTIONS,
        DoorState::Closing => &CLOSING_ACTIONS,
        DoorState::ClosingFailed => &CLOSING_FAILED_ACTIONS,
    };
    ActionChain::new(state.as_index(), state.name(), actions)
}
