//! Dashboard feedback: LED patterns, melodies and the chains that play them.

use crate::chain::{Action, ActionChain, ActionContext};
use crate::clock::{HOUR_MS, MINUTE_MS, Millis, SECOND_MS};
use crate::hardware::buzzer::pitch;
use crate::hardware::{AlternatingBlink, LedPattern, Melody, Note, OutputId};
use crate::link::DoorState;

use super::{DashboardEvent, DashboardState};

/// Matches the controller's open duration; the reminder comes two minutes earlier.
pub const OPEN_REMINDER_DELAY_MS: u32 = 10 * MINUTE_MS - 2 * MINUTE_MS;
pub const OPEN_REMINDER_DELAY_DEMO_MS: u32 = 10 * SECOND_MS - 2 * SECOND_MS;

pub const KEPT_OPEN_TOO_LONG_MS: u32 = HOUR_MS;
pub const KEPT_OPEN_TOO_LONG_DEMO_MS: u32 = 10 * SECOND_MS;

pub const ANOMALY_BLINK_MS: u16 = 300;
pub const VOLUME_FEEDBACK_HOLD_MS: u32 = SECOND_MS;
pub const STRIP_FRAME_MS: u32 = 400;
pub const STRIP_FRAME_DEMO_MS: u32 = 75;
pub const MUTE_FRAME_MS: u32 = 200;

const WAITING_ID: u8 = 7;
const DISCONNECTED_ID: u8 = 8;
pub const VOLUME_FEEDBACK_ID: u8 = 9;
pub const DEMO_TOGGLE_ID: u8 = 10;
pub const MUTE_ON_ID: u8 = 11;
pub const MUTE_OFF_ID: u8 = 12;

pub static DISCONNECTED_PATTERN: LedPattern = LedPattern::new(&[200, 300, 200, 300, 300]);
pub static OPEN_FOR_TOO_LONG_PATTERN: LedPattern = LedPattern::new(&[400, 100]);
pub static WILL_AUTO_CLOSE_SOON_PATTERN: LedPattern = LedPattern::new(&[100, 50]);
/// Starts unlit, blinks three times, pauses lit, then blinks three times again.
pub static KEPT_OPEN_FOR_TOO_LONG_PATTERN: LedPattern = LedPattern::new(&[
    0, 200, 400, 200, 400, 200, 2_000, 200, 400, 200, 400, 200,
]);
pub static CLOSING_FAILED_PATTERN: LedPattern = LedPattern::new(&[100, 50]);
pub static ANOMALY_BLINK: AlternatingBlink = AlternatingBlink::new(ANOMALY_BLINK_MS);

pub static OPEN_MELODY: Melody = Melody::new(
    "open",
    &[
        Note::new(pitch::C3, 200),
        Note::new(pitch::D3, 200),
        Note::new(pitch::E3, 200),
    ],
);

pub static OPEN_FOR_TOO_LONG_MELODY: Melody = Melody::new(
    "open-for-too-long",
    &[
        Note::new(pitch::C4, 100),
        Note::new(pitch::D4, 100),
        Note::new(pitch::E4, 100),
        Note::rest(100),
        Note::new(pitch::C4, 100),
        Note::new(pitch::D4, 100),
        Note::new(pitch::E4, 100),
    ],
);

pub static CLOSING_MELODY: Melody = Melody::new(
    "closing",
    &[
        Note::new(pitch::E3, 200),
        Note::new(pitch::D3, 200),
        Note::new(pitch::C3, 200),
    ],
);

pub static CLOSED_MELODY: Melody = Melody::new(
    "closed",
    &[
        Note::new(pitch::C3, 300),
        Note::rest(100),
        Note::new(pitch::G2, 300),
    ],
);

pub static CLOSING_FAILED_MELODY: Melody = Melody::new(
    "closing-failed",
    &[
        Note::new(pitch::G4, 200),
        Note::rest(100),
        Note::new(pitch::DS4, 200),
        Note::rest(100),
        Note::new(pitch::B3, 200),
        Note::rest(100),
        Note::new(pitch::G4, 200),
    ],
);

pub static ANOMALY_MELODY: Melody = Melody::new(
    "anomaly",
    &[
        Note::new(pitch::B3, 200),
        Note::rest(100),
        Note::new(pitch::DS4, 200),
        Note::rest(100),
        Note::new(pitch::G4, 200),
        Note::rest(100),
        Note::new(pitch::B3, 200),
    ],
);

pub static KEPT_OPEN_MELODY: Melody = Melody::new(
    "kept-open",
    &[
        Note::new(pitch::C3, 200),
        Note::new(pitch::G3, 200),
        Note::new(pitch::C4, 200),
    ],
);

/// A low and a high note: loudness is perceived differently across pitches.
pub static VOLUME_FEEDBACK_MELODY: Melody = Melody::new(
    "volume-feedback",
    &[Note::new(pitch::C3, 200), Note::new(pitch::G4, 200)],
);

type DashboardAction = Action<DashboardEvent>;

const fn main_melody(melody: &'static Melody) -> DashboardAction {
    Action::StartMelody {
        melody,
        main_transition: true,
    }
}

fn finish_combo_feedback(ctx: &mut dyn ActionContext<DashboardEvent>, _now: Millis) {
    ctx.raise(DashboardEvent::ComboFeedbackFinished);
}

// One-action tables: zero-sized statics may share an address, and chains
// compare by address.
static WAITING_ACTIONS: [DashboardAction; 1] = [Action::Noop];

static DISCONNECTED_ACTIONS: [DashboardAction; 1] =
    [Action::Blink(OutputId::Disconnected, &DISCONNECTED_PATTERN)];

static ANOMALY_ACTIONS: [DashboardAction; 2] = [
    Action::AlternateBlink(OutputId::Open, OutputId::Closing, &ANOMALY_BLINK),
    main_melody(&ANOMALY_MELODY),
];

static CLOSED_ACTIONS: [DashboardAction; 1] = [main_melody(&CLOSED_MELODY)];

static OPEN_ACTIONS: [DashboardAction; 5] = [
    Action::TurnOn(OutputId::Open),
    main_melody(&OPEN_MELODY),
    Action::DemoAwareWait {
        normal: OPEN_REMINDER_DELAY_MS,
        demo: OPEN_REMINDER_DELAY_DEMO_MS,
    },
    Action::Blink(OutputId::Open, &OPEN_FOR_TOO_LONG_PATTERN),
    Action::StartMelody {
        melody: &OPEN_FOR_TOO_LONG_MELODY,
        main_transition: false,
    },
];

static WILL_CLOSE_SOON_ACTIONS: [DashboardAction; 2] = [
    Action::Blink(OutputId::Open, &WILL_AUTO_CLOSE_SOON_PATTERN),
    main_melody(&OPEN_FOR_TOO_LONG_MELODY),
];

static CLOSING_ACTIONS: [DashboardAction; 2] = [
    Action::TurnOn(OutputId::Closing),
    main_melody(&CLOSING_MELODY),
];

static CLOSING_FAILED_ACTIONS: [DashboardAction; 2] = [
    Action::Blink(OutputId::Closing, &CLOSING_FAILED_PATTERN),
    main_melody(&CLOSING_FAILED_MELODY),
];

static KEPT_OPEN_ACTIONS: [DashboardAction; 7] = [
    main_melody(&KEPT_OPEN_MELODY),
    Action::LoopBegin(0),
    Action::TurnOn(OutputId::KeptOpen),
    Action::DemoAwareWait {
        normal: KEPT_OPEN_TOO_LONG_MS,
        demo: KEPT_OPEN_TOO_LONG_DEMO_MS,
    },
    Action::Blink(OutputId::KeptOpen, &KEPT_OPEN_FOR_TOO_LONG_PATTERN),
    Action::Wait(KEPT_OPEN_FOR_TOO_LONG_PATTERN.total_ms()),
    Action::LoopEnd,
];

/// Chain started when the dashboard enters `state`.
#[must_use]
pub fn chain_for(state: DashboardState) -> ActionChain<DashboardEvent> {
    match state {
        DashboardState::WaitingFirstSignal => {
            ActionChain::new(WAITING_ID, "waiting-first-signal", &WAITING_ACTIONS)
        }
        DashboardState::Disconnected => {
            ActionChain::new(DISCONNECTED_ID, "disconnected", &DISCONNECTED_ACTIONS)
        }
        DashboardState::Door(door) => {
            let actions: &'static [DashboardAction] = match door {
                DoorState::Anomaly => &ANOMALY_ACTIONS,
                DoorState::Closed => &CLOSED_ACTIONS,
                DoorState::Open => &OPEN_ACTIONS,
                DoorState::KeptOpen => &KEPT_OPEN_ACTIONS,
                DoorState::WillCloseSoon => &WILL_CLOSE_SOON_ACTIONS,
                DoorState::Closing => &CLOSING_ACTIONS,
                DoorState::ClosingFailed => &CLOSING_FAILED_ACTIONS,
            };
            ActionChain::new(door.as_index(), door.name(), actions)
        }
    }
}

/// Feedback LEDs numbered 1 to 5 for strip animations.
pub static STRIP: [OutputId; OutputId::COUNT] = OutputId::ALL;

/// Lights `step + 2` LEDs from the right, then plays the feedback melody.
static VOLUME_FEEDBACK_ACTIONS: [DashboardAction; 8] = [
    Action::TurnOn(OutputId::Disconnected),
    Action::TurnOn(OutputId::AutoClosed),
    Action::TurnOn(OutputId::Closing),
    Action::TurnOn(OutputId::KeptOpen),
    Action::TurnOn(OutputId::Open),
    Action::StartMelody {
        melody: &VOLUME_FEEDBACK_MELODY,
        main_transition: false,
    },
    Action::Wait(VOLUME_FEEDBACK_HOLD_MS),
    Action::Run(finish_combo_feedback),
];

const LED_ACTIONS: usize = 5;

/// Feedback for volume `step`: one LED per step above silence.
///
/// Each step views a different tail of the same table, so every step is a
/// distinct chain.
#[must_use]
pub fn volume_feedback_chain(step: u8) -> ActionChain<DashboardEvent> {
    let skip = LED_ACTIONS.saturating_sub(usize::from(step));
    ActionChain::new(
        VOLUME_FEEDBACK_ID,
        "volume-feedback",
        &VOLUME_FEEDBACK_ACTIONS[skip..],
    )
}

const STRIP_FRAME_WAIT: DashboardAction = Action::DemoAwareWait {
    normal: STRIP_FRAME_MS,
    demo: STRIP_FRAME_DEMO_MS,
};

static DEMO_TOGGLE_ACTIONS: [DashboardAction; 11] = [
    Action::Strip(&STRIP, "O    "),
    STRIP_FRAME_WAIT,
    Action::Strip(&STRIP, " O   "),
    STRIP_FRAME_WAIT,
    Action::Strip(&STRIP, "  O  "),
    STRIP_FRAME_WAIT,
    Action::Strip(&STRIP, "   O "),
    STRIP_FRAME_WAIT,
    Action::Strip(&STRIP, "    O"),
    STRIP_FRAME_WAIT,
    Action::Run(finish_combo_feedback),
];

const MUTE_FRAME_WAIT: DashboardAction = Action::Wait(MUTE_FRAME_MS);

static MUTE_ON_ACTIONS: [DashboardAction; 9] = [
    Action::Strip(&STRIP, "OOOOO"),
    MUTE_FRAME_WAIT,
    Action::Strip(&STRIP, " OOO "),
    MUTE_FRAME_WAIT,
    Action::Strip(&STRIP, "  O  "),
    MUTE_FRAME_WAIT,
    Action::Strip(&STRIP, "     "),
    MUTE_FRAME_WAIT,
    Action::Run(finish_combo_feedback),
];

static MUTE_OFF_ACTIONS: [DashboardAction; 9] = [
    Action::Strip(&STRIP, "     "),
    MUTE_FRAME_WAIT,
    Action::Strip(&STRIP, "  O  "),
    MUTE_FRAME_WAIT,
    Action::Strip(&STRIP, " OOO "),
    MUTE_FRAME_WAIT,
    Action::Strip(&STRIP, "OOOOO"),
    MUTE_FRAME_WAIT,
    Action::Run(finish_combo_feedback),
];

/// Strip sweep shown when demo mode is toggled.
pub static DEMO_TOGGLE_CHAIN: ActionChain<DashboardEvent> =
    ActionChain::new(DEMO_TOGGLE_ID, "demo-toggle", &DEMO_TOGGLE_ACTIONS);

/// Shrinking strip shown when sounds are muted until the next close.
pub static MUTE_ON_CHAIN: ActionChain<DashboardEvent> =
    ActionChain::new(MUTE_ON_ID, "mute-on", &MUTE_ON_ACTIONS);

pub static MUTE_OFF_CHAIN: ActionChain<DashboardEvent> =
    ActionChain::new(MUTE_OFF_ID, "mute-off", &MUTE_OFF_ACTIONS);
