//! Dashboard node: mirrors the controller's door state on five LEDs and a
//! buzzer, and forwards its three buttons.
//!
//! The acknowledge button doubles as a modifier for local settings:
//!
//! | input                      | effect                                  |
//! |----------------------------|-----------------------------------------|
//! | keep-open                  | send keep-open                          |
//! | close                      | send close                              |
//! | ack                        | send ack-auto-closed                    |
//! | ack held + keep-open       | volume up                               |
//! | ack held + close           | volume down                             |
//! | ack double press           | mute until the door is next closed      |
//! | ack held for three seconds | toggle demo mode on both nodes          |

pub mod chains;

use crate::chain::{ActionChain, ActionContext};
use crate::clock::{Millis, SECOND_MS};
use crate::hardware::{
    BlinkingLed, Button, ButtonEvent, ButtonEvents, DigitalOutput, MelodyPlayer, OutputId,
    PatternOutput, PulsedOutput, RelayId, ToneDriver, ToneOutput,
};
use crate::link::{
    DashboardMessage, DoorState, FrameError, LinkStatus, POLL_PERIOD_MS, RECEPTION_TIMEOUT_MS,
    REQUEST_FRAME_LEN, ReceptionWatchdog, RemoteButtonSender, StatusFrame,
};
use crate::orchestrator::{ActionOrchestrator, OrchestratorConfig};
use crate::persist::{
    ByteStore, DASHBOARD_VOLUME_STEPS, DEFAULT_VOLUME_STEP, VolumeSteps, report_write,
};
use crate::state_machine::{EntryHandler, EventQueue, StateHistory, StateMachine, Transition};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};
use crate::timing::{RestartConfig, RestartDecision, Restarter, Timer};

pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// Holding ack this long toggles demo mode.
pub const DEMO_TOGGLE_HOLD_MS: u32 = 3 * SECOND_MS;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DashboardState {
    WaitingFirstSignal,
    Disconnected,
    Door(DoorState),
}

impl DashboardState {
    /// Telemetry code: door states keep their own index.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            DashboardState::Door(door) => door.as_index(),
            DashboardState::WaitingFirstSignal => 7,
            DashboardState::Disconnected => 8,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DashboardState::WaitingFirstSignal => "waiting-first-signal",
            DashboardState::Disconnected => "disconnected",
            DashboardState::Door(door) => door.name(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DashboardEvent {
    /// A status frame reported this door state.
    Received(DoorState),
    ReceptionLost,
    /// Raised by combo feedback chains when their animation ends.
    ComboFeedbackFinished,
}

type Row = Transition<DashboardState, DashboardEvent>;

const fn mirror(door: DoorState) -> Row {
    Row::from_any(DashboardEvent::Received(door), DashboardState::Door(door))
}

pub static DASHBOARD_TRANSITIONS: [Row; 8] = [
    mirror(DoorState::Anomaly),
    mirror(DoorState::Closed),
    mirror(DoorState::Open),
    mirror(DoorState::KeptOpen),
    mirror(DoorState::WillCloseSoon),
    mirror(DoorState::Closing),
    mirror(DoorState::ClosingFailed),
    Row::from_any(DashboardEvent::ReceptionLost, DashboardState::Disconnected),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DashboardConfig {
    pub demo_mode: bool,
    pub reception_timeout_ms: u32,
    pub poll_period_ms: u32,
    pub restart: RestartConfig,
    pub orchestrator: OrchestratorConfig,
}

impl DashboardConfig {
    pub const DEFAULT: Self = Self {
        demo_mode: false,
        reception_timeout_ms: RECEPTION_TIMEOUT_MS,
        poll_period_ms: POLL_PERIOD_MS,
        restart: RestartConfig::DEFAULT,
        orchestrator: OrchestratorConfig::DEFAULT,
    };
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Output pins handed to [`DashboardNode::new`], LEDs in strip order.
pub struct DashboardPins<P, T> {
    pub open_led: P,
    pub kept_open_led: P,
    pub closing_led: P,
    pub auto_closed_led: P,
    pub disconnected_led: P,
    pub buzzer: T,
}

/// Raw button levels sampled once per tick; `true` means pressed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DashboardInputs {
    pub keep_open_button: bool,
    pub close_button: bool,
    pub ack_button: bool,
}

pub struct DashboardHardware<P, T> {
    leds: [BlinkingLed<P>; OutputId::COUNT],
    buzzer: MelodyPlayer<T>,
    events: EventQueue<DashboardEvent, EVENT_QUEUE_CAPACITY>,
    demo_mode: bool,
}

impl<P: DigitalOutput, T: ToneDriver> DashboardHardware<P, T> {
    #[must_use]
    pub fn new(pins: DashboardPins<P, T>, demo_mode: bool) -> Self {
        Self {
            leds: [
                BlinkingLed::new(pins.open_led),
                BlinkingLed::new(pins.kept_open_led),
                BlinkingLed::new(pins.closing_led),
                BlinkingLed::new(pins.auto_closed_led),
                BlinkingLed::new(pins.disconnected_led),
            ],
            buzzer: MelodyPlayer::new(pins.buzzer, DASHBOARD_VOLUME_STEPS[0]),
            events: EventQueue::new(),
            demo_mode,
        }
    }

    #[must_use]
    pub fn led(&self, id: OutputId) -> &BlinkingLed<P> {
        &self.leds[id.as_index()]
    }

    #[must_use]
    pub fn buzzer(&self) -> &MelodyPlayer<T> {
        &self.buzzer
    }

    fn poll(&mut self, now: Millis) {
        for led in &mut self.leds {
            led.poll(now);
        }
        self.buzzer.poll(now);
    }
}

impl<P: DigitalOutput, T: ToneDriver> ActionContext<DashboardEvent> for DashboardHardware<P, T> {
    fn output(&mut self, id: OutputId) -> Option<&mut dyn PatternOutput> {
        self.leds
            .get_mut(id.as_index())
            .map(|led| led as &mut dyn PatternOutput)
    }

    fn tone(&mut self) -> Option<&mut dyn ToneOutput> {
        Some(&mut self.buzzer)
    }

    fn relay(&mut self, _id: RelayId) -> Option<&mut dyn PulsedOutput> {
        None
    }

    fn raise(&mut self, event: DashboardEvent) {
        // Overflow is counted by the queue and reported on the next tick.
        let _ = self.events.push(event);
    }

    fn demo_mode(&self) -> bool {
        self.demo_mode
    }
}

struct DashboardButtons {
    keep_open: Button,
    close: Button,
    ack: Button,
    /// The current ack press served a combo, so its release sends nothing.
    ack_in_combo: bool,
}

/// Local feedback running on top of the state chain.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct LocalFeedback {
    combo_running: bool,
    muted_until_closed: bool,
}

struct EntryEffects<'a, P, T> {
    orchestrator: &'a mut ActionOrchestrator<DashboardEvent>,
    hardware: &'a mut DashboardHardware<P, T>,
    feedback: &'a mut LocalFeedback,
    telemetry: &'a mut TelemetryRecorder,
    now: Millis,
}

impl<P: DigitalOutput, T: ToneDriver> EntryHandler<DashboardState> for EntryEffects<'_, P, T> {
    fn on_enter(&mut self, state: DashboardState, history: &StateHistory<DashboardState>) {
        self.telemetry.record_state_entry(
            state.code(),
            history.last.map(DashboardState::code),
            history.before_last.map(DashboardState::code),
            self.now,
        );

        self.feedback.combo_running = false;
        if state == DashboardState::Door(DoorState::Closed) && self.feedback.muted_until_closed {
            self.feedback.muted_until_closed = false;
            self.hardware.buzzer.unmute();
        }

        self.orchestrator.start(chains::chain_for(state));
    }
}

pub struct DashboardNode<P, T, S> {
    hardware: DashboardHardware<P, T>,
    machine: StateMachine<DashboardState, DashboardEvent>,
    orchestrator: ActionOrchestrator<DashboardEvent>,
    buttons: DashboardButtons,
    sender: RemoteButtonSender,
    watchdog: ReceptionWatchdog,
    poll_timer: Timer,
    volume: VolumeSteps,
    store: S,
    feedback: LocalFeedback,
    auto_closed: bool,
    restarter: Restarter,
    telemetry: TelemetryRecorder,
}

impl<P: DigitalOutput, T: ToneDriver, S: ByteStore> DashboardNode<P, T, S> {
    #[must_use]
    pub fn new(
        pins: DashboardPins<P, T>,
        store: S,
        config: DashboardConfig,
        inputs: DashboardInputs,
        now: Millis,
    ) -> Self {
        let volume = VolumeSteps::load(&store, &DASHBOARD_VOLUME_STEPS, DEFAULT_VOLUME_STEP);
        let mut hardware = DashboardHardware::new(pins, config.demo_mode);
        hardware.buzzer.set_volume(volume.volume());

        Self {
            hardware,
            machine: StateMachine::new(&DASHBOARD_TRANSITIONS),
            orchestrator: ActionOrchestrator::new(config.orchestrator),
            buttons: DashboardButtons {
                keep_open: Button::new(inputs.keep_open_button, now),
                close: Button::new(inputs.close_button, now),
                ack: Button::new(inputs.ack_button, now).with_long_press(DEMO_TOGGLE_HOLD_MS),
                ack_in_combo: false,
            },
            sender: RemoteButtonSender::new(),
            watchdog: ReceptionWatchdog::new(config.reception_timeout_ms),
            poll_timer: Timer::new(config.poll_period_ms),
            volume,
            store,
            feedback: LocalFeedback::default(),
            auto_closed: false,
            restarter: Restarter::new(config.restart),
            telemetry: TelemetryRecorder::new(),
        }
    }

    pub fn start(&mut self, now: Millis) {
        self.restarter.start(now);
        self.watchdog.enable(now);
        self.poll_timer.start_repeating(now);
        self.enter(None, now);
    }

    /// Runs one control-loop iteration.
    pub fn tick(&mut self, inputs: DashboardInputs, now: Millis) -> RestartDecision {
        while let Some(event) = self.hardware.events.pop() {
            if event == DashboardEvent::ComboFeedbackFinished {
                self.finish_combo();
            } else {
                self.enter(Some(event), now);
            }
        }
        if self.hardware.events.take_dropped() > 0 {
            self.telemetry
                .record(TelemetryEventKind::EventDropped, TelemetryPayload::none(), now);
        }

        self.poll_buttons(inputs, now);

        if self.watchdog.poll(now) == Some(LinkStatus::Lost) {
            self.telemetry
                .record(TelemetryEventKind::ReceptionLost, TelemetryPayload::none(), now);
            self.enter(Some(DashboardEvent::ReceptionLost), now);
        }

        let Self {
            hardware,
            machine,
            orchestrator,
            feedback,
            restarter,
            telemetry,
            auto_closed,
            ..
        } = self;
        orchestrator.tick(hardware, telemetry, now);
        if !feedback.combo_running {
            show_auto_closed(hardware, *auto_closed);
        }
        hardware.poll(now);

        restarter.poll(
            now,
            || restart_allowed(machine, orchestrator, hardware, feedback),
            telemetry,
        )
    }

    /// Request frame to send when the poll period elapsed.
    pub fn poll_request(&mut self, now: Millis) -> Option<[u8; REQUEST_FRAME_LEN]> {
        self.poll_timer
            .poll(now)
            .then(|| self.sender.request().encode())
    }

    /// Applies a status frame received from the controller.
    pub fn handle_status(&mut self, bytes: &[u8], now: Millis) -> Result<StatusFrame, FrameError> {
        let frame = StatusFrame::decode(bytes).inspect_err(|_| {
            self.telemetry
                .record(TelemetryEventKind::FrameRejected, TelemetryPayload::none(), now);
        })?;

        if self.watchdog.on_received(now) == Some(LinkStatus::Restored) {
            self.telemetry.record(
                TelemetryEventKind::ReceptionRestored,
                TelemetryPayload::none(),
                now,
            );
        }

        self.sender.acknowledge(frame.acked_event_id);
        self.auto_closed = frame.auto_closed;
        self.enter(Some(DashboardEvent::Received(frame.state)), now);

        Ok(frame)
    }

    #[must_use]
    pub fn state(&self) -> DashboardState {
        self.machine
            .current()
            .unwrap_or(DashboardState::WaitingFirstSignal)
    }

    #[must_use]
    pub fn can_restart(&self) -> bool {
        restart_allowed(
            &self.machine,
            &self.orchestrator,
            &self.hardware,
            &self.feedback,
        )
    }

    #[must_use]
    pub fn volume_step(&self) -> u8 {
        self.volume.step()
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.feedback.muted_until_closed
    }

    #[must_use]
    pub fn is_combo_running(&self) -> bool {
        self.feedback.combo_running
    }

    #[must_use]
    pub fn demo_mode(&self) -> bool {
        self.hardware.demo_mode
    }

    /// Button message waiting for the controller's acknowledgement.
    #[must_use]
    pub fn pending_message(&self) -> Option<DashboardMessage> {
        self.sender
            .is_sending()
            .then(|| self.sender.request().message)
    }

    #[must_use]
    pub fn hardware(&self) -> &DashboardHardware<P, T> {
        &self.hardware
    }

    #[must_use]
    pub fn orchestrator(&self) -> &ActionOrchestrator<DashboardEvent> {
        &self.orchestrator
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Hands the settings store back so a restarted node keeps its settings.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Starts the machine when `event` is `None`, otherwise feeds it `event`.
    fn enter(&mut self, event: Option<DashboardEvent>, now: Millis) {
        let Self {
            hardware,
            machine,
            orchestrator,
            feedback,
            telemetry,
            ..
        } = self;
        let mut effects = EntryEffects {
            orchestrator,
            hardware,
            feedback,
            telemetry,
            now,
        };
        match event {
            None => {
                machine.start(DashboardState::WaitingFirstSignal, &mut effects);
            }
            Some(event) => {
                machine.handle_event(event, &mut effects);
            }
        }
    }

    fn poll_buttons(&mut self, inputs: DashboardInputs, now: Millis) {
        let ack = self.buttons.ack.poll(inputs.ack_button, now);
        let keep_open = self.buttons.keep_open.poll(inputs.keep_open_button, now);
        let close = self.buttons.close.poll(inputs.close_button, now);
        let modifier = self.buttons.ack.is_pressed();

        // The acknowledgement goes out on release, once the press is known
        // not to be part of a combo.
        for event in &ack {
            match event {
                ButtonEvent::Pressed => self.buttons.ack_in_combo = false,
                ButtonEvent::Changed(false) if !self.buttons.ack_in_combo => {
                    self.sender.press(DashboardMessage::AckAutoClosed);
                }
                ButtonEvent::MultiPress(2) => {
                    self.buttons.ack_in_combo = true;
                    self.toggle_mute();
                }
                ButtonEvent::LongPress(1) => {
                    self.buttons.ack_in_combo = true;
                    self.toggle_demo_mode();
                }
                _ => {}
            }
        }

        if pressed(&keep_open) {
            if modifier {
                self.buttons.ack_in_combo = true;
                self.change_volume(true, now);
            } else {
                self.sender.press(DashboardMessage::KeepOpen);
            }
        }

        if pressed(&close) {
            if modifier {
                self.buttons.ack_in_combo = true;
                self.change_volume(false, now);
            } else {
                self.sender.press(DashboardMessage::Close);
            }
        }
    }

    fn change_volume(&mut self, up: bool, now: Millis) {
        let result = if up {
            self.volume.increase(&mut self.store)
        } else {
            self.volume.decrease(&mut self.store)
        };
        // A failed write still changed the step in memory.
        let changed = report_write(result, &mut self.telemetry, now).unwrap_or(true);
        if !changed {
            return;
        }

        self.hardware.buzzer.set_volume(self.volume.volume());
        self.start_combo(chains::volume_feedback_chain(self.volume.step()));
    }

    fn toggle_mute(&mut self) {
        if self.feedback.muted_until_closed {
            self.feedback.muted_until_closed = false;
            self.hardware.buzzer.unmute();
            self.start_combo(chains::MUTE_OFF_CHAIN);
        } else {
            self.feedback.muted_until_closed = true;
            self.hardware.buzzer.mute();
            self.start_combo(chains::MUTE_ON_CHAIN);
        }
    }

    fn toggle_demo_mode(&mut self) {
        self.hardware.demo_mode = !self.hardware.demo_mode;
        self.sender.press(DashboardMessage::ToggleDemo);
        self.start_combo(chains::DEMO_TOGGLE_CHAIN);
    }

    fn start_combo(&mut self, chain: ActionChain<DashboardEvent>) {
        self.feedback.combo_running = true;
        self.orchestrator.start(chain);
    }

    /// Puts the current state's chain back once a combo animation ended.
    fn finish_combo(&mut self) {
        self.feedback.combo_running = false;
        if let Some(state) = self.machine.current() {
            self.orchestrator.start(chains::chain_for(state));
        }
    }
}

fn pressed(events: &ButtonEvents) -> bool {
    events.contains(&ButtonEvent::Pressed)
}

fn show_auto_closed<P: DigitalOutput, T: ToneDriver>(
    hardware: &mut DashboardHardware<P, T>,
    auto_closed: bool,
) {
    let led = &mut hardware.leds[OutputId::AutoClosed.as_index()];
    if led.is_lit() != auto_closed {
        led.set(auto_closed);
    }
}

fn restart_allowed<P: DigitalOutput, T: ToneDriver>(
    machine: &StateMachine<DashboardState, DashboardEvent>,
    orchestrator: &ActionOrchestrator<DashboardEvent>,
    hardware: &DashboardHardware<P, T>,
    feedback: &LocalFeedback,
) -> bool {
    let quiet_state = matches!(
        machine.current(),
        Some(
            DashboardState::WaitingFirstSignal
                | DashboardState::Disconnected
                | DashboardState::Door(DoorState::Closed)
        )
    );
    quiet_state
        && orchestrator.is_settled()
        && !feedback.combo_running
        && !hardware.buzzer.is_playing()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::NoopPin;
    use crate::link::{HEADER, RequestFrame};
    use crate::persist::{MemoryStore, VOLUME_ADDRESS, VOLUME_BASE_VALUE};

    type Node = DashboardNode<NoopPin, NoopPin, MemoryStore<4>>;

    fn node() -> Node {
        let pins = DashboardPins {
            open_led: NoopPin,
            kept_open_led: NoopPin,
            closing_led: NoopPin,
            auto_closed_led: NoopPin,
            disconnected_led: NoopPin,
            buzzer: NoopPin,
        };
        let mut node = Node::new(
            pins,
            MemoryStore::new(),
            DashboardConfig::DEFAULT,
            DashboardInputs::default(),
            Millis::ZERO,
        );
        node.start(Millis::ZERO);
        node
    }

    fn status(state: DoorState, acked_event_id: u8, auto_closed: bool) -> [u8; 4] {
        StatusFrame {
            state,
            acked_event_id,
            auto_closed,
        }
        .encode()
    }

    /// Holds `inputs` long enough to pass the debounce, starting at `at`.
    fn hold(node: &mut Node, inputs: DashboardInputs, at: u32) -> u32 {
        node.tick(inputs, Millis::new(at));
        node.tick(inputs, Millis::new(at + 21));
        at + 21
    }

    #[test]
    fn polls_every_period() {
        let mut node = node();

        assert_eq!(node.poll_request(Millis::new(49)), None);
        assert_eq!(
            node.poll_request(Millis::new(50)),
            Some(RequestFrame::polling().encode())
        );
        assert_eq!(node.poll_request(Millis::new(60)), None);
        assert_eq!(node.poll_request(Millis::new(100)).map(|f| f[0]), Some(HEADER));
    }

    #[test]
    fn mirrors_reported_state_and_acknowledges() {
        let mut node = node();
        assert_eq!(node.state(), DashboardState::WaitingFirstSignal);

        let at = hold(
            &mut node,
            DashboardInputs {
                close_button: true,
                ..DashboardInputs::default()
            },
            10,
        );
        assert_eq!(node.pending_message(), Some(DashboardMessage::Close));

        node.handle_status(&status(DoorState::Closing, 1, false), Millis::new(at + 1))
            .expect("valid status");
        assert_eq!(node.state(), DashboardState::Door(DoorState::Closing));
        assert_eq!(node.pending_message(), None);
    }

    #[test]
    fn silence_disconnects() {
        let mut node = node();
        node.handle_status(&status(DoorState::Open, 0, false), Millis::new(100))
            .expect("valid status");

        node.tick(DashboardInputs::default(), Millis::new(5_100));
        assert_eq!(node.state(), DashboardState::Door(DoorState::Open));
        node.tick(DashboardInputs::default(), Millis::new(5_101));
        assert_eq!(node.state(), DashboardState::Disconnected);
        assert!(node.telemetry().contains(TelemetryEventKind::ReceptionLost));
    }

    #[test]
    fn ack_modifier_changes_volume_without_sending() {
        let mut node = node();
        let ack_held = DashboardInputs {
            ack_button: true,
            ..DashboardInputs::default()
        };
        let at = hold(&mut node, ack_held, 10);

        let at = hold(
            &mut node,
            DashboardInputs {
                keep_open_button: true,
                ..ack_held
            },
            at + 10,
        );
        hold(&mut node, DashboardInputs::default(), at + 10);

        assert_eq!(node.volume_step(), DEFAULT_VOLUME_STEP + 1);
        assert_eq!(node.pending_message(), None);
        assert!(node.is_combo_running());
        assert_eq!(
            node.store().read(VOLUME_ADDRESS),
            VOLUME_BASE_VALUE + DEFAULT_VOLUME_STEP + 1
        );
    }

    #[test]
    fn ack_is_sent_on_release_of_a_plain_press() {
        let mut node = node();
        let at = hold(
            &mut node,
            DashboardInputs {
                ack_button: true,
                ..DashboardInputs::default()
            },
            10,
        );
        assert_eq!(node.pending_message(), None);

        hold(&mut node, DashboardInputs::default(), at + 10);
        assert_eq!(
            node.pending_message(),
            Some(DashboardMessage::AckAutoClosed)
        );
    }

    #[test]
    fn demo_toggle_hold_does_not_acknowledge() {
        let mut node = node();
        let ack = DashboardInputs {
            ack_button: true,
            ..DashboardInputs::default()
        };
        let at = hold(&mut node, ack, 10);
        node.tick(ack, Millis::new(at + DEMO_TOGGLE_HOLD_MS));
        assert_eq!(node.pending_message(), Some(DashboardMessage::ToggleDemo));

        hold(
            &mut node,
            DashboardInputs::default(),
            at + DEMO_TOGGLE_HOLD_MS + 10,
        );
        assert_eq!(node.pending_message(), Some(DashboardMessage::ToggleDemo));
    }

    #[test]
    fn closed_state_unmutes() {
        let mut node = node();
        let ack = DashboardInputs {
            ack_button: true,
            ..DashboardInputs::default()
        };
        let released = DashboardInputs::default();

        let at = hold(&mut node, ack, 10);
        let at = hold(&mut node, released, at + 10);
        hold(&mut node, ack, at + 10);
        assert!(node.is_muted());

        node.handle_status(&status(DoorState::Closed, 0, false), Millis::new(1_000))
            .expect("valid status");
        assert!(!node.is_muted());
        assert!(!node.is_combo_running());
    }
}
