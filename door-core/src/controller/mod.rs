//! Controller node: redundant door sensor, two door relays, buzzer and two LEDs.
//!
//! The controller owns the authoritative door state. It answers every
//! dashboard request with a status frame and applies each dashboard button
//! event once, keyed by its event id.

pub mod chains;

use crate::chain::ActionContext;
use crate::clock::Millis;
use crate::hardware::{
    BlinkingLed, Button, ButtonEvent, DigitalOutput, MelodyPlayer, OutputId, PatternOutput,
    PulsedOutput, PulsedRelay, RedundantSensor, RelayId, SensorState, ToneDriver, ToneOutput,
    Volume,
};
use crate::link::{
    DashboardMessage, DoorState, EventIdFilter, FrameError, LinkStatus, RECEPTION_TIMEOUT_MS,
    ReceptionWatchdog, RequestFrame, STATUS_FRAME_LEN, StatusFrame,
};
use crate::orchestrator::{ActionOrchestrator, OrchestratorConfig};
use crate::persist::{AutoCloseFeedback, ByteStore, report_write};
use crate::state_machine::{EntryHandler, EventQueue, StateHistory, StateMachine, Transition};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};
use crate::timing::{RestartConfig, RestartDecision, Restarter};

/// Raised events waiting for the next tick.
pub const EVENT_QUEUE_CAPACITY: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerEvent {
    DetectedAnomaly,
    SensedClosed,
    SensedOpen,
    KeepOpen,
    Close,
    StartWillCloseSoon,
    StartAutoClose,
    StartClosingFailed,
}

type Row = Transition<DoorState, ControllerEvent>;

pub static CONTROLLER_TRANSITIONS: [Row; 15] = [
    Row::from_any(ControllerEvent::DetectedAnomaly, DoorState::Anomaly),
    Row::from_any(ControllerEvent::SensedClosed, DoorState::Closed),
    Row::new(DoorState::Anomaly, ControllerEvent::SensedOpen, DoorState::Open),
    Row::new(DoorState::Closed, ControllerEvent::SensedOpen, DoorState::Open),
    Row::new(DoorState::Open, ControllerEvent::KeepOpen, DoorState::KeptOpen),
    Row::new(DoorState::Open, ControllerEvent::Close, DoorState::Closing),
    Row::new(
        DoorState::Open,
        ControllerEvent::StartWillCloseSoon,
        DoorState::WillCloseSoon,
    ),
    Row::new(DoorState::KeptOpen, ControllerEvent::KeepOpen, DoorState::Open),
    Row::new(DoorState::KeptOpen, ControllerEvent::Close, DoorState::Closing),
    Row::new(
        DoorState::WillCloseSoon,
        ControllerEvent::Close,
        DoorState::Closing,
    ),
    Row::new(
        DoorState::WillCloseSoon,
        ControllerEvent::KeepOpen,
        DoorState::KeptOpen,
    ),
    Row::new(
        DoorState::WillCloseSoon,
        ControllerEvent::StartAutoClose,
        DoorState::Closing,
    ),
    // Pressing close again while closing stops the attempts.
    Row::new(DoorState::Closing, ControllerEvent::Close, DoorState::Open),
    Row::new(
        DoorState::Closing,
        ControllerEvent::KeepOpen,
        DoorState::KeptOpen,
    ),
    Row::new(
        DoorState::Closing,
        ControllerEvent::StartClosingFailed,
        DoorState::ClosingFailed,
    ),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ControllerConfig {
    /// Shortens every long wait so the product can be shown in minutes.
    pub demo_mode: bool,
    pub reception_timeout_ms: u32,
    pub restart: RestartConfig,
    pub orchestrator: OrchestratorConfig,
}

impl ControllerConfig {
    pub const DEFAULT: Self = Self {
        demo_mode: false,
        reception_timeout_ms: RECEPTION_TIMEOUT_MS,
        restart: RestartConfig::DEFAULT,
        orchestrator: OrchestratorConfig::DEFAULT,
    };
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Output pins handed to [`ControllerNode::new`].
pub struct ControllerPins<P, T> {
    pub kept_open_led: P,
    pub disconnected_led: P,
    pub door_relay_1: P,
    pub door_relay_2: P,
    pub buzzer: T,
}

/// Raw input levels sampled once per tick; `true` means pressed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ControllerInputs {
    pub door_contact_a: bool,
    pub door_contact_b: bool,
    pub keep_open_button: bool,
}

impl ControllerInputs {
    /// Both contacts pressed by the closed door.
    #[must_use]
    pub const fn door_closed() -> Self {
        Self {
            door_contact_a: true,
            door_contact_b: true,
            keep_open_button: false,
        }
    }

    #[must_use]
    pub const fn door_open() -> Self {
        Self {
            door_contact_a: false,
            door_contact_b: false,
            keep_open_button: false,
        }
    }
}

/// Everything the controller's actions can reach.
pub struct ControllerHardware<P, T> {
    kept_open_led: BlinkingLed<P>,
    disconnected_led: BlinkingLed<P>,
    door_relays: [PulsedRelay<P>; RelayId::COUNT],
    buzzer: MelodyPlayer<T>,
    events: EventQueue<ControllerEvent, EVENT_QUEUE_CAPACITY>,
    demo_mode: bool,
}

impl<P: DigitalOutput, T: ToneDriver> ControllerHardware<P, T> {
    #[must_use]
    pub fn new(pins: ControllerPins<P, T>, demo_mode: bool) -> Self {
        Self {
            kept_open_led: BlinkingLed::new(pins.kept_open_led),
            disconnected_led: BlinkingLed::new(pins.disconnected_led),
            door_relays: [
                PulsedRelay::new(pins.door_relay_1),
                PulsedRelay::new(pins.door_relay_2),
            ],
            buzzer: MelodyPlayer::new(pins.buzzer, Volume::MAX),
            events: EventQueue::new(),
            demo_mode,
        }
    }

    #[must_use]
    pub fn kept_open_led(&self) -> &BlinkingLed<P> {
        &self.kept_open_led
    }

    #[must_use]
    pub fn disconnected_led(&self) -> &BlinkingLed<P> {
        &self.disconnected_led
    }

    #[must_use]
    pub fn door_relay(&self, id: RelayId) -> &PulsedRelay<P> {
        &self.door_relays[id.as_index()]
    }

    #[must_use]
    pub fn buzzer(&self) -> &MelodyPlayer<T> {
        &self.buzzer
    }

    #[must_use]
    pub fn relays_released(&self) -> bool {
        self.door_relays.iter().all(|relay| !relay.is_powered())
    }

    fn poll(&mut self, now: Millis) {
        self.kept_open_led.poll(now);
        self.disconnected_led.poll(now);
        for relay in &mut self.door_relays {
            relay.poll(now);
        }
        self.buzzer.poll(now);
    }
}

impl<P: DigitalOutput, T: ToneDriver> ActionContext<ControllerEvent> for ControllerHardware<P, T> {
    fn output(&mut self, id: OutputId) -> Option<&mut dyn PatternOutput> {
        match id {
            OutputId::KeptOpen => Some(&mut self.kept_open_led),
            OutputId::Disconnected => Some(&mut self.disconnected_led),
            OutputId::Open | OutputId::Closing | OutputId::AutoClosed => None,
        }
    }

    fn tone(&mut self) -> Option<&mut dyn ToneOutput> {
        Some(&mut self.buzzer)
    }

    fn relay(&mut self, id: RelayId) -> Option<&mut dyn PulsedOutput> {
        self.door_relays
            .get_mut(id.as_index())
            .map(|relay| relay as &mut dyn PulsedOutput)
    }

    fn raise(&mut self, event: ControllerEvent) {
        // Overflow is counted by the queue and reported on the next tick.
        let _ = self.events.push(event);
    }

    fn demo_mode(&self) -> bool {
        self.demo_mode
    }
}

/// Starts the chain of each entered state and tracks automatic closes.
struct EntryEffects<'a, S> {
    orchestrator: &'a mut ActionOrchestrator<ControllerEvent>,
    auto_close: &'a mut AutoCloseFeedback,
    store: &'a mut S,
    telemetry: &'a mut TelemetryRecorder,
    now: Millis,
}

impl<S: ByteStore> EntryHandler<DoorState> for EntryEffects<'_, S> {
    fn on_enter(&mut self, state: DoorState, history: &StateHistory<DoorState>) {
        self.telemetry.record_state_entry(
            state.as_index(),
            history.last.map(DoorState::as_index),
            history.before_last.map(DoorState::as_index),
            self.now,
        );

        let closed_by_itself = state == DoorState::Closed
            && history.before_last == Some(DoorState::WillCloseSoon)
            && history.last == Some(DoorState::Closing);
        if closed_by_itself {
            let written = self
                .auto_close
                .register_successful_auto_close(&mut *self.store);
            report_write(written, self.telemetry, self.now);
        }

        self.orchestrator.start(chains::chain_for(state));
    }
}

pub struct ControllerNode<P, T, S> {
    hardware: ControllerHardware<P, T>,
    machine: StateMachine<DoorState, ControllerEvent>,
    orchestrator: ActionOrchestrator<ControllerEvent>,
    sensor: RedundantSensor,
    keep_open_button: Button,
    watchdog: ReceptionWatchdog,
    requests: EventIdFilter,
    auto_close: AutoCloseFeedback,
    store: S,
    restarter: Restarter,
    telemetry: TelemetryRecorder,
}

impl<P: DigitalOutput, T: ToneDriver, S: ByteStore> ControllerNode<P, T, S> {
    /// Builds the node from its pins, its settings store and the input levels at boot.
    #[must_use]
    pub fn new(
        pins: ControllerPins<P, T>,
        store: S,
        config: ControllerConfig,
        inputs: ControllerInputs,
        now: Millis,
    ) -> Self {
        Self {
            hardware: ControllerHardware::new(pins, config.demo_mode),
            machine: StateMachine::new(&CONTROLLER_TRANSITIONS),
            orchestrator: ActionOrchestrator::new(config.orchestrator),
            sensor: RedundantSensor::new(inputs.door_contact_a, inputs.door_contact_b, now),
            keep_open_button: Button::new(inputs.keep_open_button, now),
            watchdog: ReceptionWatchdog::new(config.reception_timeout_ms),
            requests: EventIdFilter::new(),
            auto_close: AutoCloseFeedback::load(&store),
            store,
            restarter: Restarter::new(config.restart),
            telemetry: TelemetryRecorder::new(),
        }
    }

    /// Arms the timers and enters the state the door sensor reports.
    ///
    /// Contacts that disagree at boot start in [`DoorState::Anomaly`]; the
    /// first agreeing reading moves the door out of it.
    pub fn start(&mut self, now: Millis) {
        self.restarter.start(now);
        self.watchdog.enable(now);

        let initial = match self.sensor.state() {
            SensorState::Pressed => DoorState::Closed,
            SensorState::Unpressed => DoorState::Open,
            SensorState::DisagreeingTemporarily | SensorState::Anomaly => DoorState::Anomaly,
        };

        let Self {
            machine,
            orchestrator,
            auto_close,
            store,
            telemetry,
            ..
        } = self;
        machine.start(
            initial,
            &mut EntryEffects {
                orchestrator,
                auto_close,
                store,
                telemetry,
                now,
            },
        );
    }

    /// Runs one control-loop iteration.
    ///
    /// Events raised by actions during the previous tick are delivered first,
    /// then inputs are sampled, then the active chain advances.
    pub fn tick(&mut self, inputs: ControllerInputs, now: Millis) -> RestartDecision {
        while let Some(event) = self.hardware.events.pop() {
            self.dispatch(event, now);
        }
        if self.hardware.events.take_dropped() > 0 {
            self.telemetry
                .record(TelemetryEventKind::EventDropped, TelemetryPayload::none(), now);
        }

        if let Some(state) = self
            .sensor
            .poll(inputs.door_contact_a, inputs.door_contact_b, now)
        {
            self.on_sensor(state, now);
        }

        let pressed = self
            .keep_open_button
            .poll(inputs.keep_open_button, now)
            .contains(&ButtonEvent::Pressed);
        if pressed {
            self.on_keep_open_pressed(now);
        }

        if self.watchdog.poll(now) == Some(LinkStatus::Lost) {
            self.telemetry
                .record(TelemetryEventKind::ReceptionLost, TelemetryPayload::none(), now);
            self.hardware.disconnected_led.turn_on();
        }

        let Self {
            hardware,
            machine,
            orchestrator,
            restarter,
            telemetry,
            ..
        } = self;
        orchestrator.tick(hardware, telemetry, now);
        hardware.poll(now);

        restarter.poll(
            now,
            || restart_allowed(machine, orchestrator, hardware),
            telemetry,
        )
    }

    /// Handles a dashboard request and returns the status frame to send back.
    pub fn handle_request(
        &mut self,
        bytes: &[u8],
        now: Millis,
    ) -> Result<[u8; STATUS_FRAME_LEN], FrameError> {
        let frame = RequestFrame::decode(bytes).inspect_err(|_| {
            self.telemetry
                .record(TelemetryEventKind::FrameRejected, TelemetryPayload::none(), now);
        })?;

        if self.watchdog.on_received(now) == Some(LinkStatus::Restored) {
            self.telemetry.record(
                TelemetryEventKind::ReceptionRestored,
                TelemetryPayload::none(),
                now,
            );
            self.hardware.disconnected_led.turn_off();
        }

        if let Some(message) = self.requests.accept(frame) {
            self.on_message(message, now);
        }

        Ok(self.status().encode())
    }

    #[must_use]
    pub fn status(&self) -> StatusFrame {
        StatusFrame {
            state: self.state(),
            acked_event_id: self.requests.acked_event_id(),
            auto_closed: self.auto_close.is_auto_closed(),
        }
    }

    /// Current door state; [`DoorState::Anomaly`] before [`Self::start`].
    #[must_use]
    pub fn state(&self) -> DoorState {
        self.machine.current().unwrap_or(DoorState::Anomaly)
    }

    #[must_use]
    pub fn history(&self) -> &StateHistory<DoorState> {
        self.machine.history()
    }

    /// Door closed with nothing left to do.
    #[must_use]
    pub fn can_restart(&self) -> bool {
        restart_allowed(&self.machine, &self.orchestrator, &self.hardware)
    }

    #[must_use]
    pub fn is_auto_closed(&self) -> bool {
        self.auto_close.is_auto_closed()
    }

    #[must_use]
    pub fn demo_mode(&self) -> bool {
        self.hardware.demo_mode
    }

    #[must_use]
    pub fn hardware(&self) -> &ControllerHardware<P, T> {
        &self.hardware
    }

    #[must_use]
    pub fn orchestrator(&self) -> &ActionOrchestrator<ControllerEvent> {
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

    fn dispatch(&mut self, event: ControllerEvent, now: Millis) {
        let Self {
            machine,
            orchestrator,
            auto_close,
            store,
            telemetry,
            ..
        } = self;
        machine.handle_event(
            event,
            &mut EntryEffects {
                orchestrator,
                auto_close,
                store,
                telemetry,
                now,
            },
        );
    }

    fn on_sensor(&mut self, state: SensorState, now: Millis) {
        let event = match state {
            SensorState::Pressed => ControllerEvent::SensedClosed,
            SensorState::Unpressed => ControllerEvent::SensedOpen,
            SensorState::Anomaly => {
                self.telemetry
                    .record(TelemetryEventKind::SensorAnomaly, TelemetryPayload::none(), now);
                ControllerEvent::DetectedAnomaly
            }
            SensorState::DisagreeingTemporarily => return,
        };
        self.dispatch(event, now);
    }

    /// The local button doubles as the anomaly reset once the contacts agree.
    fn on_keep_open_pressed(&mut self, now: Millis) {
        if self.sensor.state() != SensorState::Anomaly {
            self.dispatch(ControllerEvent::KeepOpen, now);
            return;
        }

        if let Some(state) = self.sensor.try_clear_anomaly() {
            self.telemetry.record(
                TelemetryEventKind::SensorAnomalyCleared,
                TelemetryPayload::none(),
                now,
            );
            self.on_sensor(state, now);
        }
    }

    fn on_message(&mut self, message: DashboardMessage, now: Millis) {
        match message {
            DashboardMessage::Polling => {}
            DashboardMessage::KeepOpen => self.dispatch(ControllerEvent::KeepOpen, now),
            DashboardMessage::Close => self.dispatch(ControllerEvent::Close, now),
            DashboardMessage::AckAutoClosed => {
                let written = self.auto_close.acknowledge(&mut self.store);
                report_write(written, &mut self.telemetry, now);
            }
            DashboardMessage::ToggleDemo => {
                self.hardware.demo_mode = !self.hardware.demo_mode;
            }
        }
    }
}

fn restart_allowed<P: DigitalOutput, T: ToneDriver>(
    machine: &StateMachine<DoorState, ControllerEvent>,
    orchestrator: &ActionOrchestrator<ControllerEvent>,
    hardware: &ControllerHardware<P, T>,
) -> bool {
    machine.current() == Some(DoorState::Closed)
        && orchestrator.is_settled()
        && hardware.relays_released()
}
