use door_core::clock::{Clock, ManualClock, Millis};
use door_core::controller::{ControllerConfig, ControllerInputs, ControllerNode, ControllerPins};
use door_core::dashboard::{DashboardConfig, DashboardInputs, DashboardNode, DashboardPins};
use door_core::hardware::{DigitalOutput, OutputId, RelayId, ToneDriver};
use door_core::link::{DashboardMessage, DoorState};
use door_core::persist::MemoryStore;
use door_core::telemetry::{EventId, TelemetryRecorder};
use door_core::timing::RestartDecision;

use crate::command::{self, ButtonId, Command, DoorPosition, HELP_TOPICS, NodeId};

/// Both nodes tick at the firmware's control-loop period.
pub const TICK_MS: u32 = 1;

const STORE_BYTES: usize = 16;

/// GPIO line shown in `status`.
#[derive(Debug, Default)]
pub struct SimPin {
    high: bool,
}

impl DigitalOutput for SimPin {
    fn set_level(&mut self, high: bool) {
        self.high = high;
    }
}

#[derive(Debug, Default)]
pub struct SimBuzzer {
    frequency_hz: Option<u16>,
}

impl ToneDriver for SimBuzzer {
    fn tone(&mut self, frequency_hz: u16, _volume: u8) {
        self.frequency_hz = Some(frequency_hz);
    }

    fn silence(&mut self) {
        self.frequency_hz = None;
    }
}

type Controller = ControllerNode<SimPin, SimBuzzer, MemoryStore<STORE_BYTES>>;
type Dashboard = DashboardNode<SimPin, SimBuzzer, MemoryStore<STORE_BYTES>>;

pub struct Session {
    controller: Controller,
    dashboard: Dashboard,
    door: ControllerInputs,
    buttons: DashboardInputs,
    link_up: bool,
    demo_mode: bool,
    clock: ManualClock,
    controller_seen: EventId,
    dashboard_seen: EventId,
}

impl Session {
    pub fn new(demo_mode: bool) -> Self {
        let door = ControllerInputs::door_closed();
        let clock = ManualClock::default();
        let now = clock.now();
        Self {
            controller: boot_controller(MemoryStore::new(), demo_mode, door, now),
            dashboard: boot_dashboard(MemoryStore::new(), demo_mode, now),
            door,
            buttons: DashboardInputs::default(),
            link_up: true,
            demo_mode,
            clock,
            controller_seen: 0,
            dashboard_seen: 0,
        }
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let command = match command::parse(line) {
            Ok(command) => command,
            Err(error) => return vec![format!("ERR syntax {error}")],
        };

        match command {
            Command::Help(topic) => help(topic.as_deref()),
            Command::Status => self.status(),
            Command::Advance(duration_ms) => self.advance(duration_ms),
            Command::Door(position) => {
                self.door = door_inputs(position, self.door.keep_open_button);
                vec![format!("door contacts {position:?}")]
            }
            Command::Press { button, hold_ms } => self.press(button, hold_ms),
            Command::Link(up) => {
                self.link_up = up;
                vec![format!("link {}", if up { "up" } else { "down" })]
            }
            Command::Telemetry(node) => self.telemetry(node),
        }
    }

    fn advance(&mut self, duration_ms: u32) -> Vec<String> {
        let mut lines = Vec::new();
        let mut elapsed = 0;
        while elapsed < duration_ms {
            elapsed += TICK_MS;
            self.step(&mut lines);
        }
        lines.push(format!("t={}", self.clock.now()));
        lines
    }

    fn press(&mut self, button: ButtonId, hold_ms: u32) -> Vec<String> {
        self.set_button(button, true);
        let mut lines = self.advance(hold_ms);
        self.set_button(button, false);
        lines.push(format!("released {button:?} after {hold_ms}ms"));
        lines
    }

    fn set_button(&mut self, button: ButtonId, pressed: bool) {
        match button {
            ButtonId::KeepOpen => self.door.keep_open_button = pressed,
            ButtonId::DashboardKeepOpen => self.buttons.keep_open_button = pressed,
            ButtonId::DashboardClose => self.buttons.close_button = pressed,
            ButtonId::DashboardAck => self.buttons.ack_button = pressed,
        }
    }

    /// One tick of the link and of both nodes.
    fn step(&mut self, lines: &mut Vec<String>) {
        let now = self.clock.advance(TICK_MS);

        if let Some(request) = self.dashboard.poll_request(now)
            && self.link_up
        {
            match self.controller.handle_request(&request, now) {
                Ok(status) => {
                    if let Err(error) = self.dashboard.handle_status(&status, now) {
                        lines.push(format!("[dashboard] rejected status: {error}"));
                    }
                }
                Err(error) => lines.push(format!("[controller] rejected request: {error}")),
            }
        }

        let controller_decision = self.controller.tick(self.door, now);
        let dashboard_decision = self.dashboard.tick(self.buttons, now);

        self.controller_seen = drain(
            "controller",
            self.controller.telemetry(),
            self.controller_seen,
            lines,
        );
        self.dashboard_seen = drain(
            "dashboard",
            self.dashboard.telemetry(),
            self.dashboard_seen,
            lines,
        );

        if controller_decision.should_restart() {
            lines.push(restart_line("controller", controller_decision));
            let store = self.controller.store().clone();
            self.controller = boot_controller(store, self.demo_mode, self.door, now);
            self.controller_seen = 0;
        }
        if dashboard_decision.should_restart() {
            lines.push(restart_line("dashboard", dashboard_decision));
            let store = self.dashboard.store().clone();
            self.dashboard = boot_dashboard(store, self.demo_mode, now);
            self.dashboard_seen = 0;
        }
    }

    fn status(&self) -> Vec<String> {
        let hardware = self.controller.hardware();
        let controller = format!(
            "controller: {} (last {}) auto-closed={} relays={}/{} kept-open={} disconnected={} demo={}",
            self.controller.state(),
            self.controller
                .history()
                .last
                .map_or("-", DoorState::name),
            on_off(self.controller.is_auto_closed()),
            on_off(hardware.door_relay(RelayId::Door1).pin().high),
            on_off(hardware.door_relay(RelayId::Door2).pin().high),
            on_off(hardware.kept_open_led().pin().high),
            on_off(hardware.disconnected_led().pin().high),
            on_off(self.controller.demo_mode()),
        );

        let leds: String = OutputId::ALL
            .iter()
            .map(|id| {
                if self.dashboard.hardware().led(*id).pin().high {
                    'O'
                } else {
                    '.'
                }
            })
            .collect();
        let buzzer = self.dashboard.hardware().buzzer();
        let dashboard = format!(
            "dashboard: {} leds=[{leds}] tone={} volume={} muted={} pending={} demo={}",
            self.dashboard.state().name(),
            buzzer
                .driver()
                .frequency_hz
                .map_or_else(|| "off".to_owned(), |hz| format!("{hz}Hz")),
            self.dashboard.volume_step(),
            on_off(self.dashboard.is_muted()),
            self.dashboard
                .pending_message()
                .map_or("none", DashboardMessage::name),
            on_off(self.dashboard.demo_mode()),
        );

        vec![
            format!("t={} link={}", self.clock.now(), if self.link_up { "up" } else { "down" }),
            controller,
            dashboard,
        ]
    }

    fn telemetry(&self, node: Option<NodeId>) -> Vec<String> {
        let mut lines = Vec::new();
        if node != Some(NodeId::Dashboard) {
            dump("controller", self.controller.telemetry(), &mut lines);
        }
        if node != Some(NodeId::Controller) {
            dump("dashboard", self.dashboard.telemetry(), &mut lines);
        }
        if lines.is_empty() {
            lines.push("no telemetry recorded".to_owned());
        }
        lines
    }
}

fn boot_controller(
    store: MemoryStore<STORE_BYTES>,
    demo_mode: bool,
    inputs: ControllerInputs,
    now: Millis,
) -> Controller {
    let pins = ControllerPins {
        kept_open_led: SimPin::default(),
        disconnected_led: SimPin::default(),
        door_relay_1: SimPin::default(),
        door_relay_2: SimPin::default(),
        buzzer: SimBuzzer::default(),
    };
    let config = ControllerConfig {
        demo_mode,
        ..ControllerConfig::DEFAULT
    };
    let mut node = Controller::new(pins, store, config, inputs, now);
    node.start(now);
    node
}

fn boot_dashboard(store: MemoryStore<STORE_BYTES>, demo_mode: bool, now: Millis) -> Dashboard {
    let pins = DashboardPins {
        open_led: SimPin::default(),
        kept_open_led: SimPin::default(),
        closing_led: SimPin::default(),
        auto_closed_led: SimPin::default(),
        disconnected_led: SimPin::default(),
        buzzer: SimBuzzer::default(),
    };
    let config = DashboardConfig {
        demo_mode,
        ..DashboardConfig::DEFAULT
    };
    let mut node = Dashboard::new(pins, store, config, DashboardInputs::default(), now);
    node.start(now);
    node
}

fn door_inputs(position: DoorPosition, keep_open_button: bool) -> ControllerInputs {
    let (door_contact_a, door_contact_b) = match position {
        DoorPosition::Open => (false, false),
        DoorPosition::Closed => (true, true),
        DoorPosition::Split => (true, false),
    };
    ControllerInputs {
        door_contact_a,
        door_contact_b,
        keep_open_button,
    }
}

/// Prints records newer than `seen` and returns the next id to wait for.
fn drain(
    label: &str,
    telemetry: &TelemetryRecorder,
    seen: EventId,
    lines: &mut Vec<String>,
) -> EventId {
    for record in telemetry.since(seen) {
        lines.push(format!("[{label}] {record}"));
    }
    telemetry.next_id()
}

fn dump(label: &str, telemetry: &TelemetryRecorder, lines: &mut Vec<String>) {
    for record in telemetry.oldest_first() {
        lines.push(format!("[{label}] {record}"));
    }
}

fn restart_line(label: &str, decision: RestartDecision) -> String {
    format!("[{label}] restarting ({decision:?})")
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn help(topic: Option<&str>) -> Vec<String> {
    match topic {
        None => HELP_TOPICS
            .iter()
            .map(|(_, line)| (*line).to_owned())
            .collect(),
        Some(topic) => HELP_TOPICS
            .iter()
            .find(|(name, _)| *name == topic)
            .map_or_else(
                || vec![format!("ERR unknown help topic `{topic}`")],
                |(_, line)| vec![(*line).to_owned()],
            ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line)
    }

    fn status_line(session: &Session, prefix: &str) -> String {
        session
            .status()
            .into_iter()
            .find(|line| line.starts_with(prefix))
            .expect("status has a line per node")
    }

    #[test]
    fn demo_session_auto_closes_the_door() {
        let mut session = Session::new(true);
        run(&mut session, "door open");
        run(&mut session, "advance 25s");
        assert!(status_line(&session, "controller").starts_with("controller: closing"));

        run(&mut session, "door closed");
        let lines = run(&mut session, "advance 200ms");
        assert!(lines.iter().any(|line| line.contains("state-entered")));

        let controller = status_line(&session, "controller");
        assert!(controller.contains("auto-closed=on"), "{controller}");
        let dashboard = status_line(&session, "dashboard");
        assert!(dashboard.starts_with("dashboard: closed"), "{dashboard}");
    }

    #[test]
    fn cut_link_disconnects_the_dashboard() {
        let mut session = Session::new(false);
        run(&mut session, "advance 100ms");
        run(&mut session, "link down");
        let lines = run(&mut session, "advance 6s");

        assert!(lines.iter().any(|line| line.contains("reception-lost")));
        assert!(status_line(&session, "dashboard").starts_with("dashboard: disconnected"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let mut session = Session::new(false);
        let lines = run(&mut session, "door ajar");

        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ERR syntax"));
    }
}
