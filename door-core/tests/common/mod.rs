use door_core::clock::Millis;
use door_core::controller::{ControllerConfig, ControllerInputs, ControllerNode, ControllerPins};
use door_core::dashboard::{DashboardConfig, DashboardInputs, DashboardNode, DashboardPins};
use door_core::hardware::{DigitalOutput, ToneDriver};
use door_core::persist::MemoryStore;

/// Output pin remembering its level and how often it went high.
#[derive(Debug, Default)]
pub struct LevelPin {
    pub high: bool,
    pub rises: usize,
}

impl DigitalOutput for LevelPin {
    fn set_level(&mut self, high: bool) {
        if high && !self.high {
            self.rises += 1;
        }
        self.high = high;
    }
}

/// Buzzer driver remembering the tone it plays.
#[derive(Debug, Default)]
pub struct Speaker {
    pub sounding: Option<u16>,
    pub tones: usize,
}

impl ToneDriver for Speaker {
    fn tone(&mut self, frequency_hz: u16, _volume: u8) {
        self.sounding = Some(frequency_hz);
        self.tones += 1;
    }

    fn silence(&mut self) {
        self.sounding = None;
    }
}

pub type Controller = ControllerNode<LevelPin, Speaker, MemoryStore<8>>;
pub type Dashboard = DashboardNode<LevelPin, Speaker, MemoryStore<8>>;

pub const TICK_MS: u32 = 10;

pub fn controller(inputs: ControllerInputs, demo_mode: bool) -> Controller {
    controller_with_store(MemoryStore::new(), inputs, demo_mode)
}

/// Boots a controller on settings left behind by a previous run.
pub fn controller_with_store(
    store: MemoryStore<8>,
    inputs: ControllerInputs,
    demo_mode: bool,
) -> Controller {
    let pins = ControllerPins {
        kept_open_led: LevelPin::default(),
        disconnected_led: LevelPin::default(),
        door_relay_1: LevelPin::default(),
        door_relay_2: LevelPin::default(),
        buzzer: Speaker::default(),
    };
    let config = ControllerConfig {
        demo_mode,
        ..ControllerConfig::DEFAULT
    };
    let mut node = Controller::new(pins, store, config, inputs, Millis::ZERO);
    node.start(Millis::ZERO);
    node
}

pub fn dashboard(demo_mode: bool) -> Dashboard {
    dashboard_with_store(MemoryStore::new(), demo_mode)
}

/// Boots a dashboard on settings left behind by a previous run.
pub fn dashboard_with_store(store: MemoryStore<8>, demo_mode: bool) -> Dashboard {
    let pins = DashboardPins {
        open_led: LevelPin::default(),
        kept_open_led: LevelPin::default(),
        closing_led: LevelPin::default(),
        auto_closed_led: LevelPin::default(),
        disconnected_led: LevelPin::default(),
        buzzer: Speaker::default(),
    };
    let config = DashboardConfig {
        demo_mode,
        ..DashboardConfig::DEFAULT
    };
    let mut node = Dashboard::new(
        pins,
        store,
        config,
        DashboardInputs::default(),
        Millis::ZERO,
    );
    node.start(Millis::ZERO);
    node
}

/// Both nodes wired back to back, stepped by a shared simulated clock.
pub struct Bench {
    pub controller: Controller,
    pub dashboard: Dashboard,
    pub door: ControllerInputs,
    pub buttons: DashboardInputs,
    pub link_up: bool,
    pub now: u32,
}

impl Bench {
    pub fn new(door: ControllerInputs, demo_mode: bool) -> Self {
        Self {
            controller: controller(door, demo_mode),
            dashboard: dashboard(demo_mode),
            door,
            buttons: DashboardInputs::default(),
            link_up: true,
            now: 0,
        }
    }

    pub fn step(&mut self) {
        self.now += TICK_MS;
        let now = Millis::new(self.now);

        if let Some(request) = self.dashboard.poll_request(now)
            && self.link_up
        {
            let status = self
                .controller
                .handle_request(&request, now)
                .expect("dashboard sends valid requests");
            self.dashboard
                .handle_status(&status, now)
                .expect("controller sends valid status");
        }

        self.controller.tick(self.door, now);
        self.dashboard.tick(self.buttons, now);
    }

    pub fn run_for(&mut self, duration_ms: u32) {
        let end = self.now + duration_ms;
        while self.now < end {
            self.step();
        }
    }

    /// Steps until `done` holds, failing after `limit_ms`.
    pub fn run_until(&mut self, limit_ms: u32, mut done: impl FnMut(&Self) -> bool) {
        let end = self.now + limit_ms;
        while !done(self) {
            assert!(self.now < end, "condition not reached by {end} ms");
            self.step();
        }
    }
}
