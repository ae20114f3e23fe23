mod common;

use common::Bench;
use door_core::controller::ControllerInputs;
use door_core::dashboard::DashboardState;
use door_core::hardware::{OutputId, RelayId};
use door_core::link::{DashboardMessage, DoorState};
use door_core::telemetry::TelemetryEventKind;

fn led_high(bench: &Bench, id: OutputId) -> bool {
    bench.dashboard.hardware().led(id).pin().high
}

#[test]
fn dashboard_waits_for_the_first_status() {
    let mut bench = Bench::new(ControllerInputs::door_open(), false);
    assert_eq!(bench.dashboard.state(), DashboardState::WaitingFirstSignal);

    bench.run_for(50);

    assert_eq!(bench.dashboard.state(), DashboardState::Door(DoorState::Open));
    assert!(led_high(&bench, OutputId::Open));
}

#[test]
fn close_button_reaches_the_controller_once() {
    let mut bench = Bench::new(ControllerInputs::door_open(), false);
    bench.run_for(100);

    bench.buttons.close_button = true;
    bench.run_for(40);
    bench.buttons.close_button = false;
    assert_eq!(
        bench.dashboard.pending_message(),
        Some(DashboardMessage::Close)
    );

    bench.run_until(100, |b| b.controller.state() == DoorState::Closing);
    bench.run_until(100, |b| {
        b.dashboard.state() == DashboardState::Door(DoorState::Closing)
    });
    assert_eq!(bench.dashboard.pending_message(), None);
    assert!(led_high(&bench, OutputId::Closing));
    assert!(!led_high(&bench, OutputId::Open));

    // Polls keep flowing; the acknowledged press must not toggle Closing back to Open.
    bench.run_for(500);
    assert_eq!(bench.controller.state(), DoorState::Closing);
    assert!(
        bench
            .controller
            .hardware()
            .door_relay(RelayId::Door1)
            .pin()
            .high
    );

    bench.door = ControllerInputs::door_closed();
    bench.run_until(200, |b| {
        b.dashboard.state() == DashboardState::Door(DoorState::Closed)
    });
    assert!(!bench.controller.is_auto_closed());
    assert!(!led_high(&bench, OutputId::AutoClosed));
}

#[test]
fn silence_disconnects_both_nodes_until_frames_return() {
    let mut bench = Bench::new(ControllerInputs::door_closed(), false);
    bench.run_for(100);
    assert_eq!(bench.dashboard.state(), DashboardState::Door(DoorState::Closed));

    bench.link_up = false;
    bench.run_for(5_100);

    assert_eq!(bench.dashboard.state(), DashboardState::Disconnected);
    assert!(
        bench
            .dashboard
            .hardware()
            .led(OutputId::Disconnected)
            .is_blinking()
    );
    assert!(bench.controller.hardware().disconnected_led().pin().high);
    assert!(
        bench
            .controller
            .telemetry()
            .contains(TelemetryEventKind::ReceptionLost)
    );

    bench.link_up = true;
    bench.run_for(100);

    assert_eq!(bench.dashboard.state(), DashboardState::Door(DoorState::Closed));
    assert!(!bench.controller.hardware().disconnected_led().pin().high);
    assert!(!led_high(&bench, OutputId::Disconnected));
    assert!(
        bench
            .dashboard
            .telemetry()
            .contains(TelemetryEventKind::ReceptionRestored)
    );
}

#[test]
fn demo_toggle_switches_both_nodes() {
    let mut bench = Bench::new(ControllerInputs::door_closed(), false);
    bench.run_for(100);

    bench.buttons.ack_button = true;
    bench.run_for(3_100);
    bench.buttons.ack_button = false;
    assert!(bench.dashboard.demo_mode());
    assert!(bench.dashboard.is_combo_running());

    bench.run_until(100, |b| b.controller.demo_mode());
}

#[test]
fn volume_survives_a_dashboard_restart() {
    let mut bench = Bench::new(ControllerInputs::door_closed(), false);
    bench.run_for(100);
    let before = bench.dashboard.volume_step();

    bench.buttons.ack_button = true;
    bench.run_for(100);
    bench.buttons.keep_open_button = true;
    bench.run_for(40);
    bench.buttons.keep_open_button = false;
    bench.buttons.ack_button = false;
    bench.run_for(100);
    let after = bench.dashboard.volume_step();
    assert_eq!(after, before + 1);

    let rebooted = common::dashboard_with_store(bench.dashboard.into_store(), false);
    assert_eq!(rebooted.volume_step(), after);
}

#[test]
fn press_after_a_dashboard_restart_is_applied() {
    let mut bench = Bench::new(ControllerInputs::door_open(), false);
    bench.run_for(100);

    bench.buttons.keep_open_button = true;
    bench.run_for(40);
    bench.buttons.keep_open_button = false;
    bench.run_until(200, |b| {
        b.dashboard.state() == DashboardState::Door(DoorState::KeptOpen)
    });

    // The restarted dashboard numbers its first press 1 again.
    bench.dashboard = common::dashboard_with_store(bench.dashboard.into_store(), false);
    bench.run_for(100);
    assert_eq!(bench.controller.state(), DoorState::KeptOpen);

    bench.buttons.keep_open_button = true;
    bench.run_for(40);
    bench.buttons.keep_open_button = false;
    bench.run_until(200, |b| b.controller.state() == DoorState::Open);
    bench.run_until(100, |b| b.dashboard.pending_message().is_none());
}
