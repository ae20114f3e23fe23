use embassy_time::{Duration, Ticker};

use super::board::{GpioOutput, NodeStore, PwmBuzzer};
use super::now;
use crate::link::NodeLinkQueue;
use crate::status::{self, LinkCounters};
use crate::telemetry::{self, TelemetryMirror};

/// Control-loop period shared by both roles.
const TICK_MS: u64 = 1;
/// Link faults are summarised at most this often.
const LINK_REPORT_PERIOD_MS: u32 = 10_000;

#[cfg(not(feature = "dashboard"))]
mod role {
    use door_core::controller::ControllerNode;

    use super::super::board::ControllerInputPins;
    use super::*;

    pub type Node = ControllerNode<GpioOutput, PwmBuzzer, NodeStore>;
    pub type Inputs = ControllerInputPins;
    pub const NAME: &str = "controller";

    /// Answers every request received since the previous tick.
    pub fn exchange(node: &mut Node, queue: &NodeLinkQueue) {
        let requests = queue.inbound_receiver();
        let replies = queue.outbound_sender();
        while let Ok(request) = requests.try_receive() {
            let at = now();
            // Rejected frames are already in the node's telemetry.
            if let Ok(reply) = node.handle_request(&request, at)
                && replies.try_send(reply).is_err()
            {
                status::record_frame_dropped();
            }
        }
    }
}

#[cfg(feature = "dashboard")]
mod role {
    use door_core::dashboard::DashboardNode;

    use super::super::board::DashboardInputPins;
    use super::*;

    pub type Node = DashboardNode<GpioOutput, PwmBuzzer, NodeStore>;
    pub type Inputs = DashboardInputPins;
    pub const NAME: &str = "dashboard";

    /// Applies received status frames and sends the next poll when due.
    pub fn exchange(node: &mut Node, queue: &NodeLinkQueue) {
        let statuses = queue.inbound_receiver();
        while let Ok(frame) = statuses.try_receive() {
            // Rejected frames are already in the node's telemetry.
            let _ = node.handle_status(&frame, now());
        }
        if let Some(request) = node.poll_request(now())
            && queue.outbound_sender().try_send(request).is_err()
        {
            status::record_frame_dropped();
        }
    }
}

pub use role::{Inputs, Node};

#[embassy_executor::task]
pub async fn run(mut node: Node, inputs: Inputs, queue: &'static NodeLinkQueue) -> ! {
    let mut mirror = TelemetryMirror::new(role::NAME);
    let mut reported = LinkCounters::default();
    let mut last_report = now();
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));

    node.start(now());
    loop {
        role::exchange(&mut node, queue);

        let at = now();
        let decision = node.tick(inputs.read(), at);
        mirror.forward(node.telemetry());

        if at.elapsed_since(last_report) >= LINK_REPORT_PERIOD_MS {
            let counters = status::link_counters();
            telemetry::report_link(role::NAME, &counters.since(&reported));
            reported = counters;
            last_report = at;
        }

        if decision.should_restart() {
            defmt::warn!("{}: restarting ({})", role::NAME, defmt::Debug2Format(&decision));
            cortex_m::peripheral::SCB::sys_reset();
        }

        ticker.next().await;
    }
}
