//! Mirrors node telemetry to the debug log.
//!
//! On target records go out through defmt over RTT; host builds print them,
//! which keeps this module testable without a probe.

use door_core::telemetry::{EventId, TelemetryRecord, TelemetryRecorder};

use crate::status::LinkCounters;

/// Forwards each telemetry record to the log exactly once.
pub struct TelemetryMirror {
    node: &'static str,
    next: EventId,
}

impl TelemetryMirror {
    pub const fn new(node: &'static str) -> Self {
        Self { node, next: 0 }
    }

    /// Logs records added since the previous call and returns how many.
    pub fn forward<const N: usize>(&mut self, telemetry: &TelemetryRecorder<N>) -> usize {
        let mut forwarded = 0;
        for record in telemetry.since(self.next) {
            emit_record(self.node, record);
            forwarded += 1;
        }
        self.next = telemetry.next_id();
        forwarded
    }
}

/// Reports link trouble seen since the last report.
pub fn report_link(node: &'static str, counters: &LinkCounters) {
    if counters.has_faults() {
        emit_link_warning(node, counters);
    }
}

#[cfg(target_os = "none")]
fn emit_record(node: &str, record: &TelemetryRecord) {
    defmt::info!("{}: {}", node, defmt::Display2Format(record));
}

#[cfg(not(target_os = "none"))]
fn emit_record(node: &str, record: &TelemetryRecord) {
    println!("{node}: {record}");
}

#[cfg(target_os = "none")]
fn emit_link_warning(node: &str, counters: &LinkCounters) {
    defmt::warn!(
        "{}: link skipped={} dropped={} uart-errors={}",
        node,
        counters.bytes_skipped,
        counters.frames_dropped,
        counters.uart_errors
    );
}

#[cfg(not(target_os = "none"))]
fn emit_link_warning(node: &str, counters: &LinkCounters) {
    eprintln!(
        "{node}: link skipped={} dropped={} uart-errors={}",
        counters.bytes_skipped, counters.frames_dropped, counters.uart_errors
    );
}

#[cfg(test)]
mod tests {
    use door_core::clock::Millis;
    use door_core::telemetry::{TelemetryEventKind, TelemetryPayload};

    use super::*;

    #[test]
    fn forwards_each_record_once() {
        let mut telemetry = TelemetryRecorder::<8>::new();
        let mut mirror = TelemetryMirror::new("controller");

        telemetry.record(
            TelemetryEventKind::ReceptionLost,
            TelemetryPayload::none(),
            Millis::new(5),
        );
        telemetry.record(
            TelemetryEventKind::ReceptionRestored,
            TelemetryPayload::none(),
            Millis::new(9),
        );

        assert_eq!(mirror.forward(&telemetry), 2);
        assert_eq!(mirror.forward(&telemetry), 0);

        telemetry.record(
            TelemetryEventKind::FrameRejected,
            TelemetryPayload::none(),
            Millis::new(12),
        );
        assert_eq!(mirror.forward(&telemetry), 1);
    }

    #[test]
    fn overwritten_records_are_skipped() {
        let mut telemetry = TelemetryRecorder::<2>::new();
        let mut mirror = TelemetryMirror::new("dashboard");

        for at in 0..5 {
            telemetry.record(
                TelemetryEventKind::EventDropped,
                TelemetryPayload::none(),
                Millis::new(at),
            );
        }

        assert_eq!(mirror.forward(&telemetry), 2);
    }
}
