//! Telemetry event catalog and the fixed-size ring that records it.
//!
//! The core never logs directly. Components record structured events here and
//! the enclosing runtime decides how to surface them: the firmware mirrors new
//! records to defmt, the emulator prints them. Event kinds serialize to compact
//! `u16` codes (category in the high byte, argument in the low byte) so they can
//! travel over diagnostics channels.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::clock::Millis;

/// Identifier assigned to each recorded telemetry event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events shared by both nodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    /// A chain replaced whatever ran before and started at index 0.
    ChainStarted(u8),
    /// A chain was rolled back through `destroy`.
    ChainStopped(u8),
    /// A chain advanced past its last action.
    ChainCompleted(u8),
    /// A `LoopEnd` marker was reached without a matching `LoopBegin`.
    UnbalancedLoopEnd(u8),
    /// The per-tick advance budget ran out; the chain resumes next tick.
    AdvanceDeferred(u8),
    /// The state machine entered the state with this raw code.
    StateEntered(u8),
    GracefulRestartArmed,
    RestartGranted,
    RestartForced,
    ReceptionLost,
    ReceptionRestored,
    FrameRejected,
    SensorAnomaly,
    SensorAnomalyCleared,
    StoreWriteFailed,
    /// A raised event did not fit in the node's event queue.
    EventDropped,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::ChainStarted(id) => write!(f, "chain-started {id}"),
            TelemetryEventKind::ChainStopped(id) => write!(f, "chain-stopped {id}"),
            TelemetryEventKind::ChainCompleted(id) => write!(f, "chain-completed {id}"),
            TelemetryEventKind::UnbalancedLoopEnd(id) => write!(f, "unbalanced-loop-end {id}"),
            TelemetryEventKind::AdvanceDeferred(id) => write!(f, "advance-deferred {id}"),
            TelemetryEventKind::StateEntered(code) => write!(f, "state-entered {code}"),
            TelemetryEventKind::GracefulRestartArmed => f.write_str("graceful-restart-armed"),
            TelemetryEventKind::RestartGranted => f.write_str("restart-granted"),
            TelemetryEventKind::RestartForced => f.write_str("restart-forced"),
            TelemetryEventKind::ReceptionLost => f.write_str("reception-lost"),
            TelemetryEventKind::ReceptionRestored => f.write_str("reception-restored"),
            TelemetryEventKind::FrameRejected => f.write_str("frame-rejected"),
            TelemetryEventKind::SensorAnomaly => f.write_str("sensor-anomaly"),
            TelemetryEventKind::SensorAnomalyCleared => f.write_str("sensor-anomaly-cleared"),
            TelemetryEventKind::StoreWriteFailed => f.write_str("store-write-failed"),
            TelemetryEventKind::EventDropped => f.write_str("event-dropped"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    // High byte of the events that carry a one-byte argument.
    const CHAIN_STARTED_CATEGORY: u8 = 0x01;
    const CHAIN_STOPPED_CATEGORY: u8 = 0x02;
    const CHAIN_COMPLETED_CATEGORY: u8 = 0x03;
    const UNBALANCED_LOOP_END_CATEGORY: u8 = 0x04;
    const ADVANCE_DEFERRED_CATEGORY: u8 = 0x05;
    const STATE_ENTERED_CATEGORY: u8 = 0x06;
    const GRACEFUL_RESTART_ARMED_CODE: u16 = 0x0010;
    const RESTART_GRANTED_CODE: u16 = 0x0011;
    const RESTART_FORCED_CODE: u16 = 0x0012;
    const RECEPTION_LOST_CODE: u16 = 0x0020;
    const RECEPTION_RESTORED_CODE: u16 = 0x0021;
    const FRAME_REJECTED_CODE: u16 = 0x0022;
    const SENSOR_ANOMALY_CODE: u16 = 0x0030;
    const SENSOR_ANOMALY_CLEARED_CODE: u16 = 0x0031;
    const STORE_WRITE_FAILED_CODE: u16 = 0x0040;
    const EVENT_DROPPED_CODE: u16 = 0x0050;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::ChainStarted(id) => {
                u16::from_be_bytes([Self::CHAIN_STARTED_CATEGORY, id])
            }
            TelemetryEventKind::ChainStopped(id) => {
                u16::from_be_bytes([Self::CHAIN_STOPPED_CATEGORY, id])
            }
            TelemetryEventKind::ChainCompleted(id) => {
                u16::from_be_bytes([Self::CHAIN_COMPLETED_CATEGORY, id])
            }
            TelemetryEventKind::UnbalancedLoopEnd(id) => {
                u16::from_be_bytes([Self::UNBALANCED_LOOP_END_CATEGORY, id])
            }
            TelemetryEventKind::AdvanceDeferred(id) => {
                u16::from_be_bytes([Self::ADVANCE_DEFERRED_CATEGORY, id])
            }
            TelemetryEventKind::StateEntered(code) => {
                u16::from_be_bytes([Self::STATE_ENTERED_CATEGORY, code])
            }
            TelemetryEventKind::GracefulRestartArmed => Self::GRACEFUL_RESTART_ARMED_CODE,
            TelemetryEventKind::RestartGranted => Self::RESTART_GRANTED_CODE,
            TelemetryEventKind::RestartForced => Self::RESTART_FORCED_CODE,
            TelemetryEventKind::ReceptionLost => Self::RECEPTION_LOST_CODE,
            TelemetryEventKind::ReceptionRestored => Self::RECEPTION_RESTORED_CODE,
            TelemetryEventKind::FrameRejected => Self::FRAME_REJECTED_CODE,
            TelemetryEventKind::SensorAnomaly => Self::SENSOR_ANOMALY_CODE,
            TelemetryEventKind::SensorAnomalyCleared => Self::SENSOR_ANOMALY_CLEARED_CODE,
            TelemetryEventKind::StoreWriteFailed => Self::STORE_WRITE_FAILED_CODE,
            TelemetryEventKind::EventDropped => Self::EVENT_DROPPED_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub const fn from_raw(code: u16) -> Self {
        let [category, argument] = code.to_be_bytes();
        match category {
            Self::CHAIN_STARTED_CATEGORY => TelemetryEventKind::ChainStarted(argument),
            Self::CHAIN_STOPPED_CATEGORY => TelemetryEventKind::ChainStopped(argument),
            Self::CHAIN_COMPLETED_CATEGORY => TelemetryEventKind::ChainCompleted(argument),
            Self::UNBALANCED_LOOP_END_CATEGORY => TelemetryEventKind::UnbalancedLoopEnd(argument),
            Self::ADVANCE_DEFERRED_CATEGORY => TelemetryEventKind::AdvanceDeferred(argument),
            Self::STATE_ENTERED_CATEGORY => TelemetryEventKind::StateEntered(argument),
            _ => match code {
                Self::GRACEFUL_RESTART_ARMED_CODE => TelemetryEventKind::GracefulRestartArmed,
                Self::RESTART_GRANTED_CODE => TelemetryEventKind::RestartGranted,
                Self::RESTART_FORCED_CODE => TelemetryEventKind::RestartForced,
                Self::RECEPTION_LOST_CODE => TelemetryEventKind::ReceptionLost,
                Self::RECEPTION_RESTORED_CODE => TelemetryEventKind::ReceptionRestored,
                Self::FRAME_REJECTED_CODE => TelemetryEventKind::FrameRejected,
                Self::SENSOR_ANOMALY_CODE => TelemetryEventKind::SensorAnomaly,
                Self::SENSOR_ANOMALY_CLEARED_CODE => TelemetryEventKind::SensorAnomalyCleared,
                Self::STORE_WRITE_FAILED_CODE => TelemetryEventKind::StoreWriteFailed,
                Self::EVENT_DROPPED_CODE => TelemetryEventKind::EventDropped,
                other => TelemetryEventKind::Custom(other),
            },
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Cursor details for chain lifecycle events.
    Chain(ChainTelemetry),
    /// History snapshot for state entries (raw state codes).
    Transition(TransitionTelemetry),
    /// Uptime at which a restart decision was taken.
    Restart(RestartTelemetry),
}

impl TelemetryPayload {
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Cursor position and running time of a chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChainTelemetry {
    pub index: u8,
    pub running_for_ms: Option<u32>,
}

impl ChainTelemetry {
    #[must_use]
    pub fn new(index: usize, running_for_ms: Option<u32>) -> Self {
        Self {
            index: u8::try_from(index).unwrap_or(u8::MAX),
            running_for_ms,
        }
    }
}

/// State codes around an accepted transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransitionTelemetry {
    pub last: Option<u8>,
    pub before_last: Option<u8>,
}

impl TransitionTelemetry {
    #[must_use]
    pub const fn new(last: Option<u8>, before_last: Option<u8>) -> Self {
        Self { last, before_last }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RestartTelemetry {
    pub uptime_ms: u32,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Millis,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} t={} {}", self.id, self.timestamp, self.event)
    }
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Identifier the next record will receive.
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Iterates over records whose id is at least `first`, oldest first.
    pub fn since(&self, first: EventId) -> impl Iterator<Item = &TelemetryRecord> {
        self.oldest_first()
            .filter(move |record| record.id.wrapping_sub(first) < EventId::MAX / 2)
    }

    /// Returns `true` when any retained record matches `event`.
    #[must_use]
    pub fn contains(&self, event: TelemetryEventKind) -> bool {
        self.oldest_first().any(|record| record.event == event)
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: Millis,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    /// Records a chain lifecycle event with its cursor position.
    pub fn record_chain(
        &mut self,
        event: TelemetryEventKind,
        index: usize,
        started_at: Option<Millis>,
        timestamp: Millis,
    ) -> EventId {
        let running_for = started_at.map(|start| timestamp.elapsed_since(start));
        self.record(
            event,
            TelemetryPayload::Chain(ChainTelemetry::new(index, running_for)),
            timestamp,
        )
    }

    /// Records a state entry along with the two previous states.
    pub fn record_state_entry(
        &mut self,
        state: u8,
        last: Option<u8>,
        before_last: Option<u8>,
        timestamp: Millis,
    ) -> EventId {
        self.record(
            TelemetryEventKind::StateEntered(state),
            TelemetryPayload::Transition(TransitionTelemetry::new(last, before_last)),
            timestamp,
        )
    }

    /// Records a restart phase change.
    pub fn record_restart(&mut self, event: TelemetryEventKind, timestamp: Millis) -> EventId {
        self.record(
            event,
            TelemetryPayload::Restart(RestartTelemetry {
                uptime_ms: timestamp.as_u32(),
            }),
            timestamp,
        )
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_codes_round_trip() {
        let fixtures = [
            (TelemetryEventKind::ChainStarted(3), 0x0103),
            (TelemetryEventKind::ChainStopped(0xFF), 0x02FF),
            (TelemetryEventKind::UnbalancedLoopEnd(0x80), 0x0480),
            (TelemetryEventKind::AdvanceDeferred(0), 0x0500),
            (TelemetryEventKind::ChainCompleted(0xFE), 0x03FE),
            (TelemetryEventKind::StateEntered(7), 0x0607),
            (TelemetryEventKind::RestartForced, 0x0012),
            (TelemetryEventKind::FrameRejected, 0x0022),
        ];

        for (event, code) in fixtures {
            assert_eq!(event.to_raw(), code);
            assert_eq!(TelemetryEventKind::from_raw(code), event);
        }

        assert_eq!(
            TelemetryEventKind::from_raw(0x7777),
            TelemetryEventKind::Custom(0x7777)
        );
    }

    #[test]
    fn records_chain_running_time() {
        let mut recorder = TelemetryRecorder::<8>::new();

        let id = recorder.record_chain(
            TelemetryEventKind::ChainCompleted(2),
            5,
            Some(Millis::new(100)),
            Millis::new(1_350),
        );
        assert_eq!(id, 0);

        let record = recorder.latest().copied().unwrap();
        match record.details {
            TelemetryPayload::Chain(details) => {
                assert_eq!(details.index, 5);
                assert_eq!(details.running_for_ms, Some(1_250));
            }
            _ => panic!("expected chain payload"),
        }
    }

    #[test]
    fn chain_index_saturates_at_the_byte_limit() {
        assert_eq!(ChainTelemetry::new(255, None).index, 255);
        assert_eq!(ChainTelemetry::new(300, None).index, u8::MAX);
    }

    #[test]
    fn ring_keeps_most_recent_records() {
        let mut recorder = TelemetryRecorder::<4>::new();
        for step in 0..6u32 {
            recorder.record(
                TelemetryEventKind::Custom(0x0900),
                TelemetryPayload::none(),
                Millis::new(step),
            );
        }

        assert_eq!(recorder.len(), 4);
        let ids: heapless::Vec<EventId, 4> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids.as_slice(), &[2, 3, 4, 5]);
        assert_eq!(recorder.since(4).count(), 2);
        assert_eq!(recorder.next_id(), 6);
    }

    #[test]
    fn state_entry_payload_carries_history() {
        let mut recorder = TelemetryRecorder::<4>::new();
        recorder.record_state_entry(3, Some(5), None, Millis::new(10));

        let record = recorder.latest().copied().unwrap();
        assert_eq!(record.event, TelemetryEventKind::StateEntered(3));
        assert_eq!(
            record.details,
            TelemetryPayload::Transition(TransitionTelemetry::new(Some(5), None))
        );
    }
}
