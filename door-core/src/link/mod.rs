//! Point-to-point frames exchanged between the dashboard and the controller.
//!
//! Every frame starts with [`HEADER`]. Payload bytes mix ones and zeros so that
//! line noise is unlikely to decode as a valid value.
//!
//! ```text
//! request (dashboard -> controller): [HEADER, message, event_id]
//! status  (controller -> dashboard): [HEADER, door_state, acked_event_id, flags]
//! ```
//!
//! Button messages carry a non-zero event id and are repeated on every poll
//! until a status frame acknowledges that id. Polls carry id `0`.

use core::fmt;

use winnow::Parser;
use winnow::combinator::eof;
use winnow::error::ContextError;
use winnow::token::any;

use crate::clock::{Deadline, Millis};

pub const HEADER: u8 = 0b1110_0111;

/// Status flag: the last close was automatic and has not been acknowledged.
pub const FLAG_AUTO_CLOSED: u8 = 0b1001_1001;
/// Status flag: nothing to acknowledge.
pub const FLAG_CLEAR: u8 = 0b0110_0110;

pub const REQUEST_FRAME_LEN: usize = 3;
pub const STATUS_FRAME_LEN: usize = 4;

/// Silence tolerated before the link is reported lost.
pub const RECEPTION_TIMEOUT_MS: u32 = 5_000;
/// Delay between two dashboard polls.
pub const POLL_PERIOD_MS: u32 = 50;

/// Door state reported by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DoorState {
    Anomaly,
    Closed,
    Open,
    KeptOpen,
    WillCloseSoon,
    Closing,
    ClosingFailed,
}

impl DoorState {
    pub const ALL: [DoorState; 7] = [
        DoorState::Anomaly,
        DoorState::Closed,
        DoorState::Open,
        DoorState::KeptOpen,
        DoorState::WillCloseSoon,
        DoorState::Closing,
        DoorState::ClosingFailed,
    ];

    /// Position in [`DoorState::ALL`]; also the state's telemetry code.
    #[must_use]
    pub const fn as_index(self) -> u8 {
        match self {
            DoorState::Anomaly => 0,
            DoorState::Closed => 1,
            DoorState::Open => 2,
            DoorState::KeptOpen => 3,
            DoorState::WillCloseSoon => 4,
            DoorState::Closing => 5,
            DoorState::ClosingFailed => 6,
        }
    }

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            DoorState::Anomaly => 0b0110_1110,
            DoorState::Closed => 0b1010_1010,
            DoorState::Open => 0b0110_1000,
            DoorState::KeptOpen => 0b0010_1011,
            DoorState::WillCloseSoon => 0b1111_0111,
            DoorState::Closing => 0b1001_0110,
            DoorState::ClosingFailed => 0b1101_0001,
        }
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0b0110_1110 => Some(DoorState::Anomaly),
            0b1010_1010 => Some(DoorState::Closed),
            0b0110_1000 => Some(DoorState::Open),
            0b0010_1011 => Some(DoorState::KeptOpen),
            0b1111_0111 => Some(DoorState::WillCloseSoon),
            0b1001_0110 => Some(DoorState::Closing),
            0b1101_0001 => Some(DoorState::ClosingFailed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DoorState::Anomaly => "anomaly",
            DoorState::Closed => "closed",
            DoorState::Open => "open",
            DoorState::KeptOpen => "kept-open",
            DoorState::WillCloseSoon => "will-close-soon",
            DoorState::Closing => "closing",
            DoorState::ClosingFailed => "closing-failed",
        }
    }

    /// States in which the door is, or may be, open.
    #[must_use]
    pub const fn is_open_like(self) -> bool {
        matches!(
            self,
            DoorState::Open
                | DoorState::KeptOpen
                | DoorState::WillCloseSoon
                | DoorState::Closing
                | DoorState::ClosingFailed
        )
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request sent by the dashboard.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DashboardMessage {
    Polling,
    KeepOpen,
    Close,
    AckAutoClosed,
    ToggleDemo,
}

impl DashboardMessage {
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            DashboardMessage::Polling => 0,
            DashboardMessage::KeepOpen => 0b1011_0110,
            DashboardMessage::Close => 0b1100_1100,
            DashboardMessage::AckAutoClosed => 0b0011_0011,
            DashboardMessage::ToggleDemo => 0b0110_0011,
        }
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(DashboardMessage::Polling),
            0b1011_0110 => Some(DashboardMessage::KeepOpen),
            0b1100_1100 => Some(DashboardMessage::Close),
            0b0011_0011 => Some(DashboardMessage::AckAutoClosed),
            0b0110_0011 => Some(DashboardMessage::ToggleDemo),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DashboardMessage::Polling => "polling",
            DashboardMessage::KeepOpen => "keep-open",
            DashboardMessage::Close => "close",
            DashboardMessage::AckAutoClosed => "ack-auto-closed",
            DashboardMessage::ToggleDemo => "toggle-demo",
        }
    }
}

/// Why a received frame was rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameError {
    Truncated,
    BadHeader,
    UnknownMessage,
    BadFlags,
    TrailingBytes,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RequestFrame {
    pub message: DashboardMessage,
    /// `0` for polls; otherwise the id to acknowledge.
    pub event_id: u8,
}

impl RequestFrame {
    #[must_use]
    pub const fn polling() -> Self {
        Self {
            message: DashboardMessage::Polling,
            event_id: 0,
        }
    }

    #[must_use]
    pub const fn encode(&self) -> [u8; REQUEST_FRAME_LEN] {
        [HEADER, self.message.to_byte(), self.event_id]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut input = bytes;
        header(&mut input)?;
        let message = field(&mut input, DashboardMessage::from_byte, FrameError::UnknownMessage)?;
        let event_id = field(&mut input, Some, FrameError::Truncated)?;
        end(&mut input)?;

        Ok(Self { message, event_id })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusFrame {
    pub state: DoorState,
    pub acked_event_id: u8,
    pub auto_closed: bool,
}

impl StatusFrame {
    #[must_use]
    pub const fn encode(&self) -> [u8; STATUS_FRAME_LEN] {
        let flags = if self.auto_closed {
            FLAG_AUTO_CLOSED
        } else {
            FLAG_CLEAR
        };
        [HEADER, self.state.to_byte(), self.acked_event_id, flags]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut input = bytes;
        header(&mut input)?;
        let state = field(&mut input, DoorState::from_byte, FrameError::UnknownMessage)?;
        let acked_event_id = field(&mut input, Some, FrameError::Truncated)?;
        let auto_closed = field(&mut input, decode_flags, FrameError::BadFlags)?;
        end(&mut input)?;

        Ok(Self {
            state,
            acked_event_id,
            auto_closed,
        })
    }
}

fn decode_flags(byte: u8) -> Option<bool> {
    match byte {
        FLAG_AUTO_CLOSED => Some(true),
        FLAG_CLEAR => Some(false),
        _ => None,
    }
}

fn header(input: &mut &[u8]) -> Result<(), FrameError> {
    field(
        input,
        |byte| (byte == HEADER).then_some(()),
        FrameError::BadHeader,
    )
}

/// Takes one byte and decodes it, telling a missing byte from an invalid one.
fn field<O>(
    input: &mut &[u8],
    decode: impl FnMut(u8) -> Option<O>,
    invalid: FrameError,
) -> Result<O, FrameError> {
    if input.is_empty() {
        return Err(FrameError::Truncated);
    }

    any::<_, ContextError>
        .verify_map(decode)
        .parse_next(input)
        .map_err(|_| invalid)
}

fn end(input: &mut &[u8]) -> Result<(), FrameError> {
    eof::<_, ContextError>
        .void()
        .parse_next(input)
        .map_err(|_| FrameError::TrailingBytes)
}

/// Link state change reported by [`ReceptionWatchdog`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkStatus {
    Lost,
    Restored,
}

/// Advisory timeout on frame reception.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReceptionWatchdog {
    timeout_ms: u32,
    deadline: Option<Deadline>,
    lost: bool,
}

impl ReceptionWatchdog {
    #[must_use]
    pub const fn new(timeout_ms: u32) -> Self {
        Self {
            timeout_ms,
            deadline: None,
            lost: false,
        }
    }

    /// Starts watching from `now`.
    pub fn enable(&mut self, now: Millis) {
        self.deadline = Some(Deadline::after(now, self.timeout_ms));
    }

    #[must_use]
    pub const fn is_lost(&self) -> bool {
        self.lost
    }

    /// Records a valid frame; reports the link back once it was lost.
    pub fn on_received(&mut self, now: Millis) -> Option<LinkStatus> {
        if self.deadline.is_some() {
            self.deadline = Some(Deadline::after(now, self.timeout_ms));
        }
        if self.lost {
            self.lost = false;
            return Some(LinkStatus::Restored);
        }
        None
    }

    /// Reports the loss once, when the timeout strictly passed.
    pub fn poll(&mut self, now: Millis) -> Option<LinkStatus> {
        let deadline = self.deadline?;
        if !self.lost && deadline.has_passed(now) {
            self.lost = true;
            return Some(LinkStatus::Lost);
        }
        None
    }
}

/// Dashboard side: repeats the latest button message until acknowledged.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RemoteButtonSender {
    sending: bool,
    event_id: u8,
    message: DashboardMessage,
}

impl RemoteButtonSender {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sending: false,
            event_id: 0,
            message: DashboardMessage::Polling,
        }
    }

    /// Queues `message`, replacing any unacknowledged one.
    pub fn press(&mut self, message: DashboardMessage) {
        self.sending = true;
        self.event_id = self.event_id.wrapping_add(1);
        if self.event_id == 0 {
            self.event_id = 1;
        }
        self.message = message;
    }

    /// Stops repeating once the controller acknowledged the current id.
    pub fn acknowledge(&mut self, event_id: u8) {
        if self.sending && self.event_id == event_id {
            self.sending = false;
        }
    }

    #[must_use]
    pub const fn current_event_id(&self) -> u8 {
        if self.sending { self.event_id } else { 0 }
    }

    #[must_use]
    pub const fn is_sending(&self) -> bool {
        self.sending
    }

    /// Frame to send on the next poll.
    #[must_use]
    pub const fn request(&self) -> RequestFrame {
        if self.sending {
            RequestFrame {
                message: self.message,
                event_id: self.event_id,
            }
        } else {
            RequestFrame::polling()
        }
    }
}

impl Default for RemoteButtonSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller side: handles each button event id once.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EventIdFilter {
    last: u8,
}

impl EventIdFilter {
    #[must_use]
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Returns the message when it carries an id not handled yet.
    ///
    /// A frame without an id means the sender holds nothing unacknowledged,
    /// either because its last press was acked or because it just booted and
    /// numbers its presses from 1 again. Either way the remembered id is
    /// forgotten so the next press is applied.
    pub fn accept(&mut self, frame: RequestFrame) -> Option<DashboardMessage> {
        if frame.event_id == 0 {
            self.last = 0;
            return None;
        }
        if frame.event_id == self.last {
            return None;
        }
        self.last = frame.event_id;
        Some(frame.message)
    }

    /// Id echoed back in status frames.
    #[must_use]
    pub const fn acked_event_id(&self) -> u8 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_layout() {
        let frame = RequestFrame {
            message: DashboardMessage::Close,
            event_id: 7,
        };

        assert_eq!(frame.encode(), [HEADER, 0b1100_1100, 7]);
        assert_eq!(RequestFrame::decode(&frame.encode()), Ok(frame));
    }

    #[test]
    fn status_frame_layout() {
        let frame = StatusFrame {
            state: DoorState::WillCloseSoon,
            acked_event_id: 3,
            auto_closed: true,
        };

        assert_eq!(frame.encode(), [HEADER, 0b1111_0111, 3, FLAG_AUTO_CLOSED]);
        assert_eq!(StatusFrame::decode(&frame.encode()), Ok(frame));
    }

    #[test]
    fn rejections_are_classified() {
        let cases: [(&[u8], Result<RequestFrame, FrameError>); 5] = [
            (&[], Err(FrameError::Truncated)),
            (&[HEADER, 0b1011_0110], Err(FrameError::Truncated)),
            (&[0b1110_0110, 0, 0], Err(FrameError::BadHeader)),
            (&[HEADER, 0b1111_1111, 1], Err(FrameError::UnknownMessage)),
            (&[HEADER, 0, 0, 0], Err(FrameError::TrailingBytes)),
        ];

        for (bytes, expected) in cases {
            assert_eq!(RequestFrame::decode(bytes), expected, "bytes {bytes:?}");
        }

        assert_eq!(
            StatusFrame::decode(&[HEADER, 0b1010_1010, 0, 0]),
            Err(FrameError::BadFlags)
        );
        assert_eq!(
            StatusFrame::decode(&[HEADER, 0b1010_1011, 0, FLAG_CLEAR]),
            Err(FrameError::UnknownMessage)
        );
    }

    #[test]
    fn door_state_bytes_are_distinct() {
        for state in DoorState::ALL {
            assert_eq!(DoorState::from_byte(state.to_byte()), Some(state));
            assert_ne!(state.to_byte(), HEADER);
        }
    }

    #[test]
    fn watchdog_reports_loss_and_recovery_once() {
        let mut watchdog = ReceptionWatchdog::new(RECEPTION_TIMEOUT_MS);
        assert_eq!(watchdog.poll(Millis::new(60_000)), None);

        watchdog.enable(Millis::ZERO);
        assert_eq!(watchdog.poll(Millis::new(5_000)), None);
        assert_eq!(watchdog.poll(Millis::new(5_001)), Some(LinkStatus::Lost));
        assert_eq!(watchdog.poll(Millis::new(9_000)), None);

        assert_eq!(
            watchdog.on_received(Millis::new(9_500)),
            Some(LinkStatus::Restored)
        );
        assert_eq!(watchdog.on_received(Millis::new(9_600)), None);
        assert_eq!(watchdog.poll(Millis::new(14_600)), None);
        assert_eq!(watchdog.poll(Millis::new(14_601)), Some(LinkStatus::Lost));
    }

    #[test]
    fn sender_repeats_until_acknowledged() {
        let mut sender = RemoteButtonSender::new();
        assert_eq!(sender.request(), RequestFrame::polling());

        sender.press(DashboardMessage::KeepOpen);
        let first = sender.request();
        assert_eq!(first.event_id, 1);
        assert_eq!(sender.request(), first);

        sender.acknowledge(2);
        assert!(sender.is_sending());
        sender.acknowledge(1);
        assert_eq!(sender.current_event_id(), 0);
        assert_eq!(sender.request(), RequestFrame::polling());
    }

    #[test]
    fn sender_ids_skip_zero() {
        let mut sender = RemoteButtonSender::new();
        for _ in 0..255 {
            sender.press(DashboardMessage::Close);
        }
        assert_eq!(sender.current_event_id(), 255);

        sender.press(DashboardMessage::Close);
        assert_eq!(sender.current_event_id(), 1);
    }

    #[test]
    fn filter_handles_each_id_once() {
        let mut filter = EventIdFilter::new();
        let frame = RequestFrame {
            message: DashboardMessage::KeepOpen,
            event_id: 4,
        };

        assert_eq!(filter.accept(RequestFrame::polling()), None);
        assert_eq!(filter.accept(frame), Some(DashboardMessage::KeepOpen));
        assert_eq!(filter.accept(frame), None);
        assert_eq!(filter.acked_event_id(), 4);
    }

    #[test]
    fn filter_forgets_the_id_once_the_sender_goes_idle() {
        let mut filter = EventIdFilter::new();
        let first_press = RequestFrame {
            message: DashboardMessage::Close,
            event_id: 1,
        };

        assert_eq!(filter.accept(first_press), Some(DashboardMessage::Close));
        assert_eq!(filter.accept(RequestFrame::polling()), None);
        assert_eq!(filter.acked_event_id(), 0);

        // A rebooted sender numbers its presses from 1 again.
        assert_eq!(filter.accept(first_press), Some(DashboardMessage::Close));
    }
}
