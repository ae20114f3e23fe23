//! Serial link plumbing between the control loop and the UART task.
//!
//! The UART task reassembles fixed-length frames from the byte stream and
//! hands them to the control task over bounded channels; replies travel back
//! the same way. Decoding stays in `door-core`, so a frame that is aligned
//! but malformed still reaches the node and lands in its telemetry.

use door_core::clock::Millis;
use door_core::link::{HEADER, REQUEST_FRAME_LEN, STATUS_FRAME_LEN};
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Vec;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

#[cfg(target_os = "none")]
type LinkMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type LinkMutex = NoopRawMutex;

/// Depth of each frame channel.
pub const LINK_QUEUE_DEPTH: usize = 4;

/// Silence after which a partially received frame is abandoned.
pub const INTER_BYTE_TIMEOUT_MS: u32 = 20;

/// Frame length the node receives.
#[cfg(not(feature = "dashboard"))]
pub const INBOUND_FRAME_LEN: usize = REQUEST_FRAME_LEN;
/// Frame length the node sends.
#[cfg(not(feature = "dashboard"))]
pub const OUTBOUND_FRAME_LEN: usize = STATUS_FRAME_LEN;

#[cfg(feature = "dashboard")]
pub const INBOUND_FRAME_LEN: usize = STATUS_FRAME_LEN;
#[cfg(feature = "dashboard")]
pub const OUTBOUND_FRAME_LEN: usize = REQUEST_FRAME_LEN;

pub type FrameChannel<const LEN: usize> = Channel<LinkMutex, [u8; LEN], LINK_QUEUE_DEPTH>;

pub type FrameSender<'a, const LEN: usize> = Sender<'a, LinkMutex, [u8; LEN], LINK_QUEUE_DEPTH>;

pub type FrameReceiver<'a, const LEN: usize> =
    Receiver<'a, LinkMutex, [u8; LEN], LINK_QUEUE_DEPTH>;

/// Both directions of the link, shared by the UART and control tasks.
pub struct LinkQueue<const IN: usize, const OUT: usize> {
    inbound: FrameChannel<IN>,
    outbound: FrameChannel<OUT>,
}

/// Queue sized for the role this firmware was built for.
pub type NodeLinkQueue = LinkQueue<INBOUND_FRAME_LEN, OUTBOUND_FRAME_LEN>;

impl<const IN: usize, const OUT: usize> LinkQueue<IN, OUT> {
    pub const fn new() -> Self {
        Self {
            inbound: Channel::new(),
            outbound: Channel::new(),
        }
    }

    /// Used by the UART task for frames read off the wire.
    pub fn inbound_sender(&self) -> FrameSender<'_, IN> {
        self.inbound.sender()
    }

    pub fn inbound_receiver(&self) -> FrameReceiver<'_, IN> {
        self.inbound.receiver()
    }

    /// Used by the control task for replies and polls.
    pub fn outbound_sender(&self) -> FrameSender<'_, OUT> {
        self.outbound.sender()
    }

    pub fn outbound_receiver(&self) -> FrameReceiver<'_, OUT> {
        self.outbound.receiver()
    }
}

impl<const IN: usize, const OUT: usize> Default for LinkQueue<IN, OUT> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cuts a byte stream into `LEN`-byte frames that start with [`HEADER`].
///
/// Bytes before a header are skipped. A partial frame is dropped when the
/// next byte arrives more than [`INTER_BYTE_TIMEOUT_MS`] after the previous
/// one, which realigns the stream after a lost byte.
#[derive(Debug)]
pub struct FrameAssembler<const LEN: usize> {
    buffer: Vec<u8, LEN>,
    last_byte_at: Millis,
    skipped: u32,
}

impl<const LEN: usize> FrameAssembler<LEN> {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            last_byte_at: Millis::ZERO,
            skipped: 0,
        }
    }

    /// Feeds one byte and returns a frame once `LEN` bytes are collected.
    pub fn push(&mut self, byte: u8, now: Millis) -> Option<[u8; LEN]> {
        if !self.buffer.is_empty() && now.elapsed_since(self.last_byte_at) > INTER_BYTE_TIMEOUT_MS
        {
            self.discard();
        }
        self.last_byte_at = now;

        if self.buffer.is_empty() && byte != HEADER {
            self.skipped = self.skipped.wrapping_add(1);
            return None;
        }
        if self.buffer.push(byte).is_err() {
            self.discard();
            return None;
        }
        if self.buffer.len() < LEN {
            return None;
        }

        let mut frame = [0; LEN];
        frame.copy_from_slice(&self.buffer);
        self.buffer.clear();
        Some(frame)
    }

    /// Bytes thrown away so far, stale partial frames included.
    pub const fn skipped(&self) -> u32 {
        self.skipped
    }

    fn discard(&mut self) {
        let dropped = u32::try_from(self.buffer.len()).unwrap_or(u32::MAX);
        self.skipped = self.skipped.wrapping_add(dropped);
        self.buffer.clear();
    }
}

impl<const LEN: usize> Default for FrameAssembler<LEN> {
    fn default() -> Self {
        Self::new()
    }
}
