//! Link counters shared between the UART and control tasks.
//!
//! Cortex-M0+ has no atomic read-modify-write, so these go through
//! `portable-atomic` and the critical section installed by the runtime.

use portable_atomic::{AtomicU32, Ordering};

/// Frames handed to the control task.
static FRAMES_RECEIVED: AtomicU32 = AtomicU32::new(0);
/// Bytes thrown away while realigning on a frame header.
static BYTES_SKIPPED: AtomicU32 = AtomicU32::new(0);
/// Frames lost because a link channel was full.
static FRAMES_DROPPED: AtomicU32 = AtomicU32::new(0);
/// UART read or write errors.
static UART_ERRORS: AtomicU32 = AtomicU32::new(0);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LinkCounters {
    pub frames_received: u32,
    pub bytes_skipped: u32,
    pub frames_dropped: u32,
    pub uart_errors: u32,
}

impl LinkCounters {
    /// Counts accumulated since `earlier`.
    pub const fn since(&self, earlier: &LinkCounters) -> LinkCounters {
        LinkCounters {
            frames_received: self.frames_received.wrapping_sub(earlier.frames_received),
            bytes_skipped: self.bytes_skipped.wrapping_sub(earlier.bytes_skipped),
            frames_dropped: self.frames_dropped.wrapping_sub(earlier.frames_dropped),
            uart_errors: self.uart_errors.wrapping_sub(earlier.uart_errors),
        }
    }

    pub const fn has_faults(&self) -> bool {
        self.bytes_skipped > 0 || self.frames_dropped > 0 || self.uart_errors > 0
    }
}

pub fn record_frame_received() {
    FRAMES_RECEIVED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_bytes_skipped(count: u32) {
    if count > 0 {
        BYTES_SKIPPED.fetch_add(count, Ordering::Relaxed);
    }
}

pub fn record_frame_dropped() {
    FRAMES_DROPPED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_uart_error() {
    UART_ERRORS.fetch_add(1, Ordering::Relaxed);
}

pub fn link_counters() -> LinkCounters {
    LinkCounters {
        frames_received: FRAMES_RECEIVED.load(Ordering::Relaxed),
        bytes_skipped: BYTES_SKIPPED.load(Ordering::Relaxed),
        frames_dropped: FRAMES_DROPPED.load(Ordering::Relaxed),
        uart_errors: UART_ERRORS.load(Ordering::Relaxed),
    }
}
