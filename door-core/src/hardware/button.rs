//! Debounced push button with long-press and multi-press detection.

use heapless::Vec;

use crate::clock::{Deadline, Millis};

/// Readings must stay stable strictly longer than this to count.
pub const DEBOUNCE_MS: u32 = 20;
/// Presses closer together than this add up to a multi-press.
pub const MULTI_PRESS_GAP_MS: u32 = 600;

/// Event produced by a [`Button`] poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ButtonEvent {
    /// Debounced level change; `true` when pressed.
    Changed(bool),
    Pressed,
    /// Button held for another long-press period; counts from 1.
    LongPress(u16),
    /// Press number `n` (from 2) of a quick series.
    MultiPress(u16),
}

/// Events from one poll, in emission order.
pub type ButtonEvents = Vec<ButtonEvent, 4>;

#[derive(Clone, Debug)]
pub struct Button {
    pressed: bool,
    last_reading: bool,
    last_change: Millis,
    long_press_period_ms: Option<u32>,
    long_press: Option<Deadline>,
    long_press_count: u16,
    multi_press_window: Option<Deadline>,
    multi_press_count: u16,
}

impl Button {
    /// Starts from the current reading without emitting anything for it.
    #[must_use]
    pub const fn new(pressed: bool, now: Millis) -> Self {
        Self {
            pressed,
            last_reading: pressed,
            last_change: now,
            long_press_period_ms: None,
            long_press: None,
            long_press_count: 0,
            multi_press_window: None,
            multi_press_count: 0,
        }
    }

    /// Enables [`ButtonEvent::LongPress`] every `period_ms` while held.
    #[must_use]
    pub const fn with_long_press(mut self, period_ms: u32) -> Self {
        self.long_press_period_ms = Some(period_ms);
        self
    }

    #[must_use]
    pub const fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Feeds the raw `reading` (`true` = pressed) sampled at `now`.
    pub fn poll(&mut self, reading: bool, now: Millis) -> ButtonEvents {
        let mut events = ButtonEvents::new();

        if reading != self.last_reading {
            self.last_change = now;
        }
        self.last_reading = reading;

        if now.elapsed_since(self.last_change) > DEBOUNCE_MS && reading != self.pressed {
            self.pressed = reading;
            self.on_debounced_change(now, &mut events);
        }

        if let Some(deadline) = self.long_press
            && deadline.is_reached(now)
        {
            self.long_press_count = self.long_press_count.saturating_add(1);
            self.long_press = self
                .long_press_period_ms
                .map(|period| Deadline::after(now, period));
            push(&mut events, ButtonEvent::LongPress(self.long_press_count));
        }

        events
    }

    fn on_debounced_change(&mut self, now: Millis, events: &mut ButtonEvents) {
        push(events, ButtonEvent::Changed(self.pressed));
        if self.pressed {
            push(events, ButtonEvent::Pressed);
        }

        self.long_press_count = 0;
        self.long_press = match self.long_press_period_ms {
            Some(period) if self.pressed => Some(Deadline::after(now, period)),
            _ => None,
        };

        if !self.pressed {
            return;
        }
        let within_window = self
            .multi_press_window
            .is_some_and(|window| !window.is_reached(now));
        if within_window {
            self.multi_press_count = self.multi_press_count.saturating_add(1);
            push(events, ButtonEvent::MultiPress(self.multi_press_count));
        } else {
            self.multi_press_count = 1;
        }
        self.multi_press_window = Some(Deadline::after(now, MULTI_PRESS_GAP_MS));
    }
}

fn push(events: &mut ButtonEvents, event: ButtonEvent) {
    // At most three events per poll: change, press, then one of multi/long.
    let _ = events.push(event);
}
