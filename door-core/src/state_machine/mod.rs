//! Table-driven state machine with a two-step history.
//!
//! Transitions live in a flat `&'static` table scanned in order; the first row
//! whose source matches the current state (or is [`Source::Any`]) and whose
//! event matches wins. Entering a state shifts the history and calls the
//! [`EntryHandler`] while the machine is still mutably borrowed, which keeps
//! entry handlers from feeding events back synchronously: they queue events
//! for a later tick instead, see [`EventQueue`].

use core::fmt;

use heapless::Deque;

/// Source side of a transition row.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Source<S> {
    /// Matches whatever the current state is.
    Any,
    State(S),
}

impl<S: PartialEq> Source<S> {
    #[must_use]
    pub fn matches(&self, current: &S) -> bool {
        match self {
            Source::Any => true,
            Source::State(state) => state == current,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transition<S, E> {
    pub from: Source<S>,
    pub event: E,
    pub to: S,
}

impl<S, E> Transition<S, E> {
    #[must_use]
    pub const fn new(from: S, event: E, to: S) -> Self {
        Self {
            from: Source::State(from),
            event,
            to,
        }
    }

    #[must_use]
    pub const fn from_any(event: E, to: S) -> Self {
        Self {
            from: Source::Any,
            event,
            to,
        }
    }
}

/// Current state plus the two states before it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StateHistory<S> {
    pub current: Option<S>,
    pub last: Option<S>,
    pub before_last: Option<S>,
}

impl<S: Copy> StateHistory<S> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            current: None,
            last: None,
            before_last: None,
        }
    }

    fn enter(&mut self, state: S) {
        self.before_last = self.last;
        self.last = self.current;
        self.current = Some(state);
    }
}

/// Reacts to state entries, typically by starting a chain.
pub trait EntryHandler<S> {
    fn on_enter(&mut self, state: S, history: &StateHistory<S>);
}

impl<S, F> EntryHandler<S> for F
where
    F: FnMut(S, &StateHistory<S>),
{
    fn on_enter(&mut self, state: S, history: &StateHistory<S>) {
        self(state, history);
    }
}

pub struct StateMachine<S: 'static, E: 'static> {
    transitions: &'static [Transition<S, E>],
    history: StateHistory<S>,
}

impl<S, E> StateMachine<S, E>
where
    S: Copy + Eq + 'static,
    E: Copy + Eq + 'static,
{
    #[must_use]
    pub const fn new(transitions: &'static [Transition<S, E>]) -> Self {
        Self {
            transitions,
            history: StateHistory::empty(),
        }
    }

    /// Enters `initial` unless the machine already started.
    pub fn start(&mut self, initial: S, handler: &mut impl EntryHandler<S>) -> bool {
        if self.history.current.is_some() {
            return false;
        }

        self.enter(initial, handler);
        true
    }

    /// Target of the first row matching the current state and `event`.
    #[must_use]
    pub fn resolve(&self, event: E) -> Option<S> {
        let current = self.history.current?;
        self.transitions
            .iter()
            .find(|transition| transition.event == event && transition.from.matches(&current))
            .map(|transition| transition.to)
    }

    /// Applies `event`; returns the entered state, if any.
    ///
    /// Nothing happens when no row matches or when the target is the current state.
    pub fn handle_event(&mut self, event: E, handler: &mut impl EntryHandler<S>) -> Option<S> {
        let target = self.resolve(event)?;
        if self.history.current == Some(target) {
            return None;
        }

        self.enter(target, handler);
        Some(target)
    }

    #[must_use]
    pub const fn current(&self) -> Option<S> {
        self.history.current
    }

    #[must_use]
    pub const fn last(&self) -> Option<S> {
        self.history.last
    }

    #[must_use]
    pub const fn before_last(&self) -> Option<S> {
        self.history.before_last
    }

    #[must_use]
    pub const fn history(&self) -> &StateHistory<S> {
        &self.history
    }

    #[must_use]
    pub const fn transitions(&self) -> &'static [Transition<S, E>] {
        self.transitions
    }

    fn enter(&mut self, state: S, handler: &mut impl EntryHandler<S>) {
        self.history.enter(state);
        handler.on_enter(state, &self.history);
    }
}

/// Returned when an [`EventQueue`] has no room left.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Events raised by actions, delivered to the machine on the next tick.
pub struct EventQueue<E, const N: usize> {
    events: Deque<E, N>,
    dropped: u16,
}

impl<E, const N: usize> EventQueue<E, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
            dropped: 0,
        }
    }

    /// Appends `event`; counts it as dropped when the queue is full.
    pub fn push(&mut self, event: E) -> Result<(), QueueFull> {
        self.events.push_back(event).map_err(|_| {
            self.dropped = self.dropped.saturating_add(1);
            QueueFull
        })
    }

    pub fn pop(&mut self) -> Option<E> {
        self.events.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of drops since the last call and resets it.
    pub fn take_dropped(&mut self) -> u16 {
        core::mem::take(&mut self.dropped)
    }
}

impl<E, const N: usize> Default for EventQueue<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum Door {
        Open,
        WillCloseSoon,
        Closing,
        Closed,
    }

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum Signal {
        CloseButton,
        TimerExpiry,
        AutoCloseTimer,
        DoorClosedSensor,
    }

    static TABLE: [Transition<Door, Signal>; 4] = [
        Transition::new(Door::Open, Signal::CloseButton, Door::Closing),
        Transition::new(Door::Open, Signal::TimerExpiry, Door::WillCloseSoon),
        Transition::new(Door::WillCloseSoon, Signal::AutoCloseTimer, Door::Closing),
        Transition::from_any(Signal::DoorClosedSensor, Door::Closed),
    ];

    #[derive(Default)]
    struct Entries {
        seen: heapless::Vec<Door, 8>,
    }

    impl EntryHandler<Door> for Entries {
        fn on_enter(&mut self, state: Door, _history: &StateHistory<Door>) {
            self.seen.push(state).expect("entry log full");
        }
    }

    #[test]
    fn start_only_applies_once() {
        let mut machine = StateMachine::new(&TABLE);
        let mut entries = Entries::default();

        assert!(machine.start(Door::Open, &mut entries));
        assert!(!machine.start(Door::Closed, &mut entries));
        assert_eq!(machine.current(), Some(Door::Open));
        assert_eq!(entries.seen.as_slice(), &[Door::Open]);
    }

    #[test]
    fn events_before_start_are_ignored() {
        let mut machine = StateMachine::new(&TABLE);
        let mut entries = Entries::default();

        assert_eq!(machine.handle_event(Signal::DoorClosedSensor, &mut entries), None);
        assert!(entries.seen.is_empty());
    }

    #[test]
    fn auto_close_path_is_visible_in_history() {
        let mut machine = StateMachine::new(&TABLE);
        let mut entries = Entries::default();
        machine.start(Door::Open, &mut entries);

        machine.handle_event(Signal::TimerExpiry, &mut entries);
        machine.handle_event(Signal::AutoCloseTimer, &mut entries);
        machine.handle_event(Signal::DoorClosedSensor, &mut entries);

        assert_eq!(machine.before_last(), Some(Door::WillCloseSoon));
        assert_eq!(machine.last(), Some(Door::Closing));
        assert_eq!(machine.current(), Some(Door::Closed));
    }

    #[test]
    fn wildcard_fires_from_every_state() {
        for initial in [Door::Open, Door::WillCloseSoon, Door::Closing] {
            let mut machine = StateMachine::new(&TABLE);
            let mut entries = Entries::default();
            machine.start(initial, &mut entries);

            assert_eq!(
                machine.handle_event(Signal::DoorClosedSensor, &mut entries),
                Some(Door::Closed)
            );
            assert_eq!(machine.last(), Some(initial));
        }
    }

    #[test]
    fn entering_current_state_is_a_no_op() {
        let mut machine = StateMachine::new(&TABLE);
        let mut entries = Entries::default();
        machine.start(Door::Closed, &mut entries);

        assert_eq!(machine.handle_event(Signal::DoorClosedSensor, &mut entries), None);
        assert_eq!(entries.seen.as_slice(), &[Door::Closed]);
        assert_eq!(machine.last(), None);
    }

    #[test]
    fn unmatched_event_changes_nothing() {
        let mut machine = StateMachine::new(&TABLE);
        let mut entries = Entries::default();
        machine.start(Door::Closing, &mut entries);

        assert_eq!(machine.handle_event(Signal::TimerExpiry, &mut entries), None);
        assert_eq!(machine.current(), Some(Door::Closing));
    }

    #[test]
    fn first_matching_row_wins() {
        static SHADOWED: [Transition<Door, Signal>; 2] = [
            Transition::from_any(Signal::CloseButton, Door::Closed),
            Transition::new(Door::Open, Signal::CloseButton, Door::Closing),
        ];
        let mut machine = StateMachine::new(&SHADOWED);
        let mut entries = Entries::default();
        machine.start(Door::Open, &mut entries);

        assert_eq!(machine.resolve(Signal::CloseButton), Some(Door::Closed));
    }

    #[test]
    fn closures_serve_as_entry_handlers() {
        let mut machine = StateMachine::new(&TABLE);
        let mut previous = None;
        let mut handler = |_state: Door, history: &StateHistory<Door>| previous = history.last;

        machine.start(Door::Open, &mut handler);
        machine.handle_event(Signal::CloseButton, &mut handler);

        assert_eq!(previous, Some(Door::Open));
    }

    #[test]
    fn queue_keeps_order_and_counts_drops() {
        let mut queue: EventQueue<Signal, 2> = EventQueue::new();

        queue.push(Signal::TimerExpiry).expect("room for first");
        queue.push(Signal::CloseButton).expect("room for second");
        assert_eq!(queue.push(Signal::DoorClosedSensor), Err(QueueFull));

        assert_eq!(queue.take_dropped(), 1);
        assert_eq!(queue.take_dropped(), 0);
        assert_eq!(queue.pop(), Some(Signal::TimerExpiry));
        assert_eq!(queue.pop(), Some(Signal::CloseButton));
        assert!(queue.is_empty());
    }
}
