//! Tick-polled timers and the two-phase preventive restart.

use crate::clock::{DAY_MS, Deadline, Millis};
use crate::telemetry::{TelemetryEventKind, TelemetryRecorder};

/// Timer polled from the control loop.
///
/// A repeating timer re-arms from its previous due time rather than from the
/// instant it was polled, so a late tick does not push later periods back.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timer {
    period_ms: u32,
    deadline: Option<Deadline>,
    repeating: bool,
}

impl Timer {
    #[must_use]
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_ms,
            deadline: None,
            repeating: false,
        }
    }

    #[must_use]
    pub const fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn start_once(&mut self, now: Millis) {
        self.arm(now, false);
    }

    pub fn start_repeating(&mut self, now: Millis) {
        self.arm(now, true);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Instant of the next expiry while the timer runs.
    #[must_use]
    pub fn due_at(&self) -> Option<Millis> {
        self.deadline.map(|deadline| deadline.due_at())
    }

    /// Returns `true` once per due time.
    pub fn poll(&mut self, now: Millis) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if !deadline.is_reached(now) {
            return false;
        }

        self.deadline = if self.repeating {
            Some(deadline.next_period())
        } else {
            None
        };
        true
    }

    fn arm(&mut self, now: Millis, repeating: bool) {
        self.repeating = repeating;
        self.deadline = Some(Deadline::after(now, self.period_ms));
    }
}

/// Delays of the preventive restart.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RestartConfig {
    /// Uptime after which the node restarts as soon as it is idle.
    pub graceful_after_ms: u32,
    /// Time spent waiting for an idle moment before restarting anyway,
    /// measured from the start of the graceful phase.
    pub forced_after_ms: u32,
}

impl RestartConfig {
    pub const DEFAULT: Self = Self {
        graceful_after_ms: 45 * DAY_MS,
        forced_after_ms: DAY_MS,
    };
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Outcome of a restarter poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RestartDecision {
    Continue,
    /// The graceful phase is active and the node reported it can restart.
    Graceful,
    /// The graceful phase lasted too long.
    Forced,
}

impl RestartDecision {
    #[must_use]
    pub const fn should_restart(self) -> bool {
        !matches!(self, RestartDecision::Continue)
    }
}

/// Restarts the node before the millisecond counter can wrap twice.
///
/// The runtime owns the actual reset; this type only decides when.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Restarter {
    graceful: Timer,
    forced: Timer,
    in_graceful_phase: bool,
}

impl Restarter {
    #[must_use]
    pub const fn new(config: RestartConfig) -> Self {
        Self {
            graceful: Timer::new(config.graceful_after_ms),
            forced: Timer::new(config.forced_after_ms),
            in_graceful_phase: false,
        }
    }

    /// Arms the graceful timer. Call once at boot.
    pub fn start(&mut self, now: Millis) {
        self.in_graceful_phase = false;
        self.forced.stop();
        self.graceful.start_once(now);
    }

    #[must_use]
    pub const fn in_graceful_phase(&self) -> bool {
        self.in_graceful_phase
    }

    /// Advances both timers, then consults `can_restart` while the graceful
    /// phase is active. The predicate is not called outside that phase.
    pub fn poll<const N: usize>(
        &mut self,
        now: Millis,
        can_restart: impl FnOnce() -> bool,
        telemetry: &mut TelemetryRecorder<N>,
    ) -> RestartDecision {
        if self.graceful.poll(now) {
            self.in_graceful_phase = true;
            self.forced.start_once(now);
            telemetry.record_restart(TelemetryEventKind::GracefulRestartArmed, now);
        }

        if self.forced.poll(now) {
            telemetry.record_restart(TelemetryEventKind::RestartForced, now);
            return RestartDecision::Forced;
        }

        if self.in_graceful_phase && can_restart() {
            telemetry.record_restart(TelemetryEventKind::RestartGranted, now);
            return RestartDecision::Graceful;
        }

        RestartDecision::Continue
    }
}

impl Default for Restarter {
    fn default() -> Self {
        Self::new(RestartConfig::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RestartConfig {
        RestartConfig {
            graceful_after_ms: 1_000,
            forced_after_ms: 500,
        }
    }

    #[test]
    fn one_shot_timer_fires_once() {
        let mut timer = Timer::new(100);
        timer.start_once(Millis::new(50));

        assert!(!timer.poll(Millis::new(149)));
        assert!(timer.poll(Millis::new(150)));
        assert!(!timer.poll(Millis::new(400)));
        assert!(!timer.is_running());
    }

    #[test]
    fn repeating_timer_keeps_its_phase_when_polled_late() {
        let mut timer = Timer::new(100);
        timer.start_repeating(Millis::ZERO);

        assert!(timer.poll(Millis::new(130)));
        assert_eq!(timer.due_at(), Some(Millis::new(200)));
        assert!(!timer.poll(Millis::new(199)));
        assert!(timer.poll(Millis::new(200)));
        assert_eq!(timer.due_at(), Some(Millis::new(300)));
    }

    #[test]
    fn repeating_timer_across_counter_wrap() {
        let mut timer = Timer::new(100);
        timer.start_repeating(Millis::new(u32::MAX - 49));

        assert!(!timer.poll(Millis::new(u32::MAX)));
        assert!(timer.poll(Millis::new(50)));
        assert!(timer.poll(Millis::new(150)));
    }

    #[test]
    fn predicate_is_ignored_before_graceful_phase() {
        let mut telemetry = TelemetryRecorder::<8>::new();
        let mut restarter = Restarter::new(config());
        restarter.start(Millis::ZERO);

        let decision = restarter.poll(
            Millis::new(999),
            || panic!("predicate consulted too early"),
            &mut telemetry,
        );
        assert_eq!(decision, RestartDecision::Continue);
        assert!(telemetry.is_empty());
    }

    #[test]
    fn graceful_restart_waits_for_idle_node() {
        let mut telemetry = TelemetryRecorder::<8>::new();
        let mut restarter = Restarter::new(config());
        restarter.start(Millis::ZERO);

        let decision = restarter.poll(Millis::new(1_000), || false, &mut telemetry);
        assert_eq!(decision, RestartDecision::Continue);
        assert!(restarter.in_graceful_phase());
        assert!(telemetry.contains(TelemetryEventKind::GracefulRestartArmed));

        let decision = restarter.poll(Millis::new(1_200), || true, &mut telemetry);
        assert_eq!(decision, RestartDecision::Graceful);
        assert!(telemetry.contains(TelemetryEventKind::RestartGranted));
    }

    #[test]
    fn graceful_restart_granted_on_entry_tick() {
        let mut telemetry = TelemetryRecorder::<8>::new();
        let mut restarter = Restarter::new(config());
        restarter.start(Millis::ZERO);

        let decision = restarter.poll(Millis::new(1_000), || true, &mut telemetry);
        assert_eq!(decision, RestartDecision::Graceful);
    }

    #[test]
    fn forced_restart_measured_from_graceful_entry() {
        let mut telemetry = TelemetryRecorder::<8>::new();
        let mut restarter = Restarter::new(config());
        restarter.start(Millis::ZERO);

        // Graceful phase entered late: the forced timer starts from here.
        assert_eq!(
            restarter.poll(Millis::new(1_300), || false, &mut telemetry),
            RestartDecision::Continue
        );
        assert_eq!(
            restarter.poll(Millis::new(1_799), || false, &mut telemetry),
            RestartDecision::Continue
        );
        assert_eq!(
            restarter.poll(Millis::new(1_800), || false, &mut telemetry),
            RestartDecision::Forced
        );
        assert!(telemetry.contains(TelemetryEventKind::RestartForced));
    }
}
