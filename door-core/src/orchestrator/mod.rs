//! Cooperative action-chain orchestrator.
//!
//! Exactly one chain is active at a time. `start` only records the requested
//! chain; the swap happens on the next [`ActionOrchestrator::tick`], which
//! first rolls back every action of the displaced chain and then runs the new
//! one from index 0. Timed actions pause the chain until their duration has
//! strictly passed; zero-duration actions advance within the same tick, up to
//! [`OrchestratorConfig::max_advances_per_tick`] steps, after which the chain
//! resumes on the following tick.

use crate::chain::{Action, ActionChain, ActionContext, ActionRole, MelodyGate};
use crate::clock::{Deadline, Millis};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};

/// Default bound on cursor steps per tick.
pub const DEFAULT_MAX_ADVANCES_PER_TICK: u16 = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OrchestratorConfig {
    /// Cursor steps (moves and action resolutions) allowed within one tick.
    pub max_advances_per_tick: u16,
}

impl OrchestratorConfig {
    pub const DEFAULT: Self = Self {
        max_advances_per_tick: DEFAULT_MAX_ADVANCES_PER_TICK,
    };
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Position of the cursor within the active chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cursor {
    /// No action started yet, or no chain at all.
    Idle,
    Running(usize),
    /// Walked past the last action; effects stay until the chain is replaced.
    Finished,
}

/// Next cursor step, kept across ticks when the step budget runs out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Step {
    /// Expire the current action and move to the following index.
    Next,
    /// Act on the action under the cursor.
    Resolve,
}

/// Bookkeeping for the loop currently being played.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct LoopState {
    begin: Option<usize>,
    end: Option<usize>,
    remaining: u16,
}

pub struct ActionOrchestrator<E: 'static> {
    config: OrchestratorConfig,
    pending: Option<ActionChain<E>>,
    active: Option<ActionChain<E>>,
    started_at: Millis,
    cursor: Cursor,
    deadline: Deadline,
    looping: LoopState,
    stalled: Option<Step>,
    gate: MelodyGate<E>,
}

impl<E: 'static> ActionOrchestrator<E> {
    #[must_use]
    pub const fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            pending: None,
            active: None,
            started_at: Millis::ZERO,
            cursor: Cursor::Idle,
            deadline: Deadline::after(Millis::ZERO, 0),
            looping: LoopState {
                begin: None,
                end: None,
                remaining: 0,
            },
            stalled: None,
            gate: MelodyGate::new(),
        }
    }

    /// Requests `chain` to replace whatever runs, on the next tick.
    ///
    /// Requesting the active chain restarts it.
    pub fn start(&mut self, chain: ActionChain<E>) {
        self.pending = Some(chain);
    }

    /// Like [`Self::start`] unless `chain` is already active or pending.
    pub fn change_if_different(&mut self, chain: ActionChain<E>) -> bool {
        let known = self
            .active
            .iter()
            .chain(self.pending.iter())
            .any(|current| current.is_same(&chain));
        if known {
            return false;
        }

        self.start(chain);
        true
    }

    /// Rolls back every action of the active chain, in order, and goes idle.
    ///
    /// A pending request is kept.
    pub fn stop<const N: usize>(
        &mut self,
        ctx: &mut dyn ActionContext<E>,
        telemetry: &mut TelemetryRecorder<N>,
        now: Millis,
    ) {
        let Some(chain) = self.active.take() else {
            return;
        };

        for action in chain.actions {
            action.destroy(ctx);
        }
        telemetry.record_chain(
            TelemetryEventKind::ChainStopped(chain.id),
            self.current_index().unwrap_or(chain.len()),
            Some(self.started_at),
            now,
        );

        self.cursor = Cursor::Idle;
        self.looping = LoopState::default();
        self.stalled = None;
    }

    /// Advances the orchestrator by at most one swap or one deadline expiry.
    pub fn tick<const N: usize>(
        &mut self,
        ctx: &mut dyn ActionContext<E>,
        telemetry: &mut TelemetryRecorder<N>,
        now: Millis,
    ) {
        if let Some(next) = self.pending.take() {
            self.stop(ctx, telemetry, now);
            self.active = Some(next);
            self.started_at = now;
            telemetry.record_chain(TelemetryEventKind::ChainStarted(next.id), 0, None, now);
            self.advance(ctx, telemetry, now, Step::Next);
            return;
        }

        if let Some(step) = self.stalled.take() {
            self.advance(ctx, telemetry, now, step);
            return;
        }

        if matches!(self.cursor, Cursor::Running(_)) && self.deadline.has_passed(now) {
            self.advance(ctx, telemetry, now, Step::Next);
        }
    }

    #[must_use]
    pub const fn active(&self) -> Option<&ActionChain<E>> {
        self.active.as_ref()
    }

    #[must_use]
    pub const fn pending(&self) -> Option<&ActionChain<E>> {
        self.pending.as_ref()
    }

    #[must_use]
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub const fn current_index(&self) -> Option<usize> {
        match self.cursor {
            Cursor::Running(index) => Some(index),
            Cursor::Idle | Cursor::Finished => None,
        }
    }

    /// `true` while an action of the active chain holds the cursor.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.cursor, Cursor::Running(_))
    }

    /// `true` when nothing is pending and no chain is mid-way.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.pending.is_none() && self.stalled.is_none() && !self.is_running()
    }

    /// Milliseconds until the running timed action expires.
    #[must_use]
    pub fn remaining_ms(&self, now: Millis) -> Option<u32> {
        self.is_running().then(|| self.deadline.remaining(now))
    }

    fn advance<const N: usize>(
        &mut self,
        ctx: &mut dyn ActionContext<E>,
        telemetry: &mut TelemetryRecorder<N>,
        now: Millis,
        mut step: Step,
    ) {
        let Some(chain) = self.active else {
            return;
        };

        let mut budget = self.config.max_advances_per_tick;
        loop {
            if budget == 0 {
                self.stalled = Some(step);
                telemetry.record_chain(
                    TelemetryEventKind::AdvanceDeferred(chain.id),
                    self.current_index().unwrap_or(0),
                    Some(self.started_at),
                    now,
                );
                return;
            }
            budget -= 1;

            step = match step {
                Step::Next => {
                    let next = match self.cursor {
                        Cursor::Running(index) => {
                            // Only actions that paused the chain have a duration to expire.
                            if let Some(action) = chain.get(index)
                                && action.duration(ctx.demo_mode()) > 0
                            {
                                action.on_duration_expired(ctx);
                            }
                            index + 1
                        }
                        Cursor::Idle => 0,
                        Cursor::Finished => return,
                    };

                    if next >= chain.len() {
                        self.cursor = Cursor::Finished;
                        self.looping = LoopState::default();
                        telemetry.record_chain(
                            TelemetryEventKind::ChainCompleted(chain.id),
                            next,
                            Some(self.started_at),
                            now,
                        );
                        return;
                    }

                    self.cursor = Cursor::Running(next);
                    Step::Resolve
                }
                Step::Resolve => {
                    let Cursor::Running(index) = self.cursor else {
                        return;
                    };
                    let Some(action) = chain.get(index) else {
                        self.cursor = Cursor::Finished;
                        return;
                    };

                    match action.role() {
                        ActionRole::LoopBegin => self.enter_loop(action, index),
                        ActionRole::LoopEnd => {
                            self.close_loop(index, chain.id, telemetry, now)
                        }
                        ActionRole::Standard => {
                            action.start(ctx, &mut self.gate, now);
                            let duration = action.duration(ctx.demo_mode());
                            if duration > 0 {
                                self.deadline = Deadline::after(now, duration);
                                return;
                            }
                            Step::Next
                        }
                    }
                }
            };
        }
    }

    fn enter_loop(&mut self, action: &Action<E>, index: usize) -> Step {
        let iterations = match action {
            Action::LoopBegin(iterations) => *iterations,
            _ => 0,
        };

        if iterations == 0 {
            self.looping.begin = Some(index);
            return Step::Next;
        }

        if self.looping.begin.is_none() {
            self.looping.remaining = iterations;
        }
        self.looping.begin = Some(index);

        if self.looping.remaining > 0 {
            self.looping.remaining -= 1;
            return Step::Next;
        }

        // Body played `iterations` times: continue after the loop end.
        let end = self.looping.end;
        self.looping = LoopState::default();
        if let Some(end) = end {
            self.cursor = Cursor::Running(end);
        }
        Step::Next
    }

    fn close_loop<const N: usize>(
        &mut self,
        index: usize,
        chain_id: u8,
        telemetry: &mut TelemetryRecorder<N>,
        now: Millis,
    ) -> Step {
        let Some(begin) = self.looping.begin else {
            telemetry.record(
                TelemetryEventKind::UnbalancedLoopEnd(chain_id),
                TelemetryPayload::none(),
                now,
            );
            return Step::Next;
        };

        self.looping.end = Some(index);
        self.cursor = Cursor::Running(begin);
        Step::Resolve
    }
}

impl<E: 'static> Default for ActionOrchestrator<E> {
    fn default() -> Self {
        Self::new(OrchestratorConfig::DEFAULT)
    }
}
