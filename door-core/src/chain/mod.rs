//! Actions and the immutable chains the orchestrator plays.
//!
//! Actions are plain configuration living in `static` tables. Each one knows
//! how to start its effect, how long the chain must pause on it, and how to
//! undo it when the chain is replaced. Hardware is reached through an
//! [`ActionContext`] supplied on every call, so the same chain tables run
//! against firmware pins, emulator pins or test mocks.

use core::{fmt, ptr};

use crate::clock::Millis;
use crate::hardware::{
    AlternatingBlink, LedPattern, Melody, OutputId, PatternOutput, PulsedOutput, RelayId,
    ToneOutput,
};

/// Hardware and event sink visible to actions.
///
/// Lookups return `None` for hardware the node does not fit; actions then
/// skip their effect.
pub trait ActionContext<E> {
    fn output(&mut self, id: OutputId) -> Option<&mut dyn PatternOutput>;

    fn tone(&mut self) -> Option<&mut dyn ToneOutput>;

    fn relay(&mut self, id: RelayId) -> Option<&mut dyn PulsedOutput>;

    /// Queues `event` for delivery to the state machine on a later tick.
    fn raise(&mut self, event: E);

    fn demo_mode(&self) -> bool;
}

/// Callback run by [`Action::Run`].
pub type Runnable<E> = fn(&mut dyn ActionContext<E>, Millis);

/// How the orchestrator treats an action.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActionRole {
    Standard,
    LoopBegin,
    LoopEnd,
}

/// One step of a chain.
pub enum Action<E> {
    Noop,
    TurnOn(OutputId),
    TurnOff(OutputId),
    Blink(OutputId, &'static LedPattern),
    AlternateBlink(OutputId, OutputId, &'static AlternatingBlink),
    /// Lights `outputs[i]` when `mask` has a non-space character at `i`.
    Strip(&'static [OutputId], &'static str),
    /// Lit for the given milliseconds, then switched off.
    HoldOn(OutputId, u32),
    /// Powers a relay for the given milliseconds without pausing the chain.
    PulseRelay(RelayId, u32),
    StartMelody {
        melody: &'static Melody,
        /// Main-transition melodies go through the orchestrator's melody gate.
        main_transition: bool,
    },
    StopMelody,
    Wait(u32),
    DemoAwareWait {
        normal: u32,
        demo: u32,
    },
    Run(Runnable<E>),
    /// Repeats the body up to the matching [`Action::LoopEnd`]; `0` loops forever.
    LoopBegin(u16),
    LoopEnd,
}

impl<E: 'static> Action<E> {
    #[must_use]
    pub const fn role(&self) -> ActionRole {
        match self {
            Action::LoopBegin(_) => ActionRole::LoopBegin,
            Action::LoopEnd => ActionRole::LoopEnd,
            _ => ActionRole::Standard,
        }
    }

    /// Milliseconds the chain pauses on this action; `0` advances at once.
    #[must_use]
    pub const fn duration(&self, demo_mode: bool) -> u32 {
        match self {
            Action::HoldOn(_, duration) | Action::Wait(duration) => *duration,
            Action::DemoAwareWait { normal, demo } => {
                if demo_mode {
                    *demo
                } else {
                    *normal
                }
            }
            _ => 0,
        }
    }

    /// Performs the action's effect.
    pub fn start(
        &'static self,
        ctx: &mut dyn ActionContext<E>,
        gate: &mut MelodyGate<E>,
        now: Millis,
    ) {
        match self {
            Action::TurnOn(output) | Action::HoldOn(output, _) => {
                with_output(ctx, *output, |led| led.turn_on());
            }
            Action::TurnOff(output) => with_output(ctx, *output, |led| led.turn_off()),
            Action::Blink(output, pattern) => {
                with_output(ctx, *output, |led| led.blink(*pattern, now));
            }
            Action::AlternateBlink(first, second, alternating) => {
                with_output(ctx, *first, |led| led.blink(&alternating.first, now));
                with_output(ctx, *second, |led| led.blink(&alternating.second, now));
            }
            Action::Strip(outputs, mask) => {
                let mut lit = mask.bytes().map(|byte| byte != b' ');
                for output in outputs.iter() {
                    let on = lit.next().unwrap_or(false);
                    with_output(ctx, *output, |led| led.set(on));
                }
            }
            Action::PulseRelay(relay, duration) => {
                if let Some(relay) = ctx.relay(*relay) {
                    relay.power_on_for(*duration, now);
                }
            }
            Action::StartMelody {
                melody,
                main_transition,
            } => {
                if *main_transition && !gate.admit(self) {
                    return;
                }
                if let Some(tone) = ctx.tone() {
                    tone.play(*melody, now);
                }
            }
            Action::StopMelody => {
                if let Some(tone) = ctx.tone() {
                    tone.stop();
                }
            }
            Action::Run(runnable) => runnable(ctx, now),
            Action::Noop
            | Action::Wait(_)
            | Action::DemoAwareWait { .. }
            | Action::LoopBegin(_)
            | Action::LoopEnd => {}
        }
    }

    /// Called once when this action's duration elapsed, before the next one starts.
    pub fn on_duration_expired(&self, ctx: &mut dyn ActionContext<E>) {
        if let Action::HoldOn(output, _) = self {
            with_output(ctx, *output, |led| led.turn_off());
        }
    }

    /// Undoes the effect of [`Action::start`]; safe on actions that never started.
    pub fn destroy(&self, ctx: &mut dyn ActionContext<E>) {
        match self {
            Action::TurnOn(output) | Action::Blink(output, _) | Action::HoldOn(output, _) => {
                with_output(ctx, *output, |led| led.turn_off());
            }
            Action::AlternateBlink(first, second, _) => {
                with_output(ctx, *first, |led| led.turn_off());
                with_output(ctx, *second, |led| led.turn_off());
            }
            Action::Strip(outputs, _) => {
                for output in outputs.iter() {
                    with_output(ctx, *output, |led| led.turn_off());
                }
            }
            Action::PulseRelay(relay, _) => {
                if let Some(relay) = ctx.relay(*relay) {
                    relay.power_off();
                }
            }
            Action::StartMelody { .. } => {
                if let Some(tone) = ctx.tone() {
                    tone.stop();
                }
            }
            Action::Noop
            | Action::TurnOff(_)
            | Action::StopMelody
            | Action::Wait(_)
            | Action::DemoAwareWait { .. }
            | Action::Run(_)
            | Action::LoopBegin(_)
            | Action::LoopEnd => {}
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Action::Noop => "noop",
            Action::TurnOn(_) => "turn-on",
            Action::TurnOff(_) => "turn-off",
            Action::Blink(..) => "blink",
            Action::AlternateBlink(..) => "alternate-blink",
            Action::Strip(..) => "strip",
            Action::HoldOn(..) => "hold-on",
            Action::PulseRelay(..) => "pulse-relay",
            Action::StartMelody { .. } => "start-melody",
            Action::StopMelody => "stop-melody",
            Action::Wait(_) => "wait",
            Action::DemoAwareWait { .. } => "demo-aware-wait",
            Action::Run(_) => "run",
            Action::LoopBegin(_) => "loop-begin",
            Action::LoopEnd => "loop-end",
        }
    }
}

impl<E: 'static> fmt::Debug for Action<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

fn with_output<E>(
    ctx: &mut dyn ActionContext<E>,
    id: OutputId,
    apply: impl FnOnce(&mut dyn PatternOutput),
) {
    if let Some(output) = ctx.output(id) {
        apply(output);
    }
}

/// Remembers the last main-transition melody action that was admitted.
///
/// The first one after boot is swallowed so a cold start or a preventive
/// restart stays silent; afterwards a melody only sounds when it differs from
/// the previous main-transition melody.
pub struct MelodyGate<E: 'static> {
    last: Option<&'static Action<E>>,
}

impl<E: 'static> MelodyGate<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Returns `true` when `action` should sound, and records it.
    pub fn admit(&mut self, action: &'static Action<E>) -> bool {
        match self.last {
            Some(last) if ptr::eq(last, action) => false,
            Some(_) => {
                self.last = Some(action);
                true
            }
            None => {
                self.last = Some(action);
                false
            }
        }
    }
}

impl<E: 'static> Default for MelodyGate<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered, immutable action sequence.
///
/// Two chains are the same chain when they view the same underlying slice;
/// the id and name only label it in telemetry.
pub struct ActionChain<E: 'static> {
    pub id: u8,
    pub name: &'static str,
    pub actions: &'static [Action<E>],
}

impl<E: 'static> ActionChain<E> {
    #[must_use]
    pub const fn new(id: u8, name: &'static str, actions: &'static [Action<E>]) -> Self {
        Self { id, name, actions }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'static Action<E>> {
        self.actions.get(index)
    }

    #[must_use]
    pub fn is_same(&self, other: &ActionChain<E>) -> bool {
        ptr::eq(self.actions, other.actions)
    }
}

impl<E: 'static> Clone for ActionChain<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: 'static> Copy for ActionChain<E> {}

impl<E: 'static> fmt::Debug for ActionChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}({})", self.name, self.id, self.actions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Note;

    #[derive(Default)]
    struct Lamp {
        lit: bool,
    }

    impl PatternOutput for Lamp {
        fn set(&mut self, lit: bool) {
            self.lit = lit;
        }

        fn blink(&mut self, _pattern: &'static LedPattern, _now: Millis) {
            self.lit = true;
        }

        fn is_lit(&self) -> bool {
            self.lit
        }
    }

    #[derive(Default)]
    struct Context {
        lamps: [Lamp; 2],
        raised: heapless::Vec<u8, 4>,
    }

    impl ActionContext<u8> for Context {
        fn output(&mut self, id: OutputId) -> Option<&mut dyn PatternOutput> {
            self.lamps
                .get_mut(id.as_index())
                .map(|lamp| lamp as &mut dyn PatternOutput)
        }

        fn tone(&mut self) -> Option<&mut dyn ToneOutput> {
            None
        }

        fn relay(&mut self, _id: RelayId) -> Option<&mut dyn PulsedOutput> {
            None
        }

        fn raise(&mut self, event: u8) {
            self.raised.push(event).expect("event log full");
        }

        fn demo_mode(&self) -> bool {
            true
        }
    }

    static STRIP_OUTPUTS: [OutputId; 3] = [OutputId::Open, OutputId::KeptOpen, OutputId::Closing];
    static STRIP: Action<u8> = Action::Strip(&STRIP_OUTPUTS, " O");
    static HOLD: Action<u8> = Action::HoldOn(OutputId::Open, 250);
    static RAISE: Action<u8> = Action::Run(|ctx, _now| ctx.raise(7));
    static TUNE: Melody = Melody::new("tune", &[Note::new(440, 10)]);
    static FIRST: Action<u8> = Action::StartMelody {
        melody: &TUNE,
        main_transition: true,
    };
    static SECOND: Action<u8> = Action::StartMelody {
        melody: &TUNE,
        main_transition: true,
    };

    #[test]
    fn strip_lights_masked_outputs_and_skips_missing_ones() {
        let mut ctx = Context::default();
        let mut gate = MelodyGate::new();

        STRIP.start(&mut ctx, &mut gate, Millis::ZERO);
        assert!(!ctx.lamps[0].lit);
        assert!(ctx.lamps[1].lit);

        STRIP.destroy(&mut ctx);
        assert!(!ctx.lamps[1].lit);
    }

    #[test]
    fn hold_on_switches_off_when_duration_expires() {
        let mut ctx = Context::default();
        let mut gate = MelodyGate::new();

        HOLD.start(&mut ctx, &mut gate, Millis::ZERO);
        assert!(ctx.lamps[0].lit);
        assert_eq!(HOLD.duration(false), 250);

        HOLD.on_duration_expired(&mut ctx);
        assert!(!ctx.lamps[0].lit);
    }

    #[test]
    fn run_raises_event() {
        let mut ctx = Context::default();
        let mut gate = MelodyGate::new();

        RAISE.start(&mut ctx, &mut gate, Millis::ZERO);
        assert_eq!(ctx.raised.as_slice(), &[7]);
    }

    #[test]
    fn demo_aware_wait_picks_duration() {
        let wait: Action<u8> = Action::DemoAwareWait {
            normal: 60_000,
            demo: 500,
        };

        assert_eq!(wait.duration(false), 60_000);
        assert_eq!(wait.duration(true), 500);
        assert_eq!(Action::<u8>::LoopEnd.role(), ActionRole::LoopEnd);
    }

    #[test]
    fn melody_gate_swallows_first_and_repeated_entries() {
        let mut gate = MelodyGate::new();

        assert!(!gate.admit(&FIRST));
        assert!(!gate.admit(&FIRST));
        assert!(gate.admit(&SECOND));
        assert!(gate.admit(&FIRST));
    }

    #[test]
    fn chain_identity_follows_the_slice() {
        static ACTIONS: [Action<u8>; 2] = [Action::Noop, Action::Wait(5)];
        let whole = ActionChain::new(1, "whole", &ACTIONS);
        let again = ActionChain::new(2, "again", &ACTIONS);
        let tail = ActionChain::new(1, "tail", ACTIONS.split_at(1).1);

        assert!(whole.is_same(&again));
        assert!(!whole.is_same(&tail));
    }
}
