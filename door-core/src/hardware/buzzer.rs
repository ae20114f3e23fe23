//! Non-blocking melody playback over a [`ToneDriver`].

use core::ptr;

use super::{ToneDriver, ToneOutput};
use crate::clock::{Deadline, Millis};

/// Note frequencies in hertz.
pub mod pitch {
    pub const REST: u16 = 0;
    pub const G2: u16 = 98;
    pub const C3: u16 = 131;
    pub const D3: u16 = 147;
    pub const E3: u16 = 165;
    pub const G3: u16 = 196;
    pub const B3: u16 = 247;
    pub const C4: u16 = 262;
    pub const D4: u16 = 294;
    pub const DS4: u16 = 311;
    pub const E4: u16 = 330;
    pub const F4: u16 = 349;
    pub const G4: u16 = 392;
    pub const E5: u16 = 659;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Note {
    /// Zero rests for the note's duration.
    pub frequency_hz: u16,
    pub duration_ms: u16,
}

impl Note {
    #[must_use]
    pub const fn new(frequency_hz: u16, duration_ms: u16) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }

    #[must_use]
    pub const fn rest(duration_ms: u16) -> Self {
        Self::new(pitch::REST, duration_ms)
    }
}

/// Sequence of notes; identity is the `&'static` reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Melody {
    pub name: &'static str,
    pub notes: &'static [Note],
}

impl Melody {
    #[must_use]
    pub const fn new(name: &'static str, notes: &'static [Note]) -> Self {
        Self { name, notes }
    }

    #[must_use]
    pub const fn total_ms(&self) -> u32 {
        let mut total = 0u32;
        let mut index = 0;
        while index < self.notes.len() {
            total += self.notes[index].duration_ms as u32;
            index += 1;
        }
        total
    }
}

/// Buzzer loudness from 0 (silent) to 10.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Volume(u8);

impl Volume {
    pub const OFF: Self = Self(0);
    pub const MAX: Self = Self(10);

    /// Clamps `level` to the 0..=10 range.
    #[must_use]
    pub const fn new(level: u8) -> Self {
        if level > Self::MAX.0 {
            Self::MAX
        } else {
            Self(level)
        }
    }

    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::MAX
    }
}

/// Plays one melody at a time, advancing notes from the control loop.
pub struct MelodyPlayer<T> {
    driver: T,
    melody: Option<&'static Melody>,
    index: usize,
    note: Deadline,
    volume: Volume,
    muted: bool,
}

impl<T: ToneDriver> MelodyPlayer<T> {
    #[must_use]
    pub fn new(driver: T, volume: Volume) -> Self {
        Self {
            driver,
            melody: None,
            index: 0,
            note: Deadline::after(Millis::ZERO, 0),
            volume,
            muted: false,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &T {
        &self.driver
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.melody.is_some()
    }

    #[must_use]
    pub fn playing(&self) -> Option<&'static Melody> {
        self.melody
    }

    #[must_use]
    pub fn volume(&self) -> Volume {
        self.volume
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Silences playback and ignores further `play` calls until unmuted.
    pub fn mute(&mut self) {
        self.muted = true;
        self.stop();
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    /// Moves to the next note once the current one has strictly elapsed.
    pub fn poll(&mut self, now: Millis) {
        let Some(melody) = self.melody else {
            return;
        };
        if !self.note.has_passed(now) {
            return;
        }

        self.index += 1;
        if self.index >= melody.notes.len() {
            self.stop();
            return;
        }
        self.start_note(melody, now);
    }

    fn start_note(&mut self, melody: &'static Melody, now: Millis) {
        let Some(note) = melody.notes.get(self.index) else {
            self.stop();
            return;
        };

        self.note = Deadline::after(now, u32::from(note.duration_ms));
        if note.frequency_hz == pitch::REST || self.volume == Volume::OFF {
            self.driver.silence();
        } else {
            self.driver.tone(note.frequency_hz, self.volume.level());
        }
    }
}

impl<T: ToneDriver> ToneOutput for MelodyPlayer<T> {
    fn play(&mut self, melody: &'static Melody, now: Millis) {
        if self.muted || self.melody.is_some_and(|current| ptr::eq(current, melody)) {
            return;
        }

        self.melody = Some(melody);
        self.index = 0;
        self.start_note(melody, now);
    }

    fn stop(&mut self) {
        self.melody = None;
        self.driver.silence();
    }

    fn set_volume(&mut self, volume: Volume) {
        self.volume = volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum ToneCall {
        Tone(u16, u8),
        Silence,
    }

    #[derive(Default)]
    struct RecordingTone {
        calls: heapless::Vec<ToneCall, 16>,
    }

    impl ToneDriver for RecordingTone {
        fn tone(&mut self, frequency_hz: u16, volume: u8) {
            self.calls
                .push(ToneCall::Tone(frequency_hz, volume))
                .expect("tone log full");
        }

        fn silence(&mut self) {
            self.calls.push(ToneCall::Silence).expect("tone log full");
        }
    }

    static CHIME: Melody = Melody::new(
        "chime",
        &[
            Note::new(pitch::C3, 100),
            Note::rest(50),
            Note::new(pitch::G3, 100),
        ],
    );

    #[test]
    fn plays_notes_then_stops() {
        let mut player = MelodyPlayer::new(RecordingTone::default(), Volume::new(7));
        player.play(&CHIME, Millis::ZERO);

        player.poll(Millis::new(100));
        player.poll(Millis::new(101));
        player.poll(Millis::new(152));
        player.poll(Millis::new(253));
        assert!(!player.is_playing());

        assert_eq!(
            player.driver().calls.as_slice(),
            &[
                ToneCall::Tone(pitch::C3, 7),
                ToneCall::Silence,
                ToneCall::Tone(pitch::G3, 7),
                ToneCall::Silence,
            ]
        );
        assert_eq!(CHIME.total_ms(), 250);
    }

    #[test]
    fn replaying_current_melody_is_ignored() {
        let mut player = MelodyPlayer::new(RecordingTone::default(), Volume::MAX);
        player.play(&CHIME, Millis::ZERO);
        player.play(&CHIME, Millis::new(20));

        assert_eq!(player.driver().calls.len(), 1);
    }

    #[test]
    fn muted_player_ignores_play() {
        let mut player = MelodyPlayer::new(RecordingTone::default(), Volume::MAX);
        player.play(&CHIME, Millis::ZERO);
        player.mute();
        assert!(!player.is_playing());

        player.play(&CHIME, Millis::new(10));
        assert!(!player.is_playing());

        player.unmute();
        player.play(&CHIME, Millis::new(20));
        assert!(player.is_playing());
    }

    #[test]
    fn volume_off_keeps_buzzer_silent() {
        let mut player = MelodyPlayer::new(RecordingTone::default(), Volume::OFF);
        player.play(&CHIME, Millis::ZERO);

        assert_eq!(player.driver().calls.as_slice(), &[ToneCall::Silence]);
        assert_eq!(Volume::new(42), Volume::MAX);
    }
}
