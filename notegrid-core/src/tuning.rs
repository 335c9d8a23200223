//! # Musical Tuning Module
//!
//! Twelve-tone equal temperament against the A4 = 440 Hz reference.
//! Pitches are stored as MIDI note numbers and printed in scientific pitch
//! notation (`C4` is middle C, `A4` is MIDI 69).
//!
//! ## Features
//! - Nearest-semitone mapping from frequency to [`Pitch`]
//! - Note name parsing with sharps or flats (`F#3`, `Bb2`)
//! - Cent deviation of a frequency from its nearest pitch

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::TranscriptionError;

/// Reference frequency of A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;
/// MIDI note number of A4.
pub const A4_MIDI: u8 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Pitch-class lookup for every spelling the parser accepts.
static PITCH_CLASS_MAP: Lazy<BTreeMap<&'static str, u8>> = Lazy::new(|| {
    let mut map: BTreeMap<&'static str, u8> = NOTE_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, i as u8))
        .collect();
    for (flat, class) in [("Db", 1), ("Eb", 3), ("Gb", 6), ("Ab", 8), ("Bb", 10)] {
        map.insert(flat, class);
    }
    map
});

/// A discrete equal-tempered pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Pitch {
    midi: u8,
}

impl Pitch {
    /// Builds a pitch from a MIDI note number (0..=127).
    pub fn from_midi(midi: u8) -> Option<Self> {
        (midi <= 127).then_some(Self { midi })
    }

    /// Rounds a frequency to the nearest semitone.
    ///
    /// # Returns
    /// * `None` - for silence (`0`), non-finite input, or frequencies
    ///   outside the MIDI range
    pub fn from_frequency(hz: f32) -> Option<Self> {
        if !(hz.is_finite() && hz > 0.0) {
            return None;
        }
        let midi = (12.0 * (hz / A4_FREQUENCY).log2() + A4_MIDI as f32).round();
        if (0.0..=127.0).contains(&midi) {
            Some(Self { midi: midi as u8 })
        } else {
            None
        }
    }

    pub fn midi(self) -> u8 {
        self.midi
    }

    /// Pitch class, 0 = C through 11 = B.
    pub fn pitch_class(self) -> u8 {
        self.midi % 12
    }

    pub fn octave(self) -> i8 {
        (self.midi / 12) as i8 - 1
    }

    /// Equal-tempered frequency of this pitch in Hz.
    pub fn frequency(self) -> f32 {
        A4_FREQUENCY * 2.0_f32.powf((self.midi as f32 - A4_MIDI as f32) / 12.0)
    }

    /// Signed distance in semitones from `self` up to `other`.
    pub fn semitones_to(self, other: Pitch) -> i32 {
        other.midi as i32 - self.midi as i32
    }

    pub fn transpose(self, semitones: i32) -> Option<Self> {
        u8::try_from(self.midi as i32 + semitones)
            .ok()
            .and_then(Self::from_midi)
    }

    pub fn name(self) -> String {
        format!("{}{}", NOTE_NAMES[self.pitch_class() as usize], self.octave())
    }
}

/// Deviation of `freq` from the equal-tempered frequency of `pitch`, in cents.
pub fn cents_deviation(freq: f32, pitch: Pitch) -> f32 {
    1200.0 * (freq / pitch.frequency()).log2()
}

/// Finds the closest pitch to a frequency and its deviation in cents.
pub fn find_nearest_pitch(freq: f32) -> Option<(Pitch, f32)> {
    Pitch::from_frequency(freq).map(|pitch| (pitch, cents_deviation(freq, pitch)))
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Pitch {
    type Err = TranscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TranscriptionError::InvalidPitch(s.to_string());
        let trimmed = s.trim();

        // Octave digits (optionally negative) follow a letter and an accidental.
        let split = trimmed
            .char_indices()
            .skip(1)
            .find(|(_, c)| c.is_ascii_digit() || *c == '-')
            .map(|(i, _)| i)
            .ok_or_else(invalid)?;
        let (spelling, octave) = trimmed.split_at(split);

        let mut chars = spelling.chars();
        let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        let normalized: String = std::iter::once(letter).chain(chars).collect();

        let class = *PITCH_CLASS_MAP.get(normalized.as_str()).ok_or_else(invalid)?;
        let octave: i32 = octave.parse().map_err(|_| invalid())?;

        let midi = (octave + 1) * 12 + class as i32;
        u8::try_from(midi)
            .ok()
            .and_then(Pitch::from_midi)
            .ok_or_else(invalid)
    }
}

impl From<Pitch> for String {
    fn from(pitch: Pitch) -> Self {
        pitch.name()
    }
}

impl TryFrom<String> for Pitch {
    type Error = TranscriptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
