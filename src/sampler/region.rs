// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Sample regions: decoded audio plus the metadata needed to play it back.
//!
//! A region is validated once, when it is loaded. Fractional loop and trim positions
//! are resolved to absolute frame indices at that point, so the render path only ever
//! deals with half-open frame ranges.

use serde::{Deserialize, Serialize};

/// The highest valid MIDI note or velocity value.
pub const MAX_MIDI_VALUE: u8 = 127;

/// Converts a (possibly fractional) MIDI note number to a frequency in Hz.
pub fn note_to_hz(note: f64) -> f64 {
    440.0 * 2f64.powf((note - 69.0) / 12.0)
}

/// Errors raised when a region's descriptor or audio is malformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("sample buffer is empty")]
    EmptyBuffer,

    #[error("sample buffer holds {actual} samples, expected at least {expected}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("unsupported channel count {0}, expected 1 or 2")]
    UnsupportedChannelCount(u16),

    #[error("sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("{field} value {value} is outside the MIDI range 0-127")]
    MidiValueOutOfRange { field: &'static str, value: u8 },

    #[error("key range {field} minimum {min} exceeds maximum {max}")]
    InvertedKeyRange { field: &'static str, min: u8, max: u8 },

    #[error("natural pitch {0} Hz is not a positive frequency")]
    InvalidNoteHz(f64),

    #[error("{field} position {value} is not a finite, non-negative value")]
    InvalidPosition { field: &'static str, value: f64 },

    #[error("play range [{start}, {end}) is empty")]
    EmptyPlayRange { start: usize, end: usize },

    #[error("loop end {end} is not after loop start {start}")]
    LoopEndBeforeStart { start: usize, end: usize },

    #[error("region limit of {0} reached")]
    RegionLimitReached(usize),
}

/// The note and velocity box a region answers to in the full key map.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyRange {
    min_note: u8,
    max_note: u8,
    #[serde(default)]
    min_vel: u8,
    #[serde(default = "default_max_vel")]
    max_vel: u8,
}

fn default_max_vel() -> u8 {
    MAX_MIDI_VALUE
}

impl KeyRange {
    /// Creates a new key range. Both bounds are inclusive.
    pub fn new(min_note: u8, max_note: u8, min_vel: u8, max_vel: u8) -> Self {
        Self {
            min_note,
            max_note,
            min_vel,
            max_vel,
        }
    }

    /// A range covering the given notes at every velocity.
    pub fn notes(min_note: u8, max_note: u8) -> Self {
        Self::new(min_note, max_note, 0, MAX_MIDI_VALUE)
    }

    pub fn min_note(&self) -> u8 {
        self.min_note
    }

    pub fn max_note(&self) -> u8 {
        self.max_note
    }

    pub fn min_vel(&self) -> u8 {
        self.min_vel
    }

    pub fn max_vel(&self) -> u8 {
        self.max_vel
    }

    /// Returns true if the note and velocity both fall inside this range.
    #[inline]
    pub fn contains(&self, note: u8, velocity: u8) -> bool {
        (self.min_note..=self.max_note).contains(&note)
            && (self.min_vel..=self.max_vel).contains(&velocity)
    }

    /// Returns true if any (note, velocity) pair lies in both ranges.
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        self.min_note <= other.max_note
            && other.min_note <= self.max_note
            && self.min_vel <= other.max_vel
            && other.min_vel <= self.max_vel
    }

    fn validate(&self) -> Result<(), RegionError> {
        for (field, value) in [
            ("min_note", self.min_note),
            ("max_note", self.max_note),
            ("min_vel", self.min_vel),
            ("max_vel", self.max_vel),
        ] {
            if value > MAX_MIDI_VALUE {
                return Err(RegionError::MidiValueOutOfRange { field, value });
            }
        }
        if self.min_note > self.max_note {
            return Err(RegionError::InvertedKeyRange {
                field: "note",
                min: self.min_note,
                max: self.max_note,
            });
        }
        if self.min_vel > self.max_vel {
            return Err(RegionError::InvertedKeyRange {
                field: "velocity",
                min: self.min_vel,
                max: self.max_vel,
            });
        }
        Ok(())
    }
}

/// Playback metadata for a sample.
///
/// Positions (`start`, `end`, `loop_start`, `loop_end`) between 0 and 1 inclusive are
/// fractions of the sample length; larger values are absolute frame counts. An `end`
/// of 0 means the end of the sample.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SampleDescriptor {
    /// The MIDI note the sample was recorded at.
    note_number: u8,

    /// The natural pitch of the sample. Derived from `note_number` when absent.
    #[serde(default)]
    note_hz: Option<f64>,

    /// Note/velocity box for the full key map. Regions without one are only
    /// reachable through the simple (nearest note) map.
    #[serde(default)]
    key_range: Option<KeyRange>,

    /// Whether the sample loops between `loop_start` and `loop_end`.
    #[serde(default)]
    looping: bool,

    #[serde(default)]
    loop_start: f64,

    #[serde(default)]
    loop_end: f64,

    /// Play start trim point.
    #[serde(default)]
    start: f64,

    /// Play end trim point.
    #[serde(default)]
    end: f64,
}

impl SampleDescriptor {
    /// Creates a descriptor for a one-shot sample at the given note that plays in full.
    pub fn new(note_number: u8) -> Self {
        Self {
            note_number,
            note_hz: None,
            key_range: None,
            looping: false,
            loop_start: 0.0,
            loop_end: 0.0,
            start: 0.0,
            end: 0.0,
        }
    }

    pub fn with_note_hz(mut self, note_hz: f64) -> Self {
        self.note_hz = Some(note_hz);
        self
    }

    pub fn with_key_range(mut self, key_range: KeyRange) -> Self {
        self.key_range = Some(key_range);
        self
    }

    /// Enables looping between the two positions.
    pub fn with_loop(mut self, loop_start: f64, loop_end: f64) -> Self {
        self.looping = true;
        self.loop_start = loop_start;
        self.loop_end = loop_end;
        self
    }

    /// Sets the play start and end trim points.
    pub fn with_trim(mut self, start: f64, end: f64) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn note_number(&self) -> u8 {
        self.note_number
    }

    /// Gets the natural pitch, falling back to the equal-tempered note frequency.
    pub fn note_hz(&self) -> f64 {
        self.note_hz
            .unwrap_or_else(|| note_to_hz(self.note_number as f64))
    }

    pub fn key_range(&self) -> Option<KeyRange> {
        self.key_range
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }
}

/// How multi-channel samples are laid out in a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Frame by frame: L R L R ...
    Interleaved,
    /// Channel by channel: L L L ... R R R ...
    Planar,
}

/// Decoded audio handed over by a file-format collaborator.
#[derive(Clone, Debug)]
pub struct SampleAudio {
    data: Vec<f32>,
    channels: u16,
    layout: ChannelLayout,
    frames: usize,
    sample_rate: u32,
}

impl SampleAudio {
    /// Creates audio from a buffer with an explicit layout and frame count.
    pub fn new(
        data: Vec<f32>,
        channels: u16,
        layout: ChannelLayout,
        frames: usize,
        sample_rate: u32,
    ) -> Self {
        Self {
            data,
            channels,
            layout,
            frames,
            sample_rate,
        }
    }

    /// Creates audio from interleaved samples; the frame count is derived from the length.
    pub fn interleaved(data: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let frames = if channels > 0 {
            data.len() / channels as usize
        } else {
            0
        };
        Self::new(data, channels, ChannelLayout::Interleaved, frames, sample_rate)
    }

    /// Creates single-channel audio.
    pub fn mono(data: Vec<f32>, sample_rate: u32) -> Self {
        Self::interleaved(data, 1, sample_rate)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    fn validate(&self) -> Result<(), RegionError> {
        if self.channels != 1 && self.channels != 2 {
            return Err(RegionError::UnsupportedChannelCount(self.channels));
        }
        if self.sample_rate == 0 {
            return Err(RegionError::ZeroSampleRate);
        }
        if self.frames == 0 || self.data.is_empty() {
            return Err(RegionError::EmptyBuffer);
        }
        let expected = self.frames * self.channels as usize;
        if self.data.len() < expected {
            return Err(RegionError::BufferTooShort {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// A descriptor paired with its audio, as accepted by the loader.
#[derive(Clone, Debug)]
pub struct SampleRegionInput {
    pub descriptor: SampleDescriptor,
    pub audio: SampleAudio,
}

impl SampleRegionInput {
    pub fn new(descriptor: SampleDescriptor, audio: SampleAudio) -> Self {
        Self { descriptor, audio }
    }
}

/// Resolves a descriptor position to a frame index in `[0, frames]`.
fn resolve_position(field: &'static str, value: f64, frames: usize) -> Result<usize, RegionError> {
    if !value.is_finite() || value < 0.0 {
        return Err(RegionError::InvalidPosition { field, value });
    }
    let resolved = if value <= 1.0 {
        (value * frames as f64).round()
    } else {
        value.round()
    };
    Ok((resolved as usize).min(frames))
}

/// An immutable, validated sample ready for playback.
#[derive(Debug)]
pub struct SampleRegion {
    descriptor: SampleDescriptor,
    audio: SampleAudio,
    note_hz: f64,
    start: usize,
    end: usize,
    loop_start: usize,
    loop_end: usize,
}

impl SampleRegion {
    /// Validates the input and resolves its positions against the real frame count.
    pub fn new(input: SampleRegionInput) -> Result<Self, RegionError> {
        let SampleRegionInput { descriptor, audio } = input;
        audio.validate()?;

        if descriptor.note_number > MAX_MIDI_VALUE {
            return Err(RegionError::MidiValueOutOfRange {
                field: "note_number",
                value: descriptor.note_number,
            });
        }
        if let Some(range) = &descriptor.key_range {
            range.validate()?;
        }
        let note_hz = descriptor.note_hz();
        if !note_hz.is_finite() || note_hz <= 0.0 {
            return Err(RegionError::InvalidNoteHz(note_hz));
        }

        let frames = audio.frames;
        let start = resolve_position("start", descriptor.start, frames)?;
        // Only an unset end means the end of the sample; a tiny end that rounds to
        // frame 0 is an empty range.
        let end = if descriptor.end == 0.0 {
            frames
        } else {
            resolve_position("end", descriptor.end, frames)?
        };
        if end <= start {
            return Err(RegionError::EmptyPlayRange { start, end });
        }

        let mut loop_start = resolve_position("loop_start", descriptor.loop_start, frames)?;
        let mut loop_end = resolve_position("loop_end", descriptor.loop_end, frames)?;
        if descriptor.looping {
            loop_start = loop_start.clamp(start, end);
            loop_end = loop_end.clamp(start, end);
            if loop_end <= loop_start {
                return Err(RegionError::LoopEndBeforeStart {
                    start: loop_start,
                    end: loop_end,
                });
            }
        }

        Ok(Self {
            descriptor,
            audio,
            note_hz,
            start,
            end,
            loop_start,
            loop_end,
        })
    }

    pub fn descriptor(&self) -> &SampleDescriptor {
        &self.descriptor
    }

    pub fn note_number(&self) -> u8 {
        self.descriptor.note_number
    }

    pub fn note_hz(&self) -> f64 {
        self.note_hz
    }

    pub fn key_range(&self) -> Option<KeyRange> {
        self.descriptor.key_range
    }

    pub fn is_looping(&self) -> bool {
        self.descriptor.looping
    }

    pub fn frames(&self) -> usize {
        self.audio.frames
    }

    pub fn channels(&self) -> u16 {
        self.audio.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    /// First frame played.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last frame played.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn loop_start(&self) -> usize {
        self.loop_start
    }

    /// One past the last frame of the loop.
    pub fn loop_end(&self) -> usize {
        self.loop_end
    }

    /// The cursor increment per output frame needed to sound `requested_hz`.
    pub fn pitch_ratio(&self, requested_hz: f64, engine_sample_rate: f64) -> f64 {
        requested_hz / self.note_hz * self.audio.sample_rate as f64 / engine_sample_rate
    }

    /// Reads the (left, right) pair at a frame. Mono regions feed both sides.
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let audio = &self.audio;
        let left = self.sample(index, 0);
        if audio.channels == 1 {
            (left, left)
        } else {
            (left, self.sample(index, 1))
        }
    }

    #[inline]
    fn sample(&self, index: usize, channel: usize) -> f32 {
        let audio = &self.audio;
        let offset = match audio.layout {
            ChannelLayout::Interleaved => index * audio.channels as usize + channel,
            ChannelLayout::Planar => channel * audio.frames + index,
        };
        audio.data[offset]
    }

    /// Returns the memory size of the audio in bytes.
    pub fn memory_size(&self) -> usize {
        self.audio.data.len() * std::mem::size_of::<f32>()
    }
}
