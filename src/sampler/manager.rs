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

//! Voice management for polyphonic sample playback.
//!
//! Handles voice allocation, stealing, and note-off behavior. Every voice is
//! constructed up front; nothing in here allocates after construction.

use super::envelope::EnvelopeStage;
use super::snapshot::RegionSet;
use super::voice::{RenderParams, Voice, VoiceSettings};
use crate::config::RetriggerBehavior;

/// Hard upper bound on the voice pool.
pub const MAX_VOICES: usize = 64;

/// Largest pitch bend accepted, in semitones either way.
pub const MAX_PITCH_BEND_SEMITONES: f32 = 24.0;

/// What a note-on did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteOnOutcome {
    /// No region is mapped to the note and velocity.
    Missed,
    /// A free voice was used.
    Allocated(usize),
    /// A voice already sounding the note was cut and reused.
    Retriggered(usize),
    /// The pool was full and a voice was stolen.
    Stolen(usize),
}

/// Manages the fixed pool of voices.
pub struct VoiceManager {
    voices: Box<[Voice]>,
    settings: VoiceSettings,
    retrigger: RetriggerBehavior,
    params: RenderParams,
    sustain_pedal: bool,
    /// Trigger sequence counter.
    next_order: u64,
    stolen: u64,
}

impl VoiceManager {
    /// Creates a new voice manager. The pool size is clamped to `1..=MAX_VOICES`.
    pub fn new(max_voices: usize, settings: VoiceSettings, retrigger: RetriggerBehavior) -> Self {
        let max_voices = max_voices.clamp(1, MAX_VOICES);
        let voices = (0..max_voices)
            .map(|_| Voice::new(&settings))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            voices,
            settings,
            retrigger,
            params: RenderParams::default(),
            sustain_pedal: false,
            next_order: 0,
            stolen: 0,
        }
    }

    /// Starts a voice for the region mapped to the note and velocity.
    pub fn note_on(&mut self, regions: &RegionSet, note: u8, velocity: u8) -> NoteOnOutcome {
        let Some((index, region)) = regions.lookup(note, velocity) else {
            return NoteOnOutcome::Missed;
        };

        let (slot, outcome) = if let Some(slot) = self.retrigger_slot(note) {
            (slot, NoteOnOutcome::Retriggered(slot))
        } else if let Some(slot) = self.voices.iter().position(|voice| !voice.is_active()) {
            (slot, NoteOnOutcome::Allocated(slot))
        } else {
            let slot = self.steal_slot();
            self.stolen += 1;
            (slot, NoteOnOutcome::Stolen(slot))
        };

        let order = self.next_order;
        self.next_order += 1;
        self.voices[slot].start(index, region, note, velocity, order, &self.settings);
        outcome
    }

    /// With cut retriggering, the voice already sounding this note.
    fn retrigger_slot(&self, note: u8) -> Option<usize> {
        match self.retrigger {
            RetriggerBehavior::Cut => self
                .voices
                .iter()
                .position(|voice| voice.is_active() && voice.note() == note),
            RetriggerBehavior::Polyphonic => None,
        }
    }

    /// The quietest releasing voice (oldest on ties), else the oldest voice.
    fn steal_slot(&self) -> usize {
        let releasing = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, voice)| voice.amplitude_stage() == EnvelopeStage::Release)
            .min_by(|(_, a), (_, b)| {
                a.amplitude()
                    .total_cmp(&b.amplitude())
                    .then(a.order().cmp(&b.order()))
            });

        releasing
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, voice)| voice.order())
            })
            .map(|(slot, _)| slot)
            .unwrap_or(0)
    }

    /// Releases every sounding voice on the note, or marks it sustained while the pedal
    /// is down.
    pub fn note_off(&mut self, note: u8) {
        let sustain_pedal = self.sustain_pedal;
        for voice in self
            .voices
            .iter_mut()
            .filter(|voice| voice.is_active() && !voice.is_released() && voice.note() == note)
        {
            if sustain_pedal {
                voice.sustain();
            } else {
                voice.release();
            }
        }
    }

    /// Releases every sounding voice, pedal or not.
    pub fn all_notes_off(&mut self) {
        for voice in self
            .voices
            .iter_mut()
            .filter(|voice| voice.is_active() && !voice.is_released())
        {
            voice.release();
        }
    }

    /// Silences every voice immediately.
    pub fn stop_all(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.stop();
        }
    }

    /// Pedal up releases every voice whose note-off arrived while it was down.
    pub fn set_sustain_pedal(&mut self, down: bool) {
        self.sustain_pedal = down;
        if down {
            return;
        }
        for voice in self
            .voices
            .iter_mut()
            .filter(|voice| voice.is_active() && voice.is_sustained())
        {
            voice.release();
        }
    }

    pub fn set_loop_thru_release(&mut self, enabled: bool) {
        self.params.loop_thru_release = enabled;
    }

    /// Sets the global pitch offset in semitones.
    pub fn set_pitch_bend(&mut self, semitones: f32) {
        let semitones = if semitones.is_finite() {
            semitones.clamp(-MAX_PITCH_BEND_SEMITONES, MAX_PITCH_BEND_SEMITONES)
        } else {
            0.0
        };
        self.params.pitch_factor = (semitones as f64 / 12.0).exp2();
    }

    /// Renders every active voice, summing into the output. Voices that go idle return to
    /// the pool.
    pub fn render(&mut self, regions: &RegionSet, left: &mut [f32], right: &mut [f32]) {
        let settings = &self.settings;
        let params = self.params;
        for voice in self.voices.iter_mut().filter(|voice| voice.is_active()) {
            match voice.region().and_then(|index| regions.region(index)) {
                Some(region) => {
                    voice.render(region, settings, params, left, right);
                }
                None => voice.stop(),
            }
        }
    }

    /// Returns the current number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_active()).count()
    }

    pub fn max_voices(&self) -> usize {
        self.voices.len()
    }

    /// Total voices stolen since construction.
    pub fn stolen_count(&self) -> u64 {
        self.stolen
    }

    pub fn sustain_pedal(&self) -> bool {
        self.sustain_pedal
    }

    pub fn loop_thru_release(&self) -> bool {
        self.params.loop_thru_release
    }

    pub fn pitch_factor(&self) -> f64 {
        self.params.pitch_factor
    }

    pub fn voice(&self, slot: usize) -> Option<&Voice> {
        self.voices.get(slot)
    }
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.active_count())
            .field("max_voices", &self.voices.len())
            .field("retrigger", &self.retrigger)
            .field("stolen", &self.stolen)
            .finish()
    }
}
