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

//! A single sounding note.
//!
//! Voices live in a fixed arena owned by the voice manager and are reused rather than
//! created per note. A voice refers to its region by index into the current region
//! set and never owns audio.

use super::envelope::{EnvelopeGenerator, EnvelopeParameters, EnvelopeStage};
use super::filter::StereoFilter;
use super::region::{note_to_hz, SampleRegion, MAX_MIDI_VALUE};

/// Filter behavior shared by every voice.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSettings {
    /// When false the filter is bypassed.
    pub enabled: bool,
    /// Base cutoff for middle C (note 60).
    pub cutoff_hz: f32,
    /// Resonance (Q).
    pub resonance: f32,
    /// How far the cutoff follows the note: 0 is fixed, 1 tracks the keyboard fully.
    pub key_tracking: f32,
    /// Octaves the filter envelope opens the cutoff at full level.
    pub envelope_depth: f32,
    /// How much low velocities reduce the envelope depth, from 0 to 1.
    pub velocity_sensitivity: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cutoff_hz: 1000.0,
            resonance: std::f32::consts::FRAC_1_SQRT_2,
            key_tracking: 0.0,
            envelope_depth: 0.0,
            velocity_sensitivity: 0.0,
        }
    }
}

/// Settings fixed at configuration time.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceSettings {
    pub sample_rate: f64,
    pub amplitude_envelope: EnvelopeParameters,
    pub filter_envelope: EnvelopeParameters,
    pub filter: FilterSettings,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            amplitude_envelope: EnvelopeParameters::default(),
            filter_envelope: EnvelopeParameters::default(),
            filter: FilterSettings::default(),
        }
    }
}

/// Per-block playback state shared by all voices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
    /// Keep looping after note-off.
    pub loop_thru_release: bool,
    /// Multiplier applied to every voice's increment (pitch bend).
    pub pitch_factor: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            loop_thru_release: false,
            pitch_factor: 1.0,
        }
    }
}

/// Represents a voice slot, active or free.
#[derive(Clone, Debug)]
pub struct Voice {
    /// Index into the current region set; None when free.
    region: Option<usize>,
    /// The MIDI note that triggered this voice (for Note Off matching).
    note: u8,
    velocity: u8,
    /// Trigger sequence number, used to find the oldest voice.
    order: u64,
    /// Fractional read position in frames.
    position: f64,
    /// Frames advanced per output frame before pitch bend.
    increment: f64,
    /// Velocity gain.
    gain: f32,
    /// Note-off has been applied.
    released: bool,
    /// Note-off arrived while the sustain pedal was down.
    sustained: bool,
    /// The cursor ran past the end of a non-looping region.
    exhausted: bool,
    base_cutoff: f32,
    cutoff_depth: f32,
    amplitude_envelope: EnvelopeGenerator,
    filter_envelope: EnvelopeGenerator,
    filter: StereoFilter,
}

impl Voice {
    /// Creates a free voice.
    pub fn new(settings: &VoiceSettings) -> Self {
        let sample_rate = settings.sample_rate as f32;
        Self {
            region: None,
            note: 0,
            velocity: 0,
            order: 0,
            position: 0.0,
            increment: 0.0,
            gain: 0.0,
            released: false,
            sustained: false,
            exhausted: false,
            base_cutoff: settings.filter.cutoff_hz,
            cutoff_depth: 0.0,
            amplitude_envelope: EnvelopeGenerator::new(settings.amplitude_envelope, sample_rate),
            filter_envelope: EnvelopeGenerator::new(settings.filter_envelope, sample_rate),
            filter: StereoFilter::new(sample_rate),
        }
    }

    /// Assigns a region and starts both envelopes from the region's start trim point.
    pub fn start(
        &mut self,
        region_index: usize,
        region: &SampleRegion,
        note: u8,
        velocity: u8,
        order: u64,
        settings: &VoiceSettings,
    ) {
        self.stop();

        let velocity = velocity.min(MAX_MIDI_VALUE);
        let velocity_scale = velocity as f32 / MAX_MIDI_VALUE as f32;
        let filter = &settings.filter;

        self.region = Some(region_index);
        self.note = note;
        self.velocity = velocity;
        self.order = order;
        self.position = region.start() as f64;
        self.increment = region.pitch_ratio(note_to_hz(note as f64), settings.sample_rate);
        self.gain = velocity_scale;
        self.base_cutoff =
            filter.cutoff_hz * (filter.key_tracking * (note as f32 - 60.0) / 12.0).exp2();
        self.cutoff_depth = filter.envelope_depth
            * (1.0 - filter.velocity_sensitivity.clamp(0.0, 1.0) * (1.0 - velocity_scale));

        self.amplitude_envelope.trigger();
        self.filter_envelope.trigger();
    }

    /// Forces the voice idle and frees its slot.
    pub fn stop(&mut self) {
        self.region = None;
        self.released = false;
        self.sustained = false;
        self.exhausted = false;
        self.amplitude_envelope.reset();
        self.filter_envelope.reset();
        self.filter.reset();
    }

    /// Starts the release of both envelopes.
    pub fn release(&mut self) {
        self.released = true;
        self.sustained = false;
        self.amplitude_envelope.release();
        self.filter_envelope.release();
    }

    /// Marks the note as held by the sustain pedal.
    pub fn sustain(&mut self) {
        self.sustained = true;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.region.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn is_sustained(&self) -> bool {
        self.sustained
    }

    pub fn region(&self) -> Option<usize> {
        self.region
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Current amplitude envelope level.
    pub fn amplitude(&self) -> f32 {
        self.amplitude_envelope.level()
    }

    pub fn amplitude_stage(&self) -> EnvelopeStage {
        self.amplitude_envelope.stage()
    }

    /// Renders into the output, summing. Returns false once the voice has gone idle.
    pub fn render(
        &mut self,
        region: &SampleRegion,
        settings: &VoiceSettings,
        params: RenderParams,
        left: &mut [f32],
        right: &mut [f32],
    ) -> bool {
        if self.region.is_none() {
            return false;
        }

        let increment = self.increment * params.pitch_factor;
        let filter = &settings.filter;
        let end = region.end() as f64;

        for (out_left, out_right) in left.iter_mut().zip(right.iter_mut()) {
            let filter_level = self.filter_envelope.next();
            let amplitude = self.amplitude_envelope.next();
            if self.amplitude_envelope.is_idle() {
                self.stop();
                return false;
            }

            let looping = region.is_looping() && (!self.released || params.loop_thru_release);
            if looping {
                let loop_end = region.loop_end() as f64;
                if self.position >= loop_end {
                    let loop_start = region.loop_start() as f64;
                    self.position = loop_start + (self.position - loop_end) % (loop_end - loop_start);
                }
            }

            let (mut l, mut r) = if self.position < end {
                self.read(region, looping)
            } else {
                if !self.exhausted {
                    self.exhausted = true;
                    if self.amplitude_envelope.stage() == EnvelopeStage::Release {
                        self.stop();
                        return false;
                    }
                    self.amplitude_envelope.release();
                    self.filter_envelope.release();
                }
                (0.0, 0.0)
            };

            if filter.enabled {
                let cutoff = self.base_cutoff * (self.cutoff_depth * filter_level).exp2();
                self.filter.set_parameters(cutoff, filter.resonance);
                (l, r) = self.filter.process(l, r);
            }

            let scale = amplitude * self.gain;
            *out_left += l * scale;
            *out_right += r * scale;

            if !self.exhausted {
                self.position += increment;
            }
        }

        true
    }

    /// Linear interpolation between the two frames around the cursor. Both frames are
    /// always inside the region.
    #[inline]
    fn read(&self, region: &SampleRegion, looping: bool) -> (f32, f32) {
        let index = self.position as usize;
        let fraction = (self.position - index as f64) as f32;
        let limit = if looping {
            region.loop_end()
        } else {
            region.end()
        };
        let next = if index + 1 < limit {
            index + 1
        } else if looping {
            region.loop_start()
        } else {
            index
        };

        let (l0, r0) = region.frame(index);
        let (l1, r1) = region.frame(next);
        (l0 + (l1 - l0) * fraction, r0 + (r1 - r0) * fraction)
    }
}
