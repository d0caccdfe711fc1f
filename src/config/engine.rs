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
use std::path::Path;

use config::{Config, File};
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::sampler::{
    EnvelopeCurve, EnvelopeParameters, FilterSettings, VoiceSettings, MAX_MASTER_VOLUME,
    MAX_VOICES,
};

/// Default output sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default largest block rendered in one pass.
pub const DEFAULT_MAX_BLOCK_FRAMES: usize = 512;

/// Default capacity of the control event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// Default maximum number of loaded regions.
pub const DEFAULT_MAX_REGIONS: usize = 1024;

/// Behavior when a note is played again while a voice is still sounding it.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetriggerBehavior {
    /// Cut the sounding voice and restart it.
    #[default]
    Cut,
    /// Start another voice alongside the sounding one.
    Polyphonic,
}

/// A YAML representation of an ADSR envelope. Times are in seconds.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EnvelopeConfig {
    attack: f32,
    decay: f32,
    /// Sustain level, 0 to 1.
    sustain: f32,
    release: f32,
    curve: EnvelopeCurve,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        let parameters = EnvelopeParameters::default();
        Self {
            attack: parameters.attack,
            decay: parameters.decay,
            sustain: parameters.sustain,
            release: parameters.release,
            curve: parameters.curve,
        }
    }
}

impl EnvelopeConfig {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32, curve: EnvelopeCurve) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
            curve,
        }
    }

    pub fn attack(&self) -> f32 {
        self.attack
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn sustain(&self) -> f32 {
        self.sustain
    }

    pub fn release(&self) -> f32 {
        self.release
    }

    pub fn curve(&self) -> EnvelopeCurve {
        self.curve
    }

    /// Converts to the parameters the envelope generator runs on.
    pub fn parameters(&self) -> EnvelopeParameters {
        EnvelopeParameters {
            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,
            curve: self.curve,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        for (stage, seconds) in [
            ("attack", self.attack),
            ("decay", self.decay),
            ("release", self.release),
        ] {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} {} must be a non-negative number of seconds, got {}",
                    name, stage, seconds
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.sustain) {
            return Err(ConfigError::Invalid(format!(
                "{} sustain must be between 0 and 1, got {}",
                name, self.sustain
            )));
        }
        Ok(())
    }
}

/// A YAML representation of the per-voice low-pass filter.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    enabled: bool,
    /// Cutoff at middle C before modulation.
    cutoff_hz: f32,
    resonance: f32,
    key_tracking: f32,
    /// Octaves of cutoff the filter envelope adds at full level.
    envelope_depth: f32,
    velocity_sensitivity: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let settings = FilterSettings::default();
        Self {
            enabled: settings.enabled,
            cutoff_hz: settings.cutoff_hz,
            resonance: settings.resonance,
            key_tracking: settings.key_tracking,
            envelope_depth: settings.envelope_depth,
            velocity_sensitivity: settings.velocity_sensitivity,
        }
    }
}

impl FilterConfig {
    pub fn new(enabled: bool, cutoff_hz: f32, resonance: f32) -> Self {
        Self {
            enabled,
            cutoff_hz,
            resonance,
            ..Default::default()
        }
    }

    pub fn with_modulation(
        mut self,
        key_tracking: f32,
        envelope_depth: f32,
        velocity_sensitivity: f32,
    ) -> Self {
        self.key_tracking = key_tracking;
        self.envelope_depth = envelope_depth;
        self.velocity_sensitivity = velocity_sensitivity;
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz
    }

    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    pub fn settings(&self) -> FilterSettings {
        FilterSettings {
            enabled: self.enabled,
            cutoff_hz: self.cutoff_hz,
            resonance: self.resonance,
            key_tracking: self.key_tracking,
            envelope_depth: self.envelope_depth,
            velocity_sensitivity: self.velocity_sensitivity,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.cutoff_hz.is_finite() || self.cutoff_hz <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "filter cutoff_hz must be positive, got {}",
                self.cutoff_hz
            )));
        }
        if !self.resonance.is_finite() || self.resonance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "filter resonance must be positive, got {}",
                self.resonance
            )));
        }
        if !self.key_tracking.is_finite() || !self.envelope_depth.is_finite() {
            return Err(ConfigError::Invalid(
                "filter key_tracking and envelope_depth must be finite".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.velocity_sensitivity) {
            return Err(ConfigError::Invalid(format!(
                "filter velocity_sensitivity must be between 0 and 1, got {}",
                self.velocity_sensitivity
            )));
        }
        Ok(())
    }
}

/// A YAML representation of the sampler engine configuration.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    sample_rate: u32,

    /// Size of the voice pool.
    max_voices: usize,

    /// Largest block rendered in one pass. Output buffers are allocated to this size.
    max_block_frames: usize,

    event_queue_capacity: usize,

    max_regions: usize,

    master_volume: f32,

    /// Keep looping regions looping after note-off.
    loop_thru_release: bool,

    retrigger: RetriggerBehavior,

    amplitude_envelope: EnvelopeConfig,

    filter_envelope: EnvelopeConfig,

    filter: FilterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_voices: MAX_VOICES,
            max_block_frames: DEFAULT_MAX_BLOCK_FRAMES,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            max_regions: DEFAULT_MAX_REGIONS,
            master_volume: 1.0,
            loop_thru_release: false,
            retrigger: RetriggerBehavior::default(),
            amplitude_envelope: EnvelopeConfig::default(),
            filter_envelope: EnvelopeConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse an engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if !(1..=MAX_VOICES).contains(&self.max_voices) {
            return Err(ConfigError::Invalid(format!(
                "max_voices must be between 1 and {}, got {}",
                MAX_VOICES, self.max_voices
            )));
        }
        if self.max_block_frames == 0 {
            return Err(ConfigError::Invalid("max_block_frames must be positive".to_string()));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_capacity must be positive".to_string(),
            ));
        }
        if self.max_regions == 0 {
            return Err(ConfigError::Invalid("max_regions must be positive".to_string()));
        }
        if !(0.0..=MAX_MASTER_VOLUME).contains(&self.master_volume) {
            return Err(ConfigError::Invalid(format!(
                "master_volume must be between 0 and {}, got {}",
                MAX_MASTER_VOLUME, self.master_volume
            )));
        }
        self.amplitude_envelope.validate("amplitude_envelope")?;
        self.filter_envelope.validate("filter_envelope")?;
        self.filter.validate()
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    pub fn with_max_block_frames(mut self, max_block_frames: usize) -> Self {
        self.max_block_frames = max_block_frames;
        self
    }

    pub fn with_event_queue_capacity(mut self, event_queue_capacity: usize) -> Self {
        self.event_queue_capacity = event_queue_capacity;
        self
    }

    pub fn with_max_regions(mut self, max_regions: usize) -> Self {
        self.max_regions = max_regions;
        self
    }

    pub fn with_master_volume(mut self, master_volume: f32) -> Self {
        self.master_volume = master_volume;
        self
    }

    pub fn with_loop_thru_release(mut self, loop_thru_release: bool) -> Self {
        self.loop_thru_release = loop_thru_release;
        self
    }

    pub fn with_retrigger(mut self, retrigger: RetriggerBehavior) -> Self {
        self.retrigger = retrigger;
        self
    }

    pub fn with_amplitude_envelope(mut self, envelope: EnvelopeConfig) -> Self {
        self.amplitude_envelope = envelope;
        self
    }

    pub fn with_filter_envelope(mut self, envelope: EnvelopeConfig) -> Self {
        self.filter_envelope = envelope;
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    pub fn max_block_frames(&self) -> usize {
        self.max_block_frames
    }

    pub fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity
    }

    pub fn max_regions(&self) -> usize {
        self.max_regions
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn loop_thru_release(&self) -> bool {
        self.loop_thru_release
    }

    pub fn retrigger(&self) -> RetriggerBehavior {
        self.retrigger
    }

    pub fn amplitude_envelope(&self) -> &EnvelopeConfig {
        &self.amplitude_envelope
    }

    pub fn filter_envelope(&self) -> &EnvelopeConfig {
        &self.filter_envelope
    }

    pub fn filter(&self) -> &FilterConfig {
        &self.filter
    }

    /// The settings every voice is built with.
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            sample_rate: f64::from(self.sample_rate),
            amplitude_envelope: self.amplitude_envelope.parameters(),
            filter_envelope: self.filter_envelope.parameters(),
            filter: self.filter.settings(),
        }
    }
}
