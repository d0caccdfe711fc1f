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

#[cfg(test)]
use crate::sampler::{SampleAudio, SampleDescriptor, SampleRegion, SampleRegionInput, VoiceSettings};

/// Audio test utilities for generating test signals and validating results
#[cfg(test)]
pub mod audio_test_utils {
    use std::f32::consts::PI;

    /// Generate a unit amplitude sine wave
    pub fn generate_sine(frequency: f32, sample_rate: u32, duration_seconds: f32) -> Vec<f32> {
        let sample_count = (sample_rate as f32 * duration_seconds) as usize;
        (0..sample_count)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Calculate RMS (Root Mean Square) of a signal
    pub fn calculate_rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
        (sum_squares / samples.len() as f32).sqrt()
    }
}

/// Voice settings with flat envelopes and no filter.
#[cfg(test)]
pub fn flat_settings(sample_rate: f64) -> VoiceSettings {
    VoiceSettings {
        sample_rate,
        ..VoiceSettings::default()
    }
}

/// Mono audio whose value at each frame is the frame index, so rendered output shows
/// exactly where playback is.
#[cfg(test)]
pub fn ramp_audio(frames: usize, sample_rate: u32) -> SampleAudio {
    SampleAudio::mono((0..frames).map(|i| i as f32).collect(), sample_rate)
}

#[cfg(test)]
pub fn region(descriptor: SampleDescriptor, audio: SampleAudio) -> SampleRegion {
    SampleRegion::new(SampleRegionInput::new(descriptor, audio)).unwrap()
}
