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

//! Per-voice resonant low-pass filter.
//!
//! A two-pole state-variable filter built from trapezoidal integrators. Coefficients
//! are recomputed whenever the filter envelope moves the cutoff. With cutoff and Q
//! clamped to the ranges below the filter is stable for any input.

use std::f32::consts::PI;

/// Lowest cutoff frequency in Hz.
pub const MIN_CUTOFF_HZ: f32 = 20.0;

/// Highest cutoff as a fraction of the sample rate.
pub const MAX_CUTOFF_RATIO: f32 = 0.45;

/// Lowest resonance (Q).
pub const MIN_RESONANCE: f32 = 0.5;

/// Highest resonance (Q).
pub const MAX_RESONANCE: f32 = 20.0;

/// Integrator state for one channel.
#[derive(Clone, Copy, Debug, Default)]
struct ChannelState {
    ic1eq: f32,
    ic2eq: f32,
}

impl ChannelState {
    #[inline]
    fn process(&mut self, input: f32, a1: f32, a2: f32, a3: f32) -> f32 {
        let v3 = input - self.ic2eq;
        let v1 = a1 * self.ic1eq + a2 * v3;
        let v2 = self.ic2eq + a2 * self.ic1eq + a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        v2
    }
}

/// Two channels of low-pass filtering sharing one set of coefficients.
#[derive(Clone, Debug)]
pub struct StereoFilter {
    sample_rate: f32,
    cutoff: f32,
    resonance: f32,
    a1: f32,
    a2: f32,
    a3: f32,
    left: ChannelState,
    right: ChannelState,
}

impl StereoFilter {
    /// Creates a filter fully open at the highest cutoff.
    pub fn new(sample_rate: f32) -> Self {
        let mut filter = Self {
            sample_rate,
            cutoff: 0.0,
            resonance: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            left: ChannelState::default(),
            right: ChannelState::default(),
        };
        filter.set_parameters(sample_rate * MAX_CUTOFF_RATIO, std::f32::consts::FRAC_1_SQRT_2);
        filter
    }

    /// Sets cutoff (Hz) and resonance (Q), clamped to the stable range.
    #[inline]
    pub fn set_parameters(&mut self, cutoff_hz: f32, resonance: f32) {
        let max_cutoff = self.sample_rate * MAX_CUTOFF_RATIO;
        let cutoff = if cutoff_hz.is_finite() {
            cutoff_hz.clamp(MIN_CUTOFF_HZ.min(max_cutoff), max_cutoff)
        } else {
            max_cutoff
        };
        let resonance = if resonance.is_finite() {
            resonance.clamp(MIN_RESONANCE, MAX_RESONANCE)
        } else {
            MIN_RESONANCE
        };
        if cutoff == self.cutoff && resonance == self.resonance {
            return;
        }

        let g = (PI * cutoff / self.sample_rate).tan();
        let k = 1.0 / resonance;
        self.a1 = 1.0 / (1.0 + g * (g + k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
        self.cutoff = cutoff;
        self.resonance = resonance;
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    /// Filters one frame.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            self.left.process(left, self.a1, self.a2, self.a3),
            self.right.process(right, self.a1, self.a2, self.a3),
        )
    }

    /// Clears the integrator state.
    pub fn reset(&mut self) {
        self.left = ChannelState::default();
        self.right = ChannelState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::audio_test_utils::{calculate_rms, generate_sine};

    const RATE: f32 = 44100.0;

    fn filter_rms(filter: &mut StereoFilter, input: &[f32]) -> f32 {
        let output: Vec<f32> = input.iter().map(|&s| filter.process(s, s).0).collect();
        // Skip the settling period.
        calculate_rms(&output[output.len() / 2..])
    }

    #[test]
    fn test_passes_dc() {
        let mut filter = StereoFilter::new(RATE);
        filter.set_parameters(1000.0, std::f32::consts::FRAC_1_SQRT_2);
        let mut last = (0.0, 0.0);
        for _ in 0..10_000 {
            last = filter.process(1.0, -1.0);
        }
        assert!((last.0 - 1.0).abs() < 1e-3);
        assert!((last.1 + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_attenuates_above_cutoff() {
        let input = generate_sine(8000.0, RATE as u32, 0.2);
        let mut filter = StereoFilter::new(RATE);
        filter.set_parameters(500.0, std::f32::consts::FRAC_1_SQRT_2);
        let filtered = filter_rms(&mut filter, &input);

        let original = calculate_rms(&input[input.len() / 2..]);
        assert!(filtered < original * 0.01, "{} vs {}", filtered, original);
    }

    #[test]
    fn test_passes_below_cutoff() {
        let input = generate_sine(100.0, RATE as u32, 0.5);
        let mut filter = StereoFilter::new(RATE);
        filter.set_parameters(5000.0, std::f32::consts::FRAC_1_SQRT_2);
        let filtered = filter_rms(&mut filter, &input);

        let original = calculate_rms(&input[input.len() / 2..]);
        assert!((filtered - original).abs() < original * 0.05);
    }

    #[test]
    fn test_parameters_clamped() {
        let mut filter = StereoFilter::new(RATE);
        filter.set_parameters(1.0e9, 1.0e9);
        assert_eq!(filter.cutoff(), RATE * MAX_CUTOFF_RATIO);
        assert_eq!(filter.resonance(), MAX_RESONANCE);

        filter.set_parameters(-5.0, 0.0);
        assert_eq!(filter.cutoff(), MIN_CUTOFF_HZ);
        assert_eq!(filter.resonance(), MIN_RESONANCE);

        filter.set_parameters(f32::NAN, f32::NAN);
        assert!(filter.cutoff().is_finite());
        assert!(filter.resonance().is_finite());
    }

    #[test]
    fn test_stable_under_sweeping_max_resonance() {
        let mut filter = StereoFilter::new(RATE);
        let input = generate_sine(440.0, RATE as u32, 1.0);
        for (i, sample) in input.iter().enumerate() {
            // Sweep the cutoff across the whole range every 1000 samples.
            let position = (i % 1000) as f32 / 1000.0;
            filter.set_parameters(MIN_CUTOFF_HZ + position * RATE * 0.5, MAX_RESONANCE);
            let (l, r) = filter.process(*sample, -*sample);
            assert!(l.is_finite() && r.is_finite());
            assert!(l.abs() < 100.0, "runaway output {} at {}", l, i);
        }
    }
}
