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

//! ADSR envelope generator.
//!
//! Each voice runs two of these, one for amplitude and one for filter cutoff. The
//! envelope is plain data advanced one sample at a time; nothing here allocates.

use serde::{Deserialize, Serialize};

/// Level below which an exponential release is considered finished (-80 dB).
const SILENCE_THRESHOLD: f32 = 1.0e-4;

/// Overshoot target for exponential attack. Larger values make the attack more linear.
const ATTACK_TARGET_RATIO: f32 = 0.3;

/// Overshoot target for exponential decay and release.
const DECAY_RELEASE_TARGET_RATIO: f32 = 1.0e-4;

/// The shape of the envelope's segments.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeCurve {
    /// Straight-line segments.
    #[default]
    Linear,
    /// One-pole (RC style) segments.
    Exponential,
}

/// The current stage of an envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeStage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Envelope timing in seconds and sustain as a level in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeParameters {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub curve: EnvelopeCurve,
}

impl Default for EnvelopeParameters {
    fn default() -> Self {
        Self {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
            curve: EnvelopeCurve::Linear,
        }
    }
}

/// Per-sample step for one segment, precomputed from its length.
#[derive(Clone, Copy, Debug, Default)]
struct Segment {
    /// Segment length in samples. Less than one sample means instantaneous.
    samples: f32,
    /// Exponential multiplier.
    coefficient: f32,
}

impl Segment {
    fn new(seconds: f32, sample_rate: f32, ratio: f32) -> Self {
        let samples = (seconds.max(0.0) * sample_rate).max(0.0);
        let coefficient = if samples >= 1.0 {
            (-((1.0 + ratio) / ratio).ln() / samples).exp()
        } else {
            0.0
        };
        Self {
            samples,
            coefficient,
        }
    }

    #[inline]
    fn is_instant(&self) -> bool {
        self.samples < 1.0
    }
}

/// An ADSR state machine.
#[derive(Clone, Debug)]
pub struct EnvelopeGenerator {
    stage: EnvelopeStage,
    level: f32,
    curve: EnvelopeCurve,
    sustain: f32,
    attack: Segment,
    decay: Segment,
    release: Segment,
    /// Linear release step, fixed at the moment release begins.
    release_step: f32,
}

impl EnvelopeGenerator {
    /// Creates an idle envelope.
    pub fn new(parameters: EnvelopeParameters, sample_rate: f32) -> Self {
        let mut envelope = Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            curve: parameters.curve,
            sustain: 1.0,
            attack: Segment::default(),
            decay: Segment::default(),
            release: Segment::default(),
            release_step: 0.0,
        };
        envelope.set_parameters(parameters, sample_rate);
        envelope
    }

    /// Updates timing. Takes effect from the next sample.
    pub fn set_parameters(&mut self, parameters: EnvelopeParameters, sample_rate: f32) {
        self.curve = parameters.curve;
        self.sustain = parameters.sustain.clamp(0.0, 1.0);
        self.attack = Segment::new(parameters.attack, sample_rate, ATTACK_TARGET_RATIO);
        self.decay = Segment::new(parameters.decay, sample_rate, DECAY_RELEASE_TARGET_RATIO);
        self.release = Segment::new(parameters.release, sample_rate, DECAY_RELEASE_TARGET_RATIO);
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    /// Starts the attack from the current level. A zero-length attack reaches full
    /// level immediately, before the first sample.
    pub fn trigger(&mut self) {
        if self.attack.is_instant() {
            self.level = 1.0;
            self.stage = EnvelopeStage::Decay;
        } else {
            self.stage = EnvelopeStage::Attack;
        }
    }

    /// Moves any sounding stage into release. Does nothing when idle or releasing.
    pub fn release(&mut self) {
        if matches!(self.stage, EnvelopeStage::Idle | EnvelopeStage::Release) {
            return;
        }
        self.stage = EnvelopeStage::Release;
        self.release_step = if self.release.is_instant() {
            self.level
        } else {
            self.level / self.release.samples
        };
    }

    /// Forces the envelope to idle at zero.
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
        self.release_step = 0.0;
    }

    /// Advances one sample and returns the new level.
    #[inline]
    pub fn next(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                if self.attack.is_instant() {
                    self.level = 1.0;
                } else {
                    match self.curve {
                        EnvelopeCurve::Linear => self.level += 1.0 / self.attack.samples,
                        EnvelopeCurve::Exponential => {
                            let target = 1.0 + ATTACK_TARGET_RATIO;
                            self.level =
                                target * (1.0 - self.attack.coefficient) + self.level * self.attack.coefficient;
                        }
                    }
                }
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                if self.decay.is_instant() {
                    self.level = self.sustain;
                } else {
                    match self.curve {
                        EnvelopeCurve::Linear => {
                            self.level -= (1.0 - self.sustain) / self.decay.samples;
                        }
                        EnvelopeCurve::Exponential => {
                            let target = self.sustain - DECAY_RELEASE_TARGET_RATIO;
                            self.level =
                                target * (1.0 - self.decay.coefficient) + self.level * self.decay.coefficient;
                        }
                    }
                }
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.sustain;
            }
            EnvelopeStage::Release => {
                let floor = match self.curve {
                    EnvelopeCurve::Linear => {
                        self.level -= self.release_step;
                        0.0
                    }
                    EnvelopeCurve::Exponential => {
                        if self.release.is_instant() {
                            self.level = 0.0;
                        } else {
                            let target = -DECAY_RELEASE_TARGET_RATIO;
                            self.level = target * (1.0 - self.release.coefficient)
                                + self.level * self.release.coefficient;
                        }
                        SILENCE_THRESHOLD
                    }
                };
                if self.level <= floor {
                    self.reset();
                }
            }
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f32 = 1000.0;

    fn params(attack: f32, decay: f32, sustain: f32, release: f32) -> EnvelopeParameters {
        EnvelopeParameters {
            attack,
            decay,
            sustain,
            release,
            curve: EnvelopeCurve::Linear,
        }
    }

    fn run_until(env: &mut EnvelopeGenerator, stage: EnvelopeStage, limit: usize) -> usize {
        for i in 0..limit {
            if env.stage() == stage {
                return i;
            }
            env.next();
        }
        panic!("envelope never reached {:?}", stage);
    }

    #[test]
    fn test_linear_adsr_stages() {
        let mut env = EnvelopeGenerator::new(params(0.01, 0.01, 0.5, 0.01), RATE);
        assert!(env.is_idle());
        assert_eq!(env.next(), 0.0);

        env.trigger();
        assert_eq!(env.stage(), EnvelopeStage::Attack);

        // 10 samples of attack, give or take float accumulation.
        let steps = run_until(&mut env, EnvelopeStage::Decay, 100);
        assert!((10..=11).contains(&steps), "attack took {} samples", steps);
        assert_eq!(env.level(), 1.0);

        run_until(&mut env, EnvelopeStage::Sustain, 100);
        assert_eq!(env.level(), 0.5);

        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Release);
        let steps = run_until(&mut env, EnvelopeStage::Idle, 100);
        assert!((9..=11).contains(&steps), "release took {} samples", steps);
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn test_sustain_holds_until_release() {
        let mut env = EnvelopeGenerator::new(params(0.001, 0.001, 0.7, 0.1), RATE);
        env.trigger();
        run_until(&mut env, EnvelopeStage::Sustain, 100);

        for _ in 0..100_000 {
            assert_eq!(env.next(), 0.7);
            assert_eq!(env.stage(), EnvelopeStage::Sustain);
        }

        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Release);
    }

    #[test]
    fn test_zero_sustain_stays_in_sustain() {
        let mut env = EnvelopeGenerator::new(params(0.0, 0.005, 0.0, 0.0), RATE);
        env.trigger();
        run_until(&mut env, EnvelopeStage::Sustain, 100);

        for _ in 0..1000 {
            assert_eq!(env.next(), 0.0);
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
    }

    #[test]
    fn test_instant_segments() {
        let mut env = EnvelopeGenerator::new(params(0.0, 0.0, 1.0, 0.0), RATE);
        env.trigger();
        assert_eq!(env.next(), 1.0);
        assert_eq!(env.next(), 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);

        env.release();
        assert_eq!(env.next(), 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn test_release_before_first_sample() {
        let mut env = EnvelopeGenerator::new(params(0.0, 0.0, 1.0, 0.01), RATE);
        env.trigger();
        assert_eq!(env.level(), 1.0);

        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Release);
        let first = env.next();
        assert!(first > 0.8 && first < 1.0, "first release sample was {}", first);
        let steps = run_until(&mut env, EnvelopeStage::Idle, 100);
        assert!((8..=10).contains(&steps), "release took {} samples", steps);
    }

    #[test]
    fn test_release_from_attack() {
        let mut env = EnvelopeGenerator::new(params(0.1, 0.1, 1.0, 0.01), RATE);
        env.trigger();
        for _ in 0..50 {
            env.next();
        }
        let level = env.level();
        assert!(level > 0.4 && level < 0.6);

        env.release();
        let next = env.next();
        assert!(next < level);
        run_until(&mut env, EnvelopeStage::Idle, 100);
    }

    #[test]
    fn test_release_when_idle_is_noop() {
        let mut env = EnvelopeGenerator::new(params(0.1, 0.1, 1.0, 0.1), RATE);
        env.release();
        assert!(env.is_idle());
    }

    #[test]
    fn test_exponential_curve_terminates() {
        let mut env = EnvelopeGenerator::new(
            EnvelopeParameters {
                attack: 0.01,
                decay: 0.05,
                sustain: 0.5,
                release: 0.05,
                curve: EnvelopeCurve::Exponential,
            },
            RATE,
        );
        env.trigger();
        let mut previous = 0.0;
        while env.stage() == EnvelopeStage::Attack {
            let level = env.next();
            assert!(level >= previous);
            previous = level;
        }
        run_until(&mut env, EnvelopeStage::Sustain, 1000);
        assert_eq!(env.level(), 0.5);

        env.release();
        run_until(&mut env, EnvelopeStage::Idle, 1000);
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn test_reset_forces_idle() {
        let mut env = EnvelopeGenerator::new(params(0.0, 0.0, 1.0, 1.0), RATE);
        env.trigger();
        env.next();
        env.reset();
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }
}
