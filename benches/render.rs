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
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polysampler::config::{EngineConfig, EnvelopeConfig, FilterConfig};
use polysampler::sampler::{
    EnvelopeCurve, KeyRange, SampleAudio, SampleDescriptor, SampleRegionInput, Sampler,
};
use std::time::Duration;

const BLOCK_FRAMES: usize = 512;

fn generate_test_audio(duration_seconds: f32, sample_rate: u32) -> SampleAudio {
    let frames = (duration_seconds * sample_rate as f32) as usize;
    let mut samples = Vec::with_capacity(frames * 2);

    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = 0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            + 0.2 * (2.0 * std::f32::consts::PI * 880.0 * t).sin();
        samples.push(sample);
        samples.push(sample * 0.5);
    }

    SampleAudio::interleaved(samples, 2, sample_rate)
}

/// A sampler with every voice busy on a looping stereo region.
fn busy_sampler(config: &EngineConfig, voices: usize) -> Sampler {
    let mut sampler = Sampler::new(config);
    let descriptor = SampleDescriptor::new(60)
        .with_key_range(KeyRange::notes(0, 127))
        .with_loop(0.1, 0.9);
    sampler.load_samples(vec![SampleRegionInput::new(
        descriptor,
        generate_test_audio(2.0, 48000),
    )]);
    sampler.build_key_map();

    for i in 0..voices {
        sampler.note_on(24 + i as u8, 100).unwrap();
    }
    sampler.render(1);
    sampler
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let envelope = EnvelopeConfig::new(0.01, 0.1, 0.8, 0.5, EnvelopeCurve::Exponential);

    let test_cases = vec![
        ("unfiltered", FilterConfig::default()),
        ("filtered", FilterConfig::new(true, 2000.0, 2.0).with_modulation(0.5, 2.0, 0.5)),
    ];

    for (name, filter) in test_cases {
        for voices in [1, 16, 64] {
            let config = EngineConfig::default()
                .with_amplitude_envelope(envelope.clone())
                .with_filter_envelope(envelope.clone())
                .with_filter(filter.clone());
            let mut sampler = busy_sampler(&config, voices);

            group.bench_with_input(BenchmarkId::new(name, voices), &voices, |b, _| {
                b.iter(|| {
                    let block = sampler.render(black_box(BLOCK_FRAMES));
                    black_box(block.left[BLOCK_FRAMES - 1])
                })
            });
        }
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = benchmark_render
);
criterion_main!(benches);
