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

//! PCM WAV reading and writing.
//!
//! WAV files are decoded here, outside the engine, and handed to the loader as plain
//! `f32` audio.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

use crate::sampler::SampleAudio;

#[derive(Error, Debug)]
pub enum WavError {
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),

    #[error("unsupported WAV format: {0}")]
    Unsupported(String),
}

/// Reads a mono or stereo WAV file into interleaved `f32` audio scaled to [-1, 1].
pub fn read_wav(path: &Path) -> Result<SampleAudio, WavError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.channels > 2 {
        return Err(WavError::Unsupported(format!(
            "{} channels in {}",
            spec.channels,
            path.display()
        )));
    }

    let data = match spec.sample_format {
        SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(WavError::Unsupported(format!(
                    "{}-bit float in {}",
                    spec.bits_per_sample,
                    path.display()
                )));
            }
            reader.samples::<f32>().collect::<Result<Vec<f32>, _>>()?
        }
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(WavError::Unsupported(format!(
                    "{}-bit integer in {}",
                    spec.bits_per_sample,
                    path.display()
                )));
            }
            // i64 so that 32-bit samples don't overflow the shift.
            let scale_factor = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|sample| sample as f32 * scale_factor))
                .collect::<Result<Vec<f32>, _>>()?
        }
    };

    Ok(SampleAudio::interleaved(data, spec.channels, spec.sample_rate))
}

/// Writes a stereo 32-bit float WAV file. The shorter channel sets the length.
pub fn write_wav(path: &Path, left: &[f32], right: &[f32], sample_rate: u32) -> Result<(), WavError> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for (l, r) in left.iter().zip(right.iter()) {
        writer.write_sample(*l)?;
        writer.write_sample(*r)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let left = vec![0.0, 0.5, -0.5];
        let right = vec![1.0, -1.0, 0.25, 0.75];
        write_wav(&path, &left, &right, 48000).unwrap();

        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 3);
        assert_eq!(audio.sample_rate(), 48000);
    }

    #[test]
    fn test_read_int_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [0i16, 16384, -32768] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.frames(), 3);

        let region = crate::sampler::SampleRegion::new(crate::sampler::SampleRegionInput::new(
            crate::sampler::SampleDescriptor::new(60),
            audio,
        ))
        .unwrap();
        assert_eq!(region.frame(0), (0.0, 0.0));
        assert_eq!(region.frame(1), (0.5, 0.5));
        assert_eq!(region.frame(2), (-1.0, -1.0));
    }

    #[test]
    fn test_too_many_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.wav");
        let spec = WavSpec {
            channels: 4,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(0.0f32).unwrap();
        }
        writer.finalize().unwrap();

        assert!(matches!(read_wav(&path), Err(WavError::Unsupported(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_wav(Path::new("/nonexistent/sample.wav")),
            Err(WavError::Hound(_))
        ));
    }
}
