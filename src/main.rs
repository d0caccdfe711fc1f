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
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polysampler::config::{EngineConfig, Instrument};
use polysampler::midi::read_midi_file;
use polysampler::sampler::Sampler;
use polysampler::wav::write_wav;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Renders a MIDI file through an instrument to a stereo WAV file.
    Render {
        /// The path to the instrument YAML file.
        instrument_path: PathBuf,
        /// The path to the MIDI file to play.
        midi_path: PathBuf,
        /// The path of the WAV file to write.
        output_path: PathBuf,
        /// The path to the engine config. Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Seconds of audio to render after the last MIDI event.
        #[arg(short, long, default_value_t = 2.0)]
        tail: f64,
    },
    /// Loads an instrument and prints its regions and key map.
    Inspect {
        /// The path to the instrument YAML file.
        instrument_path: PathBuf,
        /// The path to the engine config. Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            instrument_path,
            midi_path,
            output_path,
            config,
            tail,
        } => {
            let config = engine_config(config.as_deref())?;
            let mut sampler = load_instrument(&config, &instrument_path)?;

            let schedule = read_midi_file(&midi_path, config.sample_rate())?;
            let tail_frames = (tail.max(0.0) * f64::from(config.sample_rate())) as u64;
            let total_frames = usize::try_from(schedule.length_frames + tail_frames)?;
            info!(
                events = schedule.events.len(),
                total_frames,
                "Rendering"
            );

            let (left, right) = sampler.render_offline(&schedule, total_frames)?;
            write_wav(&output_path, &left, &right, config.sample_rate())?;
            println!(
                "Wrote {} ({:.2}s)",
                output_path.display(),
                total_frames as f64 / f64::from(config.sample_rate())
            );
        }
        Commands::Inspect {
            instrument_path,
            config,
        } => {
            let config = engine_config(config.as_deref())?;
            let mut sampler = load_instrument(&config, &instrument_path)?;
            let snapshot = sampler.loader().snapshot();

            println!("Regions (count: {}):", snapshot.len());
            for (index, region) in snapshot.regions().iter().enumerate() {
                let keys = match region.key_range() {
                    Some(range) => format!(
                        "notes {}-{}, velocities {}-{}",
                        range.min_note(),
                        range.max_note(),
                        range.min_vel(),
                        range.max_vel()
                    ),
                    None => "no key range".to_string(),
                };
                println!(
                    "- {}: note {} ({:.2} Hz), {} ch, {} Hz, frames {}..{}, {}{}",
                    index,
                    region.note_number(),
                    region.note_hz(),
                    region.channels(),
                    region.sample_rate(),
                    region.start(),
                    region.end(),
                    keys,
                    if region.is_looping() {
                        format!(", loop {}..{}", region.loop_start(), region.loop_end())
                    } else {
                        String::new()
                    }
                );
            }

            println!("\nKey map ({:?}):", snapshot.key_map().mode());
            for note in 0..=127u8 {
                let mapped = velocity_runs(|velocity| {
                    snapshot.lookup(note, velocity).map(|(index, _)| index)
                });
                if !mapped.is_empty() {
                    println!("- {}: {}", note, mapped.join(", "));
                }
            }
        }
    }

    Ok(())
}

fn engine_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn Error>> {
    Ok(match path {
        Some(path) => EngineConfig::deserialize(path)?,
        None => EngineConfig::default(),
    })
}

/// Reads an instrument and its samples into a new sampler, with the key map built.
fn load_instrument(config: &EngineConfig, path: &Path) -> Result<Sampler, Box<dyn Error>> {
    let instrument = Instrument::deserialize(path)?;
    let base_path = path.parent().unwrap_or_else(|| Path::new("."));
    let inputs = instrument.load_audio(base_path)?;

    let mut sampler = Sampler::new(config);
    let report = sampler.load_samples(inputs);
    for rejected in report.rejected.iter() {
        warn!(
            file = instrument.regions()[rejected.index].file(),
            error = %rejected.error,
            "Skipping region"
        );
    }
    sampler.loader().build_key_map_with_mode(instrument.key_map());
    Ok(sampler)
}

/// Describes which region each velocity of a note plays, as runs like "1-63 -> 0".
fn velocity_runs<F>(lookup: F) -> Vec<String>
where
    F: Fn(u8) -> Option<usize>,
{
    let mut runs = Vec::new();
    let mut current: Option<(u8, u8, usize)> = None;
    for velocity in 0..=127u8 {
        match (lookup(velocity), current) {
            (Some(index), Some((start, _, run_index))) if index == run_index => {
                current = Some((start, velocity, index));
            }
            (found, previous) => {
                if let Some((start, end, index)) = previous {
                    runs.push(format!("{}-{} -> {}", start, end, index));
                }
                current = found.map(|index| (velocity, velocity, index));
            }
        }
    }
    if let Some((start, end, index)) = current {
        runs.push(format!("{}-{} -> {}", start, end, index));
    }
    runs
}
