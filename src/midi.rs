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

//! Translation of MIDI messages and Standard MIDI Files into control events.

use std::fs;
use std::path::Path;

use midly::live::LiveEvent;
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use thiserror::Error;
use tracing::debug;

use crate::sampler::ControlEvent;

/// Tempo assumed until the file sets one, in microseconds per beat (120 BPM).
pub const DEFAULT_TEMPO_US: u32 = 500_000;

/// Pitch wheel range in semitones either way.
pub const PITCH_BEND_RANGE_SEMITONES: f32 = 2.0;

const SUSTAIN_PEDAL: u8 = 64;
const ALL_SOUND_OFF: u8 = 120;
const ALL_NOTES_OFF: u8 = 123;

#[derive(Error, Debug)]
pub enum MidiFileError {
    #[error("failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),
}

/// Maps a channel message to the engine event it drives. Channels are ignored.
pub fn control_event(message: &MidiMessage) -> Option<ControlEvent> {
    match *message {
        MidiMessage::NoteOn { key, vel } if u8::from(vel) == 0 => Some(ControlEvent::NoteOff {
            note: u8::from(key),
        }),
        MidiMessage::NoteOn { key, vel } => Some(ControlEvent::NoteOn {
            note: u8::from(key),
            velocity: u8::from(vel),
        }),
        MidiMessage::NoteOff { key, .. } => Some(ControlEvent::NoteOff {
            note: u8::from(key),
        }),
        MidiMessage::Controller { controller, value } => match u8::from(controller) {
            SUSTAIN_PEDAL => Some(ControlEvent::SustainPedal(u8::from(value) >= 64)),
            ALL_SOUND_OFF => Some(ControlEvent::StopAll),
            ALL_NOTES_OFF => Some(ControlEvent::AllNotesOff),
            _ => None,
        },
        MidiMessage::PitchBend { bend } => Some(ControlEvent::PitchBend(
            bend.as_int() as f32 / 8192.0 * PITCH_BEND_RANGE_SEMITONES,
        )),
        _ => None,
    }
}

/// Parses a raw live message. Returns None for messages the engine has no use for.
pub fn parse_live_event(raw_event: &[u8]) -> Result<Option<ControlEvent>, midly::Error> {
    Ok(match LiveEvent::parse(raw_event)? {
        LiveEvent::Midi { message, .. } => control_event(&message),
        _ => None,
    })
}

/// A control event at a frame offset from the start of the file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub frame: u64,
    pub event: ControlEvent,
}

/// Every engine event in a MIDI file, in playback order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MidiSchedule {
    pub events: Vec<ScheduledEvent>,
    /// Frame of the last event of any kind, including end of track.
    pub length_frames: u64,
}

/// Reads a MIDI file and schedules its events at the given sample rate.
pub fn read_midi_file(path: &Path, sample_rate: u32) -> Result<MidiSchedule, MidiFileError> {
    let buf: Vec<u8> = fs::read(path)?;
    let schedule = schedule_midi_file(&buf, sample_rate)?;
    debug!(
        path = ?path,
        events = schedule.events.len(),
        length_frames = schedule.length_frames,
        "Scheduled MIDI file"
    );
    Ok(schedule)
}

/// Parses a Standard MIDI File and converts every track's events to frame offsets.
/// Parallel tracks are merged by time; sequential tracks play one after another.
pub fn schedule_midi_file(bytes: &[u8], sample_rate: u32) -> Result<MidiSchedule, MidiFileError> {
    let smf = Smf::parse(bytes)?;

    let mut timed = Vec::new();
    let mut track_offset = 0u64;
    for track in smf.tracks.iter() {
        let mut tick = track_offset;
        for event in track.iter() {
            tick += u64::from(event.delta.as_int());
            timed.push((tick, event.kind));
        }
        if smf.header.format == Format::Sequential {
            track_offset = tick;
        }
    }
    // Stable, so events at the same tick keep track order.
    timed.sort_by_key(|(tick, _)| *tick);

    let mut clock = TickClock::new(smf.header.timing);
    let sample_rate = f64::from(sample_rate);
    let mut schedule = MidiSchedule::default();
    let mut last_tick = 0u64;
    let mut seconds = 0.0f64;

    for (tick, kind) in timed {
        seconds += (tick - last_tick) as f64 * clock.seconds_per_tick();
        last_tick = tick;
        let frame = (seconds * sample_rate).round() as u64;
        schedule.length_frames = frame;

        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => clock.set_tempo(tempo.as_int()),
            TrackEventKind::Midi { message, .. } => {
                if let Some(event) = control_event(&message) {
                    schedule.events.push(ScheduledEvent { frame, event });
                }
            }
            _ => {}
        }
    }

    Ok(schedule)
}

/// Converts ticks to seconds, following tempo changes for metrical timing.
struct TickClock {
    timing: Timing,
    tempo_us: u32,
}

impl TickClock {
    fn new(timing: Timing) -> Self {
        Self {
            timing,
            tempo_us: DEFAULT_TEMPO_US,
        }
    }

    fn set_tempo(&mut self, tempo_us: u32) {
        if tempo_us > 0 {
            self.tempo_us = tempo_us;
        }
    }

    fn seconds_per_tick(&self) -> f64 {
        match self.timing {
            Timing::Metrical(ticks_per_beat) => {
                let ticks_per_beat = f64::from(ticks_per_beat.as_int().max(1));
                f64::from(self.tempo_us) / 1_000_000.0 / ticks_per_beat
            }
            Timing::Timecode(fps, subframes) => {
                1.0 / (f64::from(fps.as_f32()) * f64::from(subframes.max(1)))
            }
        }
    }
}
