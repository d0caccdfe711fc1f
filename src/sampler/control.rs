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

//! Control events and the handle used to send them to the render thread.

use crossbeam_channel::{Sender, TrySendError};
use thiserror::Error;
use tracing::debug;

use super::manager::MAX_PITCH_BEND_SEMITONES;

/// Highest master volume accepted.
pub const MAX_MASTER_VOLUME: f32 = 4.0;

/// A request applied by the engine at the start of the next block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    /// Release every sounding voice.
    AllNotesOff,
    /// Silence every voice immediately.
    StopAll,
    SetLoopThruRelease(bool),
    SustainPedal(bool),
    /// Global pitch offset in semitones.
    PitchBend(f32),
    MasterVolume(f32),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("control queue is full, dropped {0:?}")]
    QueueFull(ControlEvent),

    #[error("sampler engine is no longer running")]
    Disconnected,
}

/// Sends control events to the engine. Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct Controller {
    events: Sender<ControlEvent>,
}

impl Controller {
    pub(crate) fn new(events: Sender<ControlEvent>) -> Self {
        Self { events }
    }

    /// Queues an event without blocking.
    pub fn send(&self, event: ControlEvent) -> Result<(), ControlError> {
        self.events.try_send(event).map_err(|e| match e {
            TrySendError::Full(event) => ControlError::QueueFull(event),
            TrySendError::Disconnected(_) => ControlError::Disconnected,
        })
    }

    /// A velocity of zero is a note-off.
    pub fn note_on(&self, note: u8, velocity: u8) -> Result<(), ControlError> {
        if velocity == 0 {
            return self.note_off(note);
        }
        self.send(ControlEvent::NoteOn { note, velocity })
    }

    pub fn note_off(&self, note: u8) -> Result<(), ControlError> {
        self.send(ControlEvent::NoteOff { note })
    }

    pub fn all_notes_off(&self) -> Result<(), ControlError> {
        self.send(ControlEvent::AllNotesOff)
    }

    pub fn stop_all(&self) -> Result<(), ControlError> {
        self.send(ControlEvent::StopAll)
    }

    /// When enabled, looping regions keep looping through the release stage.
    pub fn set_loop_thru_release(&self, enabled: bool) -> Result<(), ControlError> {
        self.send(ControlEvent::SetLoopThruRelease(enabled))
    }

    pub fn sustain_pedal(&self, down: bool) -> Result<(), ControlError> {
        self.send(ControlEvent::SustainPedal(down))
    }

    /// Bends every voice by the given number of semitones.
    pub fn pitch_bend(&self, semitones: f32) -> Result<(), ControlError> {
        self.send(ControlEvent::PitchBend(
            semitones.clamp(-MAX_PITCH_BEND_SEMITONES, MAX_PITCH_BEND_SEMITONES),
        ))
    }

    pub fn set_master_volume(&self, gain: f32) -> Result<(), ControlError> {
        self.send(ControlEvent::MasterVolume(gain.clamp(0.0, MAX_MASTER_VOLUME)))
    }

    /// Parses a raw MIDI message and queues the matching event. Messages that are not
    /// understood are ignored.
    pub fn process_midi_message(&self, raw_event: &[u8]) -> Result<(), ControlError> {
        match crate::midi::parse_live_event(raw_event) {
            Ok(Some(event)) => self.send(event),
            Ok(None) => Ok(()),
            Err(e) => {
                debug!(error = ?e, "Failed to parse MIDI event");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("queued", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::{bounded, Receiver};

    use super::*;

    fn controller(capacity: usize) -> (Controller, Receiver<ControlEvent>) {
        let (tx, rx) = bounded(capacity);
        (Controller::new(tx), rx)
    }

    #[test]
    fn test_zero_velocity_is_note_off() {
        let (controller, events) = controller(4);
        controller.note_on(60, 0).unwrap();
        controller.note_on(61, 1).unwrap();

        assert_eq!(events.try_recv(), Ok(ControlEvent::NoteOff { note: 60 }));
        assert_eq!(
            events.try_recv(),
            Ok(ControlEvent::NoteOn {
                note: 61,
                velocity: 1
            })
        );
    }

    #[test]
    fn test_full_queue_drops_event() {
        let (controller, events) = controller(1);
        controller.all_notes_off().unwrap();
        assert_eq!(
            controller.stop_all(),
            Err(ControlError::QueueFull(ControlEvent::StopAll))
        );
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_disconnected() {
        let (controller, events) = controller(1);
        drop(events);
        assert_eq!(controller.note_off(60), Err(ControlError::Disconnected));
    }

    #[test]
    fn test_values_clamped() {
        let (controller, events) = controller(4);
        controller.pitch_bend(100.0).unwrap();
        controller.set_master_volume(-1.0).unwrap();
        controller.set_master_volume(10.0).unwrap();

        assert_eq!(events.try_recv(), Ok(ControlEvent::PitchBend(24.0)));
        assert_eq!(events.try_recv(), Ok(ControlEvent::MasterVolume(0.0)));
        assert_eq!(events.try_recv(), Ok(ControlEvent::MasterVolume(MAX_MASTER_VOLUME)));
    }

    #[test]
    fn test_process_midi_message() {
        let (controller, events) = controller(8);
        controller.process_midi_message(&[0x90, 60, 100]).unwrap();
        controller.process_midi_message(&[0x91, 60, 0]).unwrap();
        controller.process_midi_message(&[0xB0, 64, 127]).unwrap();
        // Program change and garbage are ignored.
        controller.process_midi_message(&[0xC0, 5]).unwrap();
        controller.process_midi_message(&[0x00]).unwrap();

        assert_eq!(
            events.try_recv(),
            Ok(ControlEvent::NoteOn {
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(events.try_recv(), Ok(ControlEvent::NoteOff { note: 60 }));
        assert_eq!(events.try_recv(), Ok(ControlEvent::SustainPedal(true)));
        assert!(events.try_recv().is_err());
    }
}
