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

//! The render side of the sampler.
//!
//! [`channel`] creates the three handles that make up a sampler: the loader, the
//! controller and the engine. The engine owns the voices and is the only handle that
//! touches audio; it never blocks, allocates, locks or logs while rendering. State
//! from the other handles reaches it only through bounded channels, drained at the
//! start of each block.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::info;

use super::control::{ControlError, ControlEvent, Controller, MAX_MASTER_VOLUME};
use super::loader::{LoadReport, SampleLoader};
use super::manager::VoiceManager;
use super::region::SampleRegionInput;
use super::snapshot::RegionSet;
use crate::config::EngineConfig;
use crate::midi::MidiSchedule;

/// Pending region sets. The loader replaces an unadopted set rather than queueing.
const SNAPSHOT_QUEUE_CAPACITY: usize = 1;

/// Replaced region sets waiting to be dropped by the loader.
const RETIRE_QUEUE_CAPACITY: usize = 8;

/// Counters describing the engine's activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub active_voices: usize,
    pub voices_stolen: u64,
    pub snapshots_adopted: u64,
    pub events_applied: u64,
}

/// One rendered block, borrowed from the engine's buffers.
#[derive(Clone, Copy, Debug)]
pub struct StereoBlock<'a> {
    pub left: &'a [f32],
    pub right: &'a [f32],
}

impl StereoBlock<'_> {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Creates a connected loader, controller and engine.
pub fn channel(config: &EngineConfig) -> (SampleLoader, Controller, SamplerEngine) {
    let (snapshot_tx, snapshot_rx) = bounded(SNAPSHOT_QUEUE_CAPACITY);
    let (retired_tx, retired_rx) = bounded(RETIRE_QUEUE_CAPACITY);
    let (event_tx, event_rx) = bounded(config.event_queue_capacity().max(1));

    let loader = SampleLoader::new(
        config.max_regions(),
        snapshot_tx,
        snapshot_rx.clone(),
        retired_rx,
    );
    let controller = Controller::new(event_tx);

    let mut voices = VoiceManager::new(
        config.max_voices(),
        config.voice_settings(),
        config.retrigger(),
    );
    voices.set_loop_thru_release(config.loop_thru_release());

    let max_block_frames = config.max_block_frames().max(1);
    let engine = SamplerEngine {
        voices,
        regions: Arc::new(RegionSet::empty()),
        parked: None,
        snapshots: snapshot_rx,
        retired: retired_tx,
        events: event_rx,
        master_volume: config.master_volume().clamp(0.0, MAX_MASTER_VOLUME),
        left: vec![0.0; max_block_frames].into_boxed_slice(),
        right: vec![0.0; max_block_frames].into_boxed_slice(),
        snapshots_adopted: 0,
        events_applied: 0,
    };

    info!(
        sample_rate = config.sample_rate(),
        max_voices = engine.voices.max_voices(),
        max_block_frames,
        event_queue_capacity = config.event_queue_capacity(),
        "Sampler engine created"
    );

    (loader, controller, engine)
}

/// Renders audio. Lives on the real-time thread.
pub struct SamplerEngine {
    voices: VoiceManager,
    regions: Arc<RegionSet>,
    /// A replaced set that could not be retired yet. No newer set is adopted until it
    /// has been handed back.
    parked: Option<Arc<RegionSet>>,
    snapshots: Receiver<Arc<RegionSet>>,
    retired: Sender<Arc<RegionSet>>,
    events: Receiver<ControlEvent>,
    master_volume: f32,
    left: Box<[f32]>,
    right: Box<[f32]>,
    snapshots_adopted: u64,
    events_applied: u64,
}

impl SamplerEngine {
    /// Renders up to `max_block_frames` frames into the engine's own buffers.
    pub fn render(&mut self, frames: usize) -> StereoBlock<'_> {
        let frames = frames.min(self.left.len());
        self.sync();

        let left = &mut self.left[..frames];
        let right = &mut self.right[..frames];
        mix(&mut self.voices, &self.regions, self.master_volume, left, right);

        StereoBlock {
            left: &self.left[..frames],
            right: &self.right[..frames],
        }
    }

    /// Renders into caller buffers of any length, overwriting them. Long buffers are
    /// processed in `max_block_frames` chunks, each one a block of its own.
    pub fn render_into(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let block = self.left.len();

        for (left, right) in left[..frames]
            .chunks_mut(block)
            .zip(right[..frames].chunks_mut(block))
        {
            self.sync();
            mix(&mut self.voices, &self.regions, self.master_volume, left, right);
        }
    }

    /// Applies pending region sets and control events without rendering. Rendering
    /// does this at the start of every block.
    pub fn sync(&mut self) {
        self.adopt_snapshot();
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
    }

    fn adopt_snapshot(&mut self) {
        if let Some(parked) = self.parked.take() {
            self.retire(parked);
            if self.parked.is_some() {
                return;
            }
        }

        let Ok(next) = self.snapshots.try_recv() else {
            return;
        };
        if next.epoch() != self.regions.epoch() {
            // Voices refer to regions of the old epoch by index.
            self.voices.stop_all();
        }
        let previous = std::mem::replace(&mut self.regions, next);
        self.snapshots_adopted += 1;
        self.retire(previous);
    }

    fn retire(&mut self, set: Arc<RegionSet>) {
        match self.retired.try_send(set) {
            Ok(()) => {}
            Err(TrySendError::Full(set)) => self.parked = Some(set),
            // With the loader gone there is nowhere else to free it.
            Err(TrySendError::Disconnected(set)) => drop(set),
        }
    }

    fn apply(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::NoteOn { note, velocity } => {
                self.voices.note_on(&self.regions, note, velocity);
            }
            ControlEvent::NoteOff { note } => self.voices.note_off(note),
            ControlEvent::AllNotesOff => self.voices.all_notes_off(),
            ControlEvent::StopAll => self.voices.stop_all(),
            ControlEvent::SetLoopThruRelease(enabled) => {
                self.voices.set_loop_thru_release(enabled)
            }
            ControlEvent::SustainPedal(down) => self.voices.set_sustain_pedal(down),
            ControlEvent::PitchBend(semitones) => self.voices.set_pitch_bend(semitones),
            ControlEvent::MasterVolume(gain) => {
                if gain.is_finite() {
                    self.master_volume = gain.clamp(0.0, MAX_MASTER_VOLUME);
                }
            }
        }
        self.events_applied += 1;
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_voices: self.voices.active_count(),
            voices_stolen: self.voices.stolen_count(),
            snapshots_adopted: self.snapshots_adopted,
            events_applied: self.events_applied,
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.active_count()
    }

    pub fn max_block_frames(&self) -> usize {
        self.left.len()
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// The region set currently in use.
    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }
}

/// Clears the output, sums every voice into it and applies the master volume.
#[inline]
fn mix(
    voices: &mut VoiceManager,
    regions: &RegionSet,
    master_volume: f32,
    left: &mut [f32],
    right: &mut [f32],
) {
    left.fill(0.0);
    right.fill(0.0);
    voices.render(regions, left, right);
    if master_volume != 1.0 {
        for sample in left.iter_mut().chain(right.iter_mut()) {
            *sample *= master_volume;
        }
    }
}

impl std::fmt::Debug for SamplerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerEngine")
            .field("voices", &self.voices)
            .field("regions", &self.regions.len())
            .field("epoch", &self.regions.epoch())
            .field("max_block_frames", &self.left.len())
            .field("master_volume", &self.master_volume)
            .finish()
    }
}

/// All three handles in one place, for callers that load, control and render from a
/// single thread.
#[derive(Debug)]
pub struct Sampler {
    loader: SampleLoader,
    controller: Controller,
    engine: SamplerEngine,
}

impl Sampler {
    pub fn new(config: &EngineConfig) -> Self {
        let (loader, controller, engine) = channel(config);
        Self {
            loader,
            controller,
            engine,
        }
    }

    pub fn loader(&mut self) -> &mut SampleLoader {
        &mut self.loader
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn engine(&mut self) -> &mut SamplerEngine {
        &mut self.engine
    }

    /// Splits the sampler into its handles, for moving them onto their own threads.
    pub fn into_parts(self) -> (SampleLoader, Controller, SamplerEngine) {
        (self.loader, self.controller, self.engine)
    }

    pub fn load_samples<I>(&mut self, inputs: I) -> LoadReport
    where
        I: IntoIterator<Item = SampleRegionInput>,
    {
        self.loader.load_samples(inputs)
    }

    pub fn unload_all_samples(&mut self) {
        self.loader.unload_all_samples();
    }

    pub fn build_key_map(&mut self) {
        self.loader.build_key_map();
    }

    pub fn build_simple_key_map(&mut self) {
        self.loader.build_simple_key_map();
    }

    pub fn set_loop_thru_release(&self, enabled: bool) -> Result<(), ControlError> {
        self.controller.set_loop_thru_release(enabled)
    }

    pub fn note_on(&self, note: u8, velocity: u8) -> Result<(), ControlError> {
        self.controller.note_on(note, velocity)
    }

    pub fn note_off(&self, note: u8) -> Result<(), ControlError> {
        self.controller.note_off(note)
    }

    pub fn all_notes_off(&self) -> Result<(), ControlError> {
        self.controller.all_notes_off()
    }

    pub fn stop_all(&self) -> Result<(), ControlError> {
        self.controller.stop_all()
    }

    pub fn render(&mut self, frames: usize) -> StereoBlock<'_> {
        self.loader.collect_retired();
        self.engine.render(frames)
    }

    /// Renders a scheduled MIDI performance from the start, returning the left and right
    /// channels. Events land on the exact frame they are scheduled for.
    pub fn render_offline(
        &mut self,
        schedule: &MidiSchedule,
        total_frames: usize,
    ) -> Result<(Vec<f32>, Vec<f32>), ControlError> {
        let mut left = vec![0.0; total_frames];
        let mut right = vec![0.0; total_frames];
        let mut pending = schedule.events.iter().peekable();
        let mut position = 0usize;

        while position < total_frames {
            while let Some(scheduled) = pending.next_if(|e| e.frame <= position as u64) {
                self.send_offline(scheduled.event)?;
            }

            let end = pending
                .peek()
                .map_or(total_frames, |e| (e.frame as usize).min(total_frames));
            self.loader.collect_retired();
            self.engine
                .render_into(&mut left[position..end], &mut right[position..end]);
            position = end;
        }

        Ok((left, right))
    }

    /// Sends an event; when the queue is full, lets the engine drain it first.
    fn send_offline(&mut self, event: ControlEvent) -> Result<(), ControlError> {
        match self.controller.send(event) {
            Err(ControlError::QueueFull(event)) => {
                self.engine.sync();
                self.controller.send(event)
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvelopeConfig, RetriggerBehavior};
    use crate::midi::ScheduledEvent;
    use crate::sampler::envelope::EnvelopeCurve;
    use crate::sampler::region::{KeyRange, SampleAudio, SampleDescriptor};
    use crate::testutil::ramp_audio;

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_max_block_frames(64)
            .with_amplitude_envelope(EnvelopeConfig::new(0.0, 0.0, 1.0, 0.0, EnvelopeCurve::Linear))
    }

    fn ramp_input(descriptor: SampleDescriptor, frames: usize) -> SampleRegionInput {
        SampleRegionInput::new(descriptor, ramp_audio(frames, 44100))
    }

    fn looping(frames: usize) -> SampleRegionInput {
        ramp_input(
            SampleDescriptor::new(60)
                .with_key_range(KeyRange::notes(0, 127))
                .with_loop(0.0, 1.0),
            frames,
        )
    }

    fn loaded(config: &EngineConfig, inputs: Vec<SampleRegionInput>) -> Sampler {
        let mut sampler = Sampler::new(config);
        assert!(sampler.load_samples(inputs).is_complete());
        sampler.build_key_map();
        sampler
    }

    #[test]
    fn test_silence_before_load() {
        let mut sampler = Sampler::new(&config());
        sampler.note_on(60, 100).unwrap();
        let block = sampler.render(32);
        assert_eq!(block.len(), 32);
        assert!(block.left.iter().chain(block.right).all(|s| *s == 0.0));
    }

    #[test]
    fn test_block_capped() {
        let mut sampler = Sampler::new(&config());
        assert_eq!(sampler.render(1000).len(), 64);
        assert!(sampler.render(0).is_empty());
    }

    #[test]
    fn test_note_renders_region() {
        let mut sampler = loaded(&config(), vec![looping(1000)]);
        sampler.note_on(60, 127).unwrap();

        let block = sampler.render(16);
        for (i, sample) in block.left.iter().enumerate() {
            assert!((sample - i as f32).abs() < 1e-4);
        }
        assert_eq!(block.left, block.right);
        assert_eq!(sampler.engine().active_voice_count(), 1);
    }

    #[test]
    fn test_events_apply_in_order() {
        let mut sampler = loaded(&config(), vec![looping(1000)]);
        sampler.note_on(60, 127).unwrap();
        sampler.note_off(60).unwrap();
        sampler.render(16);
        assert_eq!(sampler.engine().active_voice_count(), 0);

        sampler.note_off(60).unwrap();
        sampler.note_on(60, 127).unwrap();
        sampler.render(16);
        assert_eq!(sampler.engine().active_voice_count(), 1);
        assert_eq!(sampler.engine().stats().events_applied, 4);
    }

    #[test]
    fn test_note_shorter_than_a_block_sounds() {
        let config = config()
            .with_amplitude_envelope(EnvelopeConfig::new(0.0, 0.0, 1.0, 0.5, EnvelopeCurve::Linear));
        let one_shot = SampleRegionInput::new(
            SampleDescriptor::new(60).with_key_range(KeyRange::notes(0, 127)),
            SampleAudio::mono(vec![0.5; 1000], 44100),
        );
        let mut sampler = loaded(&config, vec![one_shot]);

        sampler.note_on(60, 127).unwrap();
        sampler.note_off(60).unwrap();
        let block = sampler.render(64);
        let peak = block.left.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        assert!(peak > 0.4, "peak was {}", peak);
        assert_eq!(sampler.engine().active_voice_count(), 1);
    }

    #[test]
    fn test_render_into_spans_blocks() {
        let mut sampler = loaded(&config(), vec![looping(1000)]);
        sampler.note_on(60, 127).unwrap();

        let mut left = vec![9.0; 300];
        let mut right = vec![9.0; 300];
        sampler.engine().render_into(&mut left, &mut right);
        for (i, sample) in left.iter().enumerate() {
            assert!((sample - i as f32).abs() < 1e-3);
        }
    }

    #[test]
    fn test_master_volume() {
        let mut sampler = loaded(&config().with_master_volume(0.5), vec![looping(1000)]);
        sampler.note_on(60, 127).unwrap();
        let block = sampler.render(4);
        assert!((block.left[2] - 1.0).abs() < 1e-4);

        sampler.controller().set_master_volume(2.0).unwrap();
        let block = sampler.render(1);
        assert!((block.left[0] - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_unload_silences_voices() {
        let mut sampler = loaded(&config(), vec![looping(1000)]);
        sampler.note_on(60, 127).unwrap();
        sampler.render(8);
        assert_eq!(sampler.engine().active_voice_count(), 1);

        sampler.unload_all_samples();
        let block = sampler.render(8);
        assert!(block.left.iter().all(|s| *s == 0.0));
        assert_eq!(sampler.engine().active_voice_count(), 0);
        assert_eq!(sampler.engine().regions().epoch(), 1);
    }

    #[test]
    fn test_additive_load_keeps_voices() {
        let mut sampler = loaded(&config(), vec![looping(1000)]);
        sampler.note_on(60, 127).unwrap();
        sampler.render(8);

        sampler.load_samples(vec![looping(500)]);
        sampler.build_key_map();
        let first = sampler.render(8).left[0];
        assert_eq!(sampler.engine().active_voice_count(), 1);
        assert!((first - 8.0).abs() < 1e-4);
        assert_eq!(sampler.engine().regions().len(), 2);
    }

    #[test]
    fn test_loop_thru_release_via_controller() {
        let config = config()
            .with_amplitude_envelope(EnvelopeConfig::new(0.0, 0.0, 1.0, 10.0, EnvelopeCurve::Linear));
        let mut sampler = loaded(
            &config,
            vec![ramp_input(
                SampleDescriptor::new(60)
                    .with_key_range(KeyRange::notes(0, 127))
                    .with_loop(10.0, 20.0),
                40,
            )],
        );
        sampler.set_loop_thru_release(true).unwrap();
        sampler.note_on(60, 127).unwrap();
        sampler.render(30);
        sampler.note_off(60).unwrap();

        for _ in 0..50 {
            let block = sampler.render(64);
            assert!(block.left.iter().all(|s| *s < 20.0));
        }
        assert_eq!(sampler.engine().active_voice_count(), 1);

        // Without it the voice plays out to the end of the region.
        sampler.set_loop_thru_release(false).unwrap();
        sampler.render(64);
        assert_eq!(sampler.engine().active_voice_count(), 0);
    }

    #[test]
    fn test_stealing_counted() {
        let config = config().with_max_voices(2).with_retrigger(RetriggerBehavior::Cut);
        let mut sampler = loaded(&config, vec![looping(1000)]);
        for note in 60..63 {
            sampler.note_on(note, 100).unwrap();
        }
        sampler.render(1);

        let stats = sampler.engine().stats();
        assert_eq!(stats.active_voices, 2);
        assert_eq!(stats.voices_stolen, 1);
    }

    #[test]
    fn test_full_retire_queue_parks_snapshot() {
        let (mut loader, _controller, mut engine) = channel(&config());

        // Never collect, so the retire queue fills up.
        for _ in 0..RETIRE_QUEUE_CAPACITY + 1 {
            loader.publish();
            engine.render(1);
        }
        assert_eq!(
            engine.stats().snapshots_adopted,
            RETIRE_QUEUE_CAPACITY as u64 + 1
        );

        // The parked set blocks adoption.
        loader.publish();
        engine.render(1);
        assert_eq!(
            engine.stats().snapshots_adopted,
            RETIRE_QUEUE_CAPACITY as u64 + 1
        );

        assert_eq!(loader.collect_retired(), RETIRE_QUEUE_CAPACITY);
        engine.render(1);
        assert_eq!(
            engine.stats().snapshots_adopted,
            RETIRE_QUEUE_CAPACITY as u64 + 2
        );
    }

    #[test]
    fn test_render_offline_places_events() {
        let mut sampler = loaded(&config(), vec![looping(1000)]);
        let schedule = MidiSchedule {
            events: vec![
                ScheduledEvent {
                    frame: 100,
                    event: ControlEvent::NoteOn {
                        note: 60,
                        velocity: 127,
                    },
                },
                ScheduledEvent {
                    frame: 150,
                    event: ControlEvent::StopAll,
                },
            ],
            length_frames: 150,
        };

        let (left, right) = sampler.render_offline(&schedule, 200).unwrap();
        assert_eq!(left.len(), 200);
        assert!(left[..100].iter().all(|s| *s == 0.0));
        assert_eq!(left[100], 0.0);
        assert!((left[101] - 1.0).abs() < 1e-4);
        assert!((left[149] - 49.0).abs() < 1e-4);
        assert!(left[150..].iter().all(|s| *s == 0.0));
        assert_eq!(left, right);
    }

    #[test]
    fn test_render_offline_survives_full_queue() {
        let config = config().with_event_queue_capacity(2);
        let mut sampler = loaded(&config, vec![looping(1000)]);
        let events = (0..10)
            .map(|i| ScheduledEvent {
                frame: 0,
                event: ControlEvent::NoteOn {
                    note: 60 + i,
                    velocity: 100,
                },
            })
            .collect();
        let schedule = MidiSchedule {
            events,
            length_frames: 0,
        };

        sampler.render_offline(&schedule, 16).unwrap();
        assert_eq!(sampler.engine().active_voice_count(), 10);
    }
}
