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

//! Polyphonic sample playback.
//!
//! This module provides:
//! - Validated sample regions and note/velocity key maps
//! - A fixed pool of voices with envelopes, an optional filter and voice stealing
//! - A loader, a controller and a real-time engine that share state through bounded
//!   channels only

mod control;
mod engine;
mod envelope;
mod filter;
mod keymap;
mod loader;
mod manager;
mod region;
mod snapshot;
mod voice;

pub use control::{ControlError, ControlEvent, Controller, MAX_MASTER_VOLUME};
pub use engine::{channel, EngineStats, Sampler, SamplerEngine, StereoBlock};
pub use envelope::{EnvelopeCurve, EnvelopeParameters, EnvelopeStage};
pub use keymap::{KeyMapMode, KeyVelocityMap};
pub use loader::{LoadReport, RejectedRegion, SampleLoader};
pub use manager::{NoteOnOutcome, VoiceManager, MAX_VOICES};
pub use region::{
    note_to_hz, ChannelLayout, KeyRange, RegionError, SampleAudio, SampleDescriptor, SampleRegion,
    SampleRegionInput,
};
pub use snapshot::RegionSet;
pub use voice::{FilterSettings, VoiceSettings};
