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

//! Lookup tables from MIDI note (and velocity) to a loaded region.
//!
//! Tables are built wholesale on the loader thread. Lookups are a single index into a
//! flat table so they are safe to perform from the render thread.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

use super::region::SampleRegion;

/// Number of addressable MIDI notes.
pub const NOTE_COUNT: usize = 128;

/// Number of addressable MIDI velocities.
pub const VELOCITY_COUNT: usize = 128;

/// Which build procedure produced (or should produce) a key map.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyMapMode {
    /// Note and velocity ranges, first match wins.
    #[default]
    Full,
    /// Nearest natural note, velocity ignored.
    Simple,
}

/// Maps (note, velocity) to an index into the loaded region list.
#[derive(Clone, Debug, Default)]
pub enum KeyVelocityMap {
    /// Nothing built yet. Every lookup misses.
    #[default]
    Unbuilt,
    /// Dense note × velocity table.
    Full(Box<[Option<u32>]>),
    /// One entry per note.
    Simple(Box<[Option<u32>]>),
}

impl KeyVelocityMap {
    /// Builds the dense table. For each pair the first region whose key range contains
    /// it wins. Regions without a key range never match.
    pub fn build_full<R: Borrow<SampleRegion>>(regions: &[R]) -> Self {
        let mut table = vec![None; NOTE_COUNT * VELOCITY_COUNT].into_boxed_slice();

        for note in 0..NOTE_COUNT {
            for velocity in 0..VELOCITY_COUNT {
                table[note * VELOCITY_COUNT + velocity] = regions
                    .iter()
                    .position(|region| {
                        region
                            .borrow()
                            .key_range()
                            .is_some_and(|range| range.contains(note as u8, velocity as u8))
                    })
                    .map(|index| index as u32);
            }
        }

        KeyVelocityMap::Full(table)
    }

    /// Builds the nearest-note table. Ties go to the earlier-loaded region.
    pub fn build_simple<R: Borrow<SampleRegion>>(regions: &[R]) -> Self {
        let mut table = vec![None; NOTE_COUNT].into_boxed_slice();

        for (note, entry) in table.iter_mut().enumerate() {
            let mut best: Option<(usize, u32)> = None;
            for (index, region) in regions.iter().enumerate() {
                let distance = (region.borrow().note_number() as i32 - note as i32).unsigned_abs();
                // Strictly closer only, so the first region at a given distance stays.
                if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                    best = Some((index, distance));
                }
            }
            *entry = best.map(|(index, _)| index as u32);
        }

        KeyVelocityMap::Simple(table)
    }

    /// Builds the table for the given mode.
    pub fn build<R: Borrow<SampleRegion>>(mode: KeyMapMode, regions: &[R]) -> Self {
        match mode {
            KeyMapMode::Full => Self::build_full(regions),
            KeyMapMode::Simple => Self::build_simple(regions),
        }
    }

    /// Looks up the region index for a note and velocity.
    #[inline]
    pub fn lookup(&self, note: u8, velocity: u8) -> Option<usize> {
        let note = note as usize;
        let velocity = velocity as usize;
        if note >= NOTE_COUNT || velocity >= VELOCITY_COUNT {
            return None;
        }

        match self {
            KeyVelocityMap::Unbuilt => None,
            KeyVelocityMap::Full(table) => table[note * VELOCITY_COUNT + velocity],
            KeyVelocityMap::Simple(table) => table[note],
        }
        .map(|index| index as usize)
    }

    /// Returns the build mode, or None if the map has not been built.
    pub fn mode(&self) -> Option<KeyMapMode> {
        match self {
            KeyVelocityMap::Unbuilt => None,
            KeyVelocityMap::Full(_) => Some(KeyMapMode::Full),
            KeyVelocityMap::Simple(_) => Some(KeyMapMode::Simple),
        }
    }

    pub fn is_built(&self) -> bool {
        !matches!(self, KeyVelocityMap::Unbuilt)
    }

    /// Counts the notes that resolve to a region at any velocity.
    pub fn mapped_note_count(&self) -> usize {
        (0..NOTE_COUNT as u8)
            .filter(|&note| (0..VELOCITY_COUNT as u8).any(|vel| self.lookup(note, vel).is_some()))
            .count()
    }
}
