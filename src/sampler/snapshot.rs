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
use std::sync::Arc;

use super::keymap::KeyVelocityMap;
use super::region::SampleRegion;

/// An immutable view of the loaded regions and the key map built over them.
///
/// The loader publishes a new set after every change and the engine swaps it in at the
/// start of a block. Regions are shared between consecutive sets, so publishing never
/// copies audio.
#[derive(Debug, Default)]
pub struct RegionSet {
    regions: Vec<Arc<SampleRegion>>,
    key_map: KeyVelocityMap,
    epoch: u64,
}

impl RegionSet {
    pub fn new(regions: Vec<Arc<SampleRegion>>, key_map: KeyVelocityMap, epoch: u64) -> Self {
        Self {
            regions,
            key_map,
            epoch,
        }
    }

    /// An empty, unmapped set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves a note and velocity to a region through the key map.
    #[inline]
    pub fn lookup(&self, note: u8, velocity: u8) -> Option<(usize, &SampleRegion)> {
        let index = self.key_map.lookup(note, velocity)?;
        self.regions.get(index).map(|region| (index, region.as_ref()))
    }

    #[inline]
    pub fn region(&self, index: usize) -> Option<&SampleRegion> {
        self.regions.get(index).map(Arc::as_ref)
    }

    pub fn regions(&self) -> &[Arc<SampleRegion>] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn key_map(&self) -> &KeyVelocityMap {
        &self.key_map
    }

    /// Incremented on every unload. Voices never outlive their epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
