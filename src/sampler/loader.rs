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

//! Sample loading for the render engine.
//!
//! The loader owns the region collection and the key map. Every change is published to
//! the engine as a fresh, immutable region set. Sets the engine has replaced come back
//! over the retire channel and are dropped here, off the render thread.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::keymap::{KeyMapMode, KeyVelocityMap};
use super::region::{RegionError, SampleRegion, SampleRegionInput};
use super::snapshot::RegionSet;

/// An input the loader refused.
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedRegion {
    /// Position of the input in the batch.
    pub index: usize,
    pub error: RegionError,
}

/// The outcome of a batch load.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    /// Number of regions added.
    pub loaded: usize,
    pub rejected: Vec<RejectedRegion>,
}

impl LoadReport {
    /// True when every input was loaded.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Manages the loaded regions and publishes them to the engine.
pub struct SampleLoader {
    regions: Vec<Arc<SampleRegion>>,
    key_map: KeyVelocityMap,
    /// Incremented by every unload.
    epoch: u64,
    max_regions: usize,
    snapshots: Sender<Arc<RegionSet>>,
    /// A second handle on the engine's end of the snapshot channel, used to discard
    /// sets the engine has not picked up yet.
    pending: Receiver<Arc<RegionSet>>,
    retired: Receiver<Arc<RegionSet>>,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub(crate) fn new(
        max_regions: usize,
        snapshots: Sender<Arc<RegionSet>>,
        pending: Receiver<Arc<RegionSet>>,
        retired: Receiver<Arc<RegionSet>>,
    ) -> Self {
        Self {
            regions: Vec::new(),
            key_map: KeyVelocityMap::Unbuilt,
            epoch: 0,
            max_regions,
            snapshots,
            pending,
            retired,
        }
    }

    /// Validates and adds regions. Loading is additive: regions already loaded stay, and
    /// because lookups take the first match, they shadow later regions with the same
    /// keys. Invalid inputs are skipped and reported; the rest of the batch still loads.
    pub fn load_samples<I>(&mut self, inputs: I) -> LoadReport
    where
        I: IntoIterator<Item = SampleRegionInput>,
    {
        self.collect_retired();

        let mut report = LoadReport::default();
        for (index, input) in inputs.into_iter().enumerate() {
            match self.load_one(input) {
                Ok(()) => report.loaded += 1,
                Err(error) => {
                    warn!(index, error = %error, "Rejected sample region");
                    report.rejected.push(RejectedRegion { index, error });
                }
            }
        }

        info!(
            loaded = report.loaded,
            rejected = report.rejected.len(),
            total = self.regions.len(),
            memory_kb = self.total_memory_usage() / 1024,
            "Sample regions loaded"
        );

        self.publish();
        report
    }

    fn load_one(&mut self, input: SampleRegionInput) -> Result<(), RegionError> {
        if self.regions.len() >= self.max_regions {
            return Err(RegionError::RegionLimitReached(self.max_regions));
        }

        let region = SampleRegion::new(input)?;
        let index = self.regions.len();

        if let Some(range) = region.key_range() {
            for (earlier, existing) in self.regions.iter().enumerate() {
                if existing
                    .key_range()
                    .is_some_and(|existing| existing.overlaps(&range))
                {
                    warn!(
                        index,
                        earlier,
                        min_note = range.min_note(),
                        max_note = range.max_note(),
                        "Key range overlaps an earlier region, which takes precedence"
                    );
                }
            }
        }

        debug!(
            index,
            note = region.note_number(),
            channels = region.channels(),
            sample_rate = region.sample_rate(),
            frames = region.frames(),
            looping = region.is_looping(),
            "Region loaded"
        );

        self.regions.push(Arc::new(region));
        Ok(())
    }

    /// Drops every region, resets the key map and invalidates sounding voices.
    pub fn unload_all_samples(&mut self) {
        self.collect_retired();

        let count = self.regions.len();
        self.regions.clear();
        self.key_map = KeyVelocityMap::Unbuilt;
        self.epoch += 1;
        info!(count, epoch = self.epoch, "Unloaded all sample regions");

        self.publish();
    }

    /// Rebuilds the note and velocity map from the loaded regions.
    pub fn build_key_map(&mut self) {
        self.build_key_map_with_mode(KeyMapMode::Full);
    }

    /// Rebuilds the nearest-note map from the loaded regions.
    pub fn build_simple_key_map(&mut self) {
        self.build_key_map_with_mode(KeyMapMode::Simple);
    }

    pub fn build_key_map_with_mode(&mut self, mode: KeyMapMode) {
        self.collect_retired();

        self.key_map = KeyVelocityMap::build(mode, &self.regions);
        info!(
            mode = ?mode,
            regions = self.regions.len(),
            mapped_notes = self.key_map.mapped_note_count(),
            "Built key map"
        );

        self.publish();
    }

    /// A region set reflecting the loader's current state.
    pub fn snapshot(&self) -> RegionSet {
        RegionSet::new(self.regions.clone(), self.key_map.clone(), self.epoch)
    }

    /// Sends the current state to the engine, replacing any set it has not adopted yet.
    pub fn publish(&mut self) {
        let mut discarded = 0;
        while self.pending.try_recv().is_ok() {
            discarded += 1;
        }

        match self.snapshots.try_send(Arc::new(self.snapshot())) {
            Ok(()) => debug!(
                epoch = self.epoch,
                regions = self.regions.len(),
                discarded,
                "Published region set"
            ),
            Err(TrySendError::Full(_)) => {
                warn!("Region set queue is full, engine will keep its current set")
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Engine is gone, region set not published")
            }
        }
    }

    /// Frees region sets the engine no longer uses. Returns how many were collected.
    pub fn collect_retired(&self) -> usize {
        let collected = self.retired.try_iter().count();
        if collected > 0 {
            debug!(collected, "Collected retired region sets");
        }
        collected
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn regions(&self) -> &[Arc<SampleRegion>] {
        &self.regions
    }

    pub fn key_map(&self) -> &KeyVelocityMap {
        &self.key_map
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the total memory used by loaded audio.
    pub fn total_memory_usage(&self) -> usize {
        self.regions.iter().map(|region| region.memory_size()).sum()
    }
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("regions", &self.regions.len())
            .field("key_map", &self.key_map.mode())
            .field("epoch", &self.epoch)
            .finish()
    }
}
