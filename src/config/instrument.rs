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
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::ConfigError;
use crate::sampler::{KeyMapMode, SampleAudio, SampleDescriptor, SampleRegionInput};
use crate::wav::{read_wav, WavError};

/// A YAML representation of an instrument: a set of sample regions and the key map
/// used to reach them.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Instrument {
    /// How notes are mapped to regions.
    #[serde(default)]
    key_map: KeyMapMode,

    regions: Vec<InstrumentRegion>,
}

/// One region of an instrument.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct InstrumentRegion {
    /// The WAV file, relative to the instrument file unless absolute.
    file: String,

    #[serde(flatten)]
    descriptor: SampleDescriptor,
}

impl InstrumentRegion {
    pub fn new(file: String, descriptor: SampleDescriptor) -> Self {
        Self { file, descriptor }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn descriptor(&self) -> &SampleDescriptor {
        &self.descriptor
    }

    /// Resolves the file against the instrument's directory.
    pub fn path(&self, base_path: &Path) -> PathBuf {
        if Path::new(&self.file).is_absolute() {
            PathBuf::from(&self.file)
        } else {
            base_path.join(&self.file)
        }
    }
}

impl Instrument {
    /// Parse an instrument from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Instrument, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Instrument>()?)
    }

    pub fn new(key_map: KeyMapMode, regions: Vec<InstrumentRegion>) -> Self {
        Self { key_map, regions }
    }

    pub fn key_map(&self) -> KeyMapMode {
        self.key_map
    }

    pub fn regions(&self) -> &[InstrumentRegion] {
        &self.regions
    }

    /// Decodes every region's WAV file. A file shared by several regions is read once.
    pub fn load_audio(&self, base_path: &Path) -> Result<Vec<SampleRegionInput>, WavError> {
        let mut cache: HashMap<PathBuf, SampleAudio> = HashMap::new();
        let mut inputs = Vec::with_capacity(self.regions.len());

        for region in &self.regions {
            let path = region.path(base_path);
            let audio = match cache.get(&path) {
                Some(audio) => {
                    debug!(path = ?path, "Using cached sample");
                    audio.clone()
                }
                None => {
                    let audio = read_wav(&path)?;
                    info!(
                        path = ?path,
                        channels = audio.channels(),
                        sample_rate = audio.sample_rate(),
                        frames = audio.frames(),
                        "Sample read"
                    );
                    cache.insert(path, audio.clone());
                    audio
                }
            };
            inputs.push(SampleRegionInput::new(region.descriptor.clone(), audio));
        }

        Ok(inputs)
    }
}
