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
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info};

/// Files in a source directory are only loaded if their name ends with this. Case-sensitive.
const WAVEFORM_EXTENSION: &str = ".wav";

/// The source of waveforms couldn't be read or held nothing playable.
#[derive(Debug, thiserror::Error)]
pub enum NotFoundError {
    #[error("unable to read {path}: {source}")]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("no .wav files found in {path}")]
    NoWaveforms { path: PathBuf },
}

/// A named PCM payload, forwarded to the sink byte for byte.
pub struct Waveform {
    /// The name of the waveform, usually its file name.
    name: String,
    /// The raw bytes.
    bytes: Vec<u8>,
}

impl Waveform {
    pub fn new(name: &str, bytes: Vec<u8>) -> Waveform {
        Waveform {
            name: name.to_string(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reads a waveform from disk, naming it after the file.
    fn read(path: &Path) -> Result<Waveform, NotFoundError> {
        let bytes = fs::read(path).map_err(|source| NotFoundError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        info!(waveform = name, bytes = bytes.len(), "Loaded waveform.");
        Ok(Waveform { name, bytes })
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.bytes.len())
    }
}

/// How a store was loaded, which decides how triggers pick a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One fixed file. Every trigger plays it.
    Single,
    /// A directory of waveforms. Every trigger picks one at random.
    Directory,
}

/// All waveforms the service can play. Never empty, never changes after loading.
pub struct WaveformStore {
    mode: Mode,
    waveforms: Vec<Arc<Waveform>>,
}

impl WaveformStore {
    /// Creates a store from waveforms already in memory.
    pub fn new(mode: Mode, waveforms: Vec<Waveform>) -> Result<WaveformStore, NotFoundError> {
        if waveforms.is_empty() {
            return Err(NotFoundError::NoWaveforms {
                path: PathBuf::new(),
            });
        }

        Ok(WaveformStore {
            mode,
            waveforms: waveforms.into_iter().map(Arc::new).collect(),
        })
    }

    /// Loads waveforms from the given source. A file is loaded on its own, a directory has each
    /// of its immediate .wav entries loaded in directory order.
    pub fn load(source: &Path) -> Result<WaveformStore, NotFoundError> {
        let metadata = fs::metadata(source).map_err(|source_err| NotFoundError::Unreadable {
            path: source.to_path_buf(),
            source: source_err,
        })?;

        if metadata.is_dir() {
            WaveformStore::load_directory(source)
        } else {
            Ok(WaveformStore {
                mode: Mode::Single,
                waveforms: vec![Arc::new(Waveform::read(source)?)],
            })
        }
    }

    fn load_directory(path: &Path) -> Result<WaveformStore, NotFoundError> {
        let unreadable = |source: io::Error| NotFoundError::Unreadable {
            path: path.to_path_buf(),
            source,
        };

        let mut waveforms: Vec<Arc<Waveform>> = Vec::new();
        for entry in fs::read_dir(path).map_err(unreadable)? {
            let entry_path = entry.map_err(unreadable)?.path();

            let is_waveform = entry_path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(WAVEFORM_EXTENSION));
            if !is_waveform || !entry_path.is_file() {
                debug!(path = entry_path.display().to_string(), "Skipping entry.");
                continue;
            }

            waveforms.push(Arc::new(Waveform::read(&entry_path)?));
        }

        if waveforms.is_empty() {
            return Err(NotFoundError::NoWaveforms {
                path: path.to_path_buf(),
            });
        }

        Ok(WaveformStore {
            mode: Mode::Directory,
            waveforms,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.waveforms.len()
    }

    /// Always false, stores can't be empty. Present for the len/is_empty pairing.
    pub fn is_empty(&self) -> bool {
        self.waveforms.is_empty()
    }

    pub fn waveforms(&self) -> &[Arc<Waveform>] {
        &self.waveforms
    }

    /// The first waveform. Construction guarantees there is one.
    pub fn first(&self) -> &Arc<Waveform> {
        &self.waveforms[0]
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Waveform>> {
        self.waveforms.get(index)
    }

    /// Returns the waveforms sorted by name, for stable listings.
    pub fn sorted_list(&self) -> Vec<Arc<Waveform>> {
        let mut sorted = self.waveforms.clone();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }
}
