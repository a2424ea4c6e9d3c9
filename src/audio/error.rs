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

/// Errors raised by an output device, either while opening it or while writing to it.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no output device found with name {0}")]
    NotFound(String),

    #[error("no default output device available")]
    NoDefault,

    #[error("unable to query output device: {0}")]
    Query(String),

    #[error("unsupported output sample format {0}")]
    UnsupportedFormat(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output thread exited before the stream was ready")]
    OutputThread,

    #[error("sink is closed")]
    Closed,

    #[error("device write failed: {0}")]
    Write(String),
}

/// A failure while streaming one waveform into the sink. Local to a single playback attempt.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    #[error("short write: expected {expected} bytes, device accepted {written}")]
    ShortWrite { expected: usize, written: usize },

    #[error(transparent)]
    Device(#[from] DeviceError),
}
