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
use std::{fmt, sync::Arc};

use tracing::info;

pub mod cpal;
pub mod error;
pub mod format;
pub mod mock;

pub use error::{DeviceError, StreamingError};
pub use format::{Channels, SinkFormat, BYTES_PER_SAMPLE};

/// An exclusively owned audio output that accepts PCM bytes in the order they should be heard.
pub trait Sink: fmt::Display + Send + Sync {
    /// Writes the given bytes to the device, blocking while the device applies backpressure.
    /// Returns the number of bytes the device accepted, which may be fewer than requested.
    fn write(&self, bytes: &[u8]) -> Result<usize, DeviceError>;

    /// Releases the device. Any write in flight is interrupted and all later writes fail.
    fn close(&self);

    /// The format the sink was opened with.
    fn format(&self) -> SinkFormat;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, DeviceError> {
    cpal::Sink::list()
}

/// Opens the sink with the given device name. Names starting with "mock" open a mock sink,
/// "default" opens the host's default output device.
pub fn open(device: &str, format: SinkFormat) -> Result<Arc<dyn Sink>, DeviceError> {
    let sink: Arc<dyn Sink> = if device.starts_with("mock") {
        Arc::new(mock::Sink::open(device, format))
    } else {
        Arc::new(cpal::Sink::open(device, format)?)
    };

    info!(sink = sink.to_string(), format = format.to_string(), "Opened sink.");
    Ok(sink)
}
