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
use std::fmt;

use serde::Deserialize;

use crate::config::ConfigError;

/// Every sample written to a sink is a signed 16-bit little-endian integer.
pub const BYTES_PER_SAMPLE: usize = 2;

/// The channel layout of the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    /// The number of interleaved channels in a frame.
    pub fn count(self) -> u16 {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channels::Mono => "mono",
            Channels::Stereo => "stereo",
        }
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fixed format a sink is opened with. Never changes after open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Mono or stereo.
    pub channels: Channels,
}

impl SinkFormat {
    /// Creates a new sink format. The sample rate must be non-zero.
    pub fn new(sample_rate: u32, channels: Channels) -> Result<SinkFormat, ConfigError> {
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }

        Ok(SinkFormat {
            sample_rate,
            channels,
        })
    }

    /// Bytes in one interleaved frame.
    pub fn bytes_per_frame(&self) -> usize {
        BYTES_PER_SAMPLE * self.channels.count() as usize
    }

    /// Bytes consumed by the device per second of playback.
    pub fn byte_rate(&self) -> usize {
        self.bytes_per_frame() * self.sample_rate as usize
    }
}

impl fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {} {}-bit",
            self.sample_rate,
            self.channels,
            BYTES_PER_SAMPLE * 8
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_format_new() {
        let format = SinkFormat::new(48000, Channels::Mono).unwrap();
        assert_eq!(format.bytes_per_frame(), 2);
        assert_eq!(format.byte_rate(), 96000);

        let format = SinkFormat::new(44100, Channels::Stereo).unwrap();
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.byte_rate(), 176400);
    }

    #[test]
    fn test_sink_format_zero_sample_rate() {
        assert!(matches!(
            SinkFormat::new(0, Channels::Stereo),
            Err(ConfigError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn test_sink_format_display() {
        let format = SinkFormat::new(48000, Channels::Stereo).unwrap();
        assert_eq!(format.to_string(), "48000Hz stereo 16-bit");
    }
}
