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
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{Channels, SinkFormat};

pub(super) const DEFAULT_DEVICE: &str = "default";
pub(super) const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub(super) const DEFAULT_CHANNELS: &str = "stereo";

/// A YAML representation of the audio output configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The output device. "default" picks the host default, names starting with "mock" open a
    /// mock sink.
    device: String,

    /// Sample rate in Hz.
    sample_rate: u32,

    /// Mono or stereo output.
    channels: Channels,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str, sample_rate: u32, channels: Channels) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate,
            channels,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the sample rate from the configuration.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the channel layout from the configuration.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Returns the validated format to open the sink with.
    pub fn format(&self) -> Result<SinkFormat, ConfigError> {
        SinkFormat::new(self.sample_rate, self.channels)
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    #[test]
    fn test_audio_deserialize() {
        let yaml = r#"
            device: mock-device
            sample_rate: 44100
            channels: mono
        "#;

        let audio: Audio = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(audio.device(), "mock-device");
        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.channels(), Channels::Mono);
        assert_eq!(audio.format().unwrap().bytes_per_frame(), 2);
    }

    #[test]
    fn test_audio_bad_channels() {
        let yaml = r#"
            device: mock-device
            sample_rate: 44100
            channels: quad
        "#;

        let result: Result<Audio, _> = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize();

        assert!(result.is_err());
    }

    #[test]
    fn test_audio_zero_sample_rate() {
        let audio = Audio::new("mock", 0, Channels::Stereo);
        assert!(matches!(
            audio.format(),
            Err(ConfigError::InvalidSampleRate(0))
        ));
    }
}
