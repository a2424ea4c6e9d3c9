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
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use super::audio::{Audio, DEFAULT_CHANNELS, DEFAULT_DEVICE, DEFAULT_SAMPLE_RATE};
use super::error::ConfigError;
use crate::dispatcher::{ResponseMode, StreamErrorPolicy};
use crate::player::WriteMode;

const DEFAULT_PORT: u16 = 8888;
const ENV_PREFIX: &str = "CHIME";

/// Values given on the command line. Anything set here wins over the config file and environment.
#[derive(Default, Debug)]
pub struct Overrides {
    pub port: Option<u16>,
    pub source: Option<PathBuf>,
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub mono: bool,
    pub write_mode: Option<String>,
    pub response_mode: Option<String>,
    pub abort_on_stream_error: bool,
}

/// The service configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Service {
    /// The port to listen on.
    port: u16,

    /// A waveform file, or a directory of .wav files to pick from at random.
    source: Option<PathBuf>,

    /// The audio output configuration.
    audio: Audio,

    /// Whether waveforms are written to the sink in one call or one byte at a time.
    write_mode: WriteMode,

    /// Whether /play responds before or after playback finishes.
    response_mode: ResponseMode,

    /// Exit the process when a playback fails mid-stream.
    abort_on_stream_error: bool,
}

impl Service {
    /// Loads the service configuration. Layers, lowest priority first: defaults, the optional
    /// YAML file, CHIME_* environment variables, then command line overrides.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Service, ConfigError> {
        let mut builder = Config::builder()
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("audio.device", DEFAULT_DEVICE)?
            .set_default("audio.sample_rate", i64::from(DEFAULT_SAMPLE_RATE))?
            .set_default("audio.channels", DEFAULT_CHANNELS)?
            .set_default("write_mode", "bulk")?
            .set_default("response_mode", "async")?
            .set_default("abort_on_stream_error", false)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }

        let mut builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("port", overrides.port.map(i64::from))?
            .set_override_option(
                "source",
                overrides
                    .source
                    .as_ref()
                    .map(|source| source.to_string_lossy().to_string()),
            )?
            .set_override_option("audio.device", overrides.device.clone())?
            .set_override_option("audio.sample_rate", overrides.sample_rate.map(i64::from))?
            .set_override_option("write_mode", overrides.write_mode.clone())?
            .set_override_option("response_mode", overrides.response_mode.clone())?;
        if overrides.mono {
            builder = builder.set_override("audio.channels", "mono")?;
        }
        if overrides.abort_on_stream_error {
            builder = builder.set_override("abort_on_stream_error", true)?;
        }

        let service: Service = builder.build()?.try_deserialize()?;
        service.validate()?;
        Ok(service)
    }

    /// Checks the values serde can't.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        self.source()?;
        self.audio.format()?;
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the waveform source, which must be given.
    pub fn source(&self) -> Result<&Path, ConfigError> {
        self.source.as_deref().ok_or(ConfigError::MissingSource)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.response_mode
    }

    pub fn stream_error_policy(&self) -> StreamErrorPolicy {
        if self.abort_on_stream_error {
            StreamErrorPolicy::Abort
        } else {
            StreamErrorPolicy::Continue
        }
    }
}
