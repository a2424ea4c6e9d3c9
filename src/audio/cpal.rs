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
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::{DeviceError, SinkFormat};

/// Name that selects the host's default output device.
const DEFAULT_DEVICE: &str = "default";

/// Minimum number of bytes buffered between writers and the audio callback.
const MIN_BUFFERED_BYTES: usize = 1024;

/// A description of an output device, used for listing.
pub struct DeviceInfo {
    /// The name of the device.
    pub name: String,
    /// The maximum number of channels the device supports.
    pub max_channels: u16,
    /// The host the device belongs to.
    pub host_id: cpal::HostId,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// A sink backed by a cpal output stream. Bytes are handed to the audio callback through a
/// bounded channel holding roughly 100ms of audio, so writes proceed at playback speed.
pub struct Sink {
    /// The name of the device.
    name: String,
    /// The format the stream was opened with.
    format: SinkFormat,
    /// Producer side of the byte channel. The consumer lives in the audio callback.
    bytes_tx: Sender<u8>,
    /// Dropping this sender tells the output thread and any blocked writer to stop.
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    closed: AtomicBool,
    /// Handle to the output thread, which owns the cpal stream.
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Pulls the next little-endian i16 sample from the channel. A lone low byte is carried over
/// to the next callback so samples stay aligned across underruns.
fn next_sample(bytes_rx: &Receiver<u8>, carry: &mut Option<u8>) -> Option<i16> {
    let low = match carry.take() {
        Some(low) => low,
        None => bytes_rx.try_recv().ok()?,
    };

    match bytes_rx.try_recv() {
        Ok(high) => Some(i16::from_le_bytes([low, high])),
        Err(_) => {
            *carry = Some(low);
            None
        }
    }
}

/// Builds the audio callback for the given output sample type. Underruns are filled with silence.
fn create_callback<T>(
    bytes_rx: Receiver<u8>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let mut carry: Option<u8> = None;
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        for sample in data.iter_mut() {
            *sample = match next_sample(&bytes_rx, &mut carry) {
                Some(value) => T::from_sample(value),
                None => T::EQUILIBRIUM,
            };
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    bytes_rx: Receiver<u8>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let mut callback = create_callback::<T>(bytes_rx);
    Ok(device.build_output_stream(
        config,
        move |data: &mut [T], info: &cpal::OutputCallbackInfo| callback(data, info),
        |err| error!("CPAL output stream error: {}", err),
        None,
    )?)
}

impl Sink {
    /// Lists output devices across all available hosts.
    pub fn list() -> Result<Vec<DeviceInfo>, DeviceError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<DeviceInfo> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host =
                cpal::host_from_id(host_id).map_err(|e| DeviceError::Query(e.to_string()))?;
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(DeviceInfo {
                        name: device.name().map_err(|e| DeviceError::Query(e.to_string()))?,
                        max_channels,
                        host_id,
                    });
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Finds the named output device, or the default device for "default".
    fn find_device(name: &str) -> Result<cpal::Device, DeviceError> {
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        if name == DEFAULT_DEVICE {
            return cpal::default_host()
                .default_output_device()
                .ok_or(DeviceError::NoDefault);
        }

        for host_id in cpal::available_hosts() {
            let Ok(host) = cpal::host_from_id(host_id) else {
                continue;
            };
            let Ok(host_devices) = host.output_devices() else {
                continue;
            };
            for device in host_devices {
                if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                    return Ok(device);
                }
            }
        }

        Err(DeviceError::NotFound(name.to_string()))
    }

    /// Opens the named device with the given format and starts its output stream. The stream is
    /// created on a dedicated thread, which holds it until the sink is closed.
    pub fn open(name: &str, format: SinkFormat) -> Result<Sink, DeviceError> {
        let span = span!(Level::INFO, "sink (cpal)");
        let _enter = span.enter();

        let device = Sink::find_device(name)?;
        let sample_format = device
            .default_output_config()
            .map_err(|e| DeviceError::Query(e.to_string()))?
            .sample_format();
        let config = cpal::StreamConfig {
            channels: format.channels.count(),
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = (format.byte_rate() / 10).max(MIN_BUFFERED_BYTES);
        let (bytes_tx, bytes_rx) = crossbeam_channel::bounded::<u8>(capacity);
        let (close_tx, close_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);

        let thread_close_rx = close_rx.clone();
        let output_thread = thread::spawn(move || {
            let stream = match sample_format {
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, bytes_rx),
                cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, bytes_rx),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, bytes_rx),
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, bytes_rx),
                other => Err(DeviceError::UnsupportedFormat(other.to_string())),
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.into()));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Hold the stream until the close sender is dropped.
            let _ = thread_close_rx.recv();
            drop(stream);
        });

        let ready = ready_rx.recv().unwrap_or(Err(DeviceError::OutputThread));
        if let Err(e) = ready {
            let _ = output_thread.join();
            return Err(e);
        }

        info!(
            device = name,
            sample_format = sample_format.to_string(),
            buffered_bytes = capacity,
            "CPAL output stream started successfully"
        );

        Ok(Sink {
            name: name.to_string(),
            format,
            bytes_tx,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            closed: AtomicBool::new(false),
            output_thread: Mutex::new(Some(output_thread)),
        })
    }
}

impl super::Sink for Sink {
    fn write(&self, bytes: &[u8]) -> Result<usize, DeviceError> {
        for byte in bytes {
            if self.closed.load(Ordering::Acquire) {
                return Err(DeviceError::Closed);
            }
            select! {
                send(self.bytes_tx, *byte) -> result => {
                    if result.is_err() {
                        return Err(DeviceError::Closed);
                    }
                }
                recv(self.close_rx) -> _ => return Err(DeviceError::Closed),
            }
        }

        Ok(bytes.len())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        drop(self.close_tx.lock().take());
        if let Some(output_thread) = self.output_thread.lock().take() {
            if output_thread.join().is_err() {
                error!(device = self.name, "Error while joining output thread");
            }
        }
        info!(device = self.name, "Closed output stream.");
    }

    fn format(&self) -> SinkFormat {
        self.format
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        super::Sink::close(self);
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.format)
    }
}
