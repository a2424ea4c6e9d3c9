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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chime::audio;
use chime::config::{Overrides, Service};
use chime::dispatcher::Dispatcher;
use chime::player::Player;
use chime::server;
use chime::waveforms::WaveformStore;
use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=HTTP-triggered waveform player
After=sound.target network-online.target

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/chime
ExecStart=/usr/local/bin/chime start

[Install]
WantedBy=multi-user.target
Alias=chime.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Plays a waveform whenever /play is requested."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the trigger server.
    Start {
        /// An optional YAML config file. Flags take precedence over it.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Port to listen on.
        #[arg(short, long)]
        port: Option<u16>,
        /// File to play, or a directory of .wav files to pick from at random.
        #[arg(short = 'f', long)]
        source: Option<PathBuf>,
        /// Sample rate.
        #[arg(short = 'r', long)]
        sample_rate: Option<u32>,
        /// Use mono instead of stereo.
        #[arg(short, long)]
        mono: bool,
        /// The output device. "default" uses the host default.
        #[arg(short, long)]
        device: Option<String>,
        /// Write each waveform in one call or one byte at a time.
        #[arg(long, value_parser = ["bulk", "byte"])]
        write_mode: Option<String>,
        /// Respond after playback (sync) or immediately (async).
        #[arg(long, value_parser = ["sync", "async"])]
        response_mode: Option<String>,
        /// Exit when a playback fails partway through instead of carrying on.
        #[arg(long)]
        abort_on_stream_error: bool,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Loads a waveform file or directory and lists what would be served.
    Waveforms {
        /// The waveform file or directory.
        path: PathBuf,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            port,
            source,
            sample_rate,
            mono,
            device,
            write_mode,
            response_mode,
            abort_on_stream_error,
        } => {
            let overrides = Overrides {
                port,
                source,
                device,
                sample_rate,
                mono,
                write_mode,
                response_mode,
                abort_on_stream_error,
            };
            start(Service::load(config.as_deref(), &overrides)?).await?;
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Waveforms { path } => {
            let store = WaveformStore::load(&path)?;

            println!("Waveforms (count: {}):", store.len());
            for waveform in store.sorted_list() {
                println!("- {}", waveform);
            }
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}

/// Loads the waveforms, opens the sink and serves triggers until interrupted, or until a playback
/// fails under the abort policy.
async fn start(service: Service) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(WaveformStore::load(service.source()?)?);
    let sink = audio::open(service.audio().device(), service.audio().format()?)?;
    let player = Arc::new(Player::new(sink.clone(), service.write_mode()));
    let dispatcher = Arc::new(Dispatcher::new(
        store,
        player,
        service.response_mode(),
        service.stream_error_policy(),
    ));

    let shutdown = {
        let dispatcher = dispatcher.clone();
        async move {
            tokio::select! {
                _ = shutdown_signal() => {},
                _ = dispatcher.aborted() => info!("Shutting down after streaming failure."),
            }
        }
    };
    let result = match server::bind(service.port()).await {
        Ok(listener) => server::serve(listener, dispatcher.clone(), shutdown).await,
        Err(e) => Err(e),
    };

    sink.close();
    result?;

    if dispatcher.has_aborted() {
        return Err("aborted after a streaming failure".into());
    }
    Ok(())
}

/// Resolves on ctrl-c.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(err = e.to_string(), "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down.");
}
