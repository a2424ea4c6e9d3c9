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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rand::{seq::SliceRandom, Rng};
use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::{
    player::{PlayOutcome, Player},
    waveforms::{Mode, Waveform, WaveformStore},
};

/// When a trigger returns relative to the playback it caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ResponseMode {
    /// Return once playback has finished or been dropped.
    #[serde(rename = "sync")]
    Synchronous,
    /// Return straight away and let playback run in the background.
    #[serde(rename = "async")]
    FireAndForget,
}

/// What to do when an admitted playback fails partway through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorPolicy {
    /// Log it and keep serving.
    Continue,
    /// Log it and shut the service down.
    Abort,
}

/// Raised once a playback fails under the abort policy.
#[derive(Default)]
struct Abort {
    fired: AtomicBool,
    notify: Notify,
}

impl Abort {
    fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }
}

/// What a single trigger did.
#[derive(Debug)]
pub struct Trigger {
    /// The name of the waveform that was selected.
    pub waveform: String,
    /// The playback result. Only known in synchronous mode.
    pub outcome: Option<PlayOutcome>,
}

/// Turns triggers into playback attempts.
pub struct Dispatcher {
    /// Everything that can be played.
    store: Arc<WaveformStore>,
    /// The player guarding the sink.
    player: Arc<Player>,
    stream_error_policy: StreamErrorPolicy,
    response_mode: ResponseMode,
    abort: Arc<Abort>,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        store: Arc<WaveformStore>,
        player: Arc<Player>,
        response_mode: ResponseMode,
        stream_error_policy: StreamErrorPolicy,
    ) -> Dispatcher {
        Dispatcher {
            store,
            player,
            stream_error_policy,
            response_mode,
            abort: Arc::new(Abort::default()),
        }
    }

    pub fn player(&self) -> &Arc<Player> {
        &self.player
    }

    /// Resolves once a playback has failed under the abort policy.
    pub async fn aborted(&self) {
        if self.has_aborted() {
            return;
        }
        self.abort.notify.notified().await
    }

    pub fn has_aborted(&self) -> bool {
        self.abort.fired.load(Ordering::Acquire)
    }

    /// Picks the waveform for a trigger.
    pub fn select(&self) -> Arc<Waveform> {
        self.select_with(&mut rand::thread_rng())
    }

    /// Picks the waveform for a trigger using the given random source. A single-file store always
    /// yields its only waveform; a directory store picks uniformly on every call.
    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Arc<Waveform> {
        match self.store.mode() {
            Mode::Single => self.store.first().clone(),
            Mode::Directory => self
                .store
                .waveforms()
                .choose(rng)
                .unwrap_or_else(|| self.store.first())
                .clone(),
        }
    }

    /// Handles one trigger. Playback runs on the blocking pool; in synchronous mode this waits for
    /// it, otherwise it returns as soon as playback has been handed off.
    pub async fn on_trigger(&self) -> Trigger {
        let waveform = self.select();
        let name = waveform.name().to_string();

        let player = self.player.clone();
        let policy = self.stream_error_policy;
        let abort = self.abort.clone();
        let join_handle = tokio::task::spawn_blocking(move || {
            let outcome = player.try_play(&waveform);
            Dispatcher::report(&waveform, &outcome, policy, &abort);
            outcome
        });

        let outcome = match self.response_mode {
            ResponseMode::FireAndForget => None,
            ResponseMode::Synchronous => match join_handle.await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!(err = e.to_string(), waveform = name, "Playback task failed");
                    None
                }
            },
        };

        Trigger {
            waveform: name,
            outcome,
        }
    }

    /// Logs the outcome of a playback and applies the stream error policy. Aborting only raises
    /// the signal; the owner of the sink does the shutting down.
    fn report(
        waveform: &Waveform,
        outcome: &PlayOutcome,
        policy: StreamErrorPolicy,
        abort: &Abort,
    ) {
        match outcome {
            PlayOutcome::Played { bytes } => {
                info!(waveform = waveform.name(), bytes, "Waveform finished playing.")
            }
            PlayOutcome::Dropped => debug!(waveform = waveform.name(), "Trigger dropped."),
            PlayOutcome::Failed(e) => {
                error!(
                    err = e.to_string(),
                    waveform = waveform.name(),
                    "Error while playing waveform"
                );
                if policy == StreamErrorPolicy::Abort {
                    error!("Aborting after streaming failure.");
                    abort.fire();
                }
            }
        }
    }
}
