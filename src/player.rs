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

use serde::Deserialize;
use tracing::{debug, info, span, Level, Span};

use crate::{
    audio::{self, StreamingError},
    waveforms::Waveform,
};

/// How a waveform is pushed into the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum WriteMode {
    /// One write containing the whole waveform.
    #[serde(rename = "bulk")]
    Bulk,
    /// One write per byte.
    #[serde(rename = "byte")]
    ByteByByte,
}

/// The result of asking the player to play a waveform.
#[derive(Debug)]
pub enum PlayOutcome {
    /// The whole waveform was written to the sink.
    Played { bytes: usize },
    /// Something else was already playing. Nothing was written.
    Dropped,
    /// Playback was admitted but failed partway through.
    Failed(StreamingError),
}

impl PlayOutcome {
    /// True if the trigger was admitted, whether or not playback completed.
    pub fn started(&self) -> bool {
        !matches!(self, PlayOutcome::Dropped)
    }
}

/// Holds the busy flag for one admitted playback and clears it on every exit path.
struct Busy<'a>(&'a AtomicBool);

impl<'a> Busy<'a> {
    /// Sets the flag if it was clear. Returns None if another playback holds it.
    fn acquire(flag: &'a AtomicBool) -> Option<Busy<'a>> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Busy(flag))
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Plays waveforms through the sink, one at a time. A request that arrives while something is
/// playing is dropped rather than queued.
pub struct Player {
    /// The sink to write waveforms to.
    sink: Arc<dyn audio::Sink>,
    /// How waveforms are written to the sink.
    write_mode: WriteMode,
    /// Set while a playback holds the sink.
    busy: AtomicBool,
    /// The logging span.
    span: Span,
}

impl Player {
    /// Creates a new player.
    pub fn new(sink: Arc<dyn audio::Sink>, write_mode: WriteMode) -> Player {
        Player {
            sink,
            write_mode,
            busy: AtomicBool::new(false),
            span: span!(Level::INFO, "player"),
        }
    }

    /// Returns true if a playback currently holds the sink.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Plays the waveform if nothing else is playing, blocking until it has been written to the
    /// sink. Returns immediately with Dropped if the sink is busy.
    pub fn try_play(&self, waveform: &Waveform) -> PlayOutcome {
        let _enter = self.span.enter();

        let Some(_busy) = Busy::acquire(&self.busy) else {
            debug!(waveform = waveform.name(), "Player is already playing, dropping.");
            return PlayOutcome::Dropped;
        };

        info!(
            waveform = waveform.name(),
            bytes = waveform.len(),
            write_mode = format!("{:?}", self.write_mode),
            "Playing waveform."
        );

        match self.stream(waveform.bytes()) {
            Ok(bytes) => PlayOutcome::Played { bytes },
            Err(e) => PlayOutcome::Failed(e),
        }
    }

    /// Writes the bytes to the sink. Any short write ends the playback.
    fn stream(&self, bytes: &[u8]) -> Result<usize, StreamingError> {
        match self.write_mode {
            WriteMode::Bulk => {
                let written = self.sink.write(bytes)?;
                if written < bytes.len() {
                    return Err(StreamingError::ShortWrite {
                        expected: bytes.len(),
                        written,
                    });
                }
                info!("Loaded {} bytes into the playback buffer", written);
                Ok(written)
            }
            WriteMode::ByteByByte => {
                for (position, byte) in bytes.iter().enumerate() {
                    let written = self.sink.write(std::slice::from_ref(byte))?;
                    if written != 1 {
                        return Err(StreamingError::ShortWrite {
                            expected: bytes.len(),
                            written: position,
                        });
                    }
                }
                Ok(bytes.len())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{
        audio::{mock, Channels, DeviceError, SinkFormat},
        testutil::eventually,
    };

    fn mock_sink() -> Arc<mock::Sink> {
        Arc::new(mock::Sink::open(
            "mock",
            SinkFormat::new(48000, Channels::Mono).unwrap(),
        ))
    }

    fn ascending() -> Waveform {
        Waveform::new("ascending", (0u8..10).collect())
    }

    #[test]
    fn test_play_bulk() {
        let sink = mock_sink();
        let player = Player::new(sink.clone(), WriteMode::Bulk);

        let outcome = player.try_play(&ascending());
        assert!(matches!(outcome, PlayOutcome::Played { bytes: 10 }));
        assert!(outcome.started());
        assert_eq!(sink.written(), (0u8..10).collect::<Vec<u8>>());
        assert_eq!(sink.writes(), 1);
        assert!(!player.is_busy());
    }

    #[test]
    fn test_play_byte_by_byte() {
        let sink = mock_sink();
        let player = Player::new(sink.clone(), WriteMode::ByteByByte);

        assert!(matches!(
            player.try_play(&ascending()),
            PlayOutcome::Played { bytes: 10 }
        ));
        assert_eq!(sink.written(), (0u8..10).collect::<Vec<u8>>());
        assert_eq!(sink.writes(), 10);
    }

    #[test]
    fn test_trigger_while_streaming_is_dropped() {
        let sink = mock_sink();
        sink.set_byte_delay(Duration::from_millis(20));
        let player = Arc::new(Player::new(sink.clone(), WriteMode::ByteByByte));

        let first = {
            let player = player.clone();
            thread::spawn(move || player.try_play(&ascending()))
        };

        eventually(|| player.is_busy(), "Player never started playing");
        thread::sleep(Duration::from_millis(1));
        let second = player.try_play(&Waveform::new("second", vec![0xff; 4]));
        assert!(matches!(second, PlayOutcome::Dropped));
        assert!(!second.started());
        assert!(player.is_busy());

        let first = first.join().unwrap();
        assert!(matches!(first, PlayOutcome::Played { bytes: 10 }));
        assert!(!player.is_busy());
        assert_eq!(sink.written(), (0u8..10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_concurrent_triggers_never_interleave() {
        let sink = mock_sink();
        sink.set_byte_delay(Duration::from_micros(200));
        let player = Arc::new(Player::new(sink.clone(), WriteMode::ByteByByte));

        let threads = 16;
        let payload_len = 32;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let player = player.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let waveform = Waveform::new(&format!("w{}", i), vec![i as u8; payload_len]);
                    let mut played = 0;
                    for _ in 0..5 {
                        barrier.wait();
                        if let PlayOutcome::Played { .. } = player.try_play(&waveform) {
                            played += 1;
                        }
                    }
                    played
                })
            })
            .collect();

        let played: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(played >= 1);
        assert_eq!(sink.max_concurrent_writers(), 1);

        // The byte stream must be whole payloads back to back.
        let written = sink.written();
        assert_eq!(written.len(), played * payload_len);
        for chunk in written.chunks(payload_len) {
            assert!(chunk.iter().all(|byte| *byte == chunk[0]));
        }
    }

    #[test]
    fn test_concurrent_bulk_triggers_keep_batches_whole() {
        let sink = mock_sink();
        sink.set_byte_delay(Duration::from_micros(200));
        let player = Arc::new(Player::new(sink.clone(), WriteMode::Bulk));

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let player = player.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    player.try_play(&Waveform::new("bulk", vec![0x7f; 32]))
                })
            })
            .collect();

        let played = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| matches!(outcome, PlayOutcome::Played { bytes: 32 }))
            .count();
        assert!(played >= 1);

        // Each admitted write lands as one unbroken run of its own batch.
        let batches = sink.batches();
        assert_eq!(batches.len(), played * 32);
        let mut runs: Vec<usize> = Vec::new();
        for chunk in batches.chunks(32) {
            assert!(chunk.iter().all(|batch| *batch == chunk[0]));
            assert!(!runs.contains(&chunk[0]));
            runs.push(chunk[0]);
        }
        assert_eq!(sink.writes(), played);
    }

    #[test]
    fn test_failure_releases_guard() {
        let sink = mock_sink();
        sink.fail_after(4);
        let player = Player::new(sink.clone(), WriteMode::ByteByByte);

        let outcome = player.try_play(&ascending());
        assert!(matches!(
            outcome,
            PlayOutcome::Failed(StreamingError::Device(DeviceError::Write(_)))
        ));
        assert!(outcome.started());
        assert!(!player.is_busy());
        assert_eq!(sink.written(), vec![0, 1, 2, 3]);

        assert!(matches!(
            player.try_play(&ascending()),
            PlayOutcome::Played { bytes: 10 }
        ));
    }

    #[test]
    fn test_short_bulk_write_fails() {
        let sink = mock_sink();
        sink.short_write_after(6);
        let player = Player::new(sink.clone(), WriteMode::Bulk);

        assert!(matches!(
            player.try_play(&ascending()),
            PlayOutcome::Failed(StreamingError::ShortWrite {
                expected: 10,
                written: 6
            })
        ));
        assert!(!player.is_busy());
    }

    #[test]
    fn test_short_single_byte_write_fails() {
        let sink = mock_sink();
        sink.short_write_after(3);
        let player = Player::new(sink.clone(), WriteMode::ByteByByte);

        assert!(matches!(
            player.try_play(&ascending()),
            PlayOutcome::Failed(StreamingError::ShortWrite {
                expected: 10,
                written: 3
            })
        ));
        assert!(!player.is_busy());
    }

    #[test]
    fn test_closed_sink_fails_and_releases() {
        let sink = mock_sink();
        let player = Player::new(sink.clone(), WriteMode::Bulk);
        audio::Sink::close(sink.as_ref());

        assert!(matches!(
            player.try_play(&ascending()),
            PlayOutcome::Failed(StreamingError::Device(DeviceError::Closed))
        ));
        assert!(!player.is_busy());
    }

    #[test]
    fn test_close_interrupts_playback() {
        let sink = mock_sink();
        sink.set_byte_delay(Duration::from_millis(20));
        let player = Arc::new(Player::new(sink.clone(), WriteMode::ByteByByte));

        let playing = {
            let player = player.clone();
            thread::spawn(move || player.try_play(&ascending()))
        };

        eventually(|| sink.written().len() >= 3, "Playback never reached the sink");
        audio::Sink::close(sink.as_ref());

        let outcome = playing.join().unwrap();
        assert!(matches!(
            outcome,
            PlayOutcome::Failed(StreamingError::Device(DeviceError::Closed))
        ));
        assert!(!player.is_busy());
        assert!(sink.written().len() < 10);
    }
}
