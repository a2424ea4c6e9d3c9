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
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, span, Level};

use super::{DeviceError, SinkFormat};

/// An injected fault that fires once the sink has accepted a number of further bytes.
#[derive(Clone, Copy)]
enum Fault {
    Fail(usize),
    ShortWrite(usize),
}

/// A mock sink. Doesn't play anything, but records every byte it accepts along with the write
/// call it arrived in.
pub struct Sink {
    name: String,
    format: SinkFormat,
    /// Every byte accepted so far, in write order, tagged with its write batch.
    written: Mutex<Vec<(usize, u8)>>,
    /// How long each accepted byte takes to "play".
    byte_delay: Mutex<Duration>,
    fault: Mutex<Option<Fault>>,
    closed: AtomicBool,
    /// Writers currently inside write(), and the most ever seen at once.
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    writes: AtomicUsize,
}

impl Sink {
    /// Opens the given mock sink.
    pub fn open(name: &str, format: SinkFormat) -> Sink {
        Sink {
            name: name.to_string(),
            format,
            written: Mutex::new(Vec::new()),
            byte_delay: Mutex::new(Duration::ZERO),
            fault: Mutex::new(None),
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Makes every accepted byte take the given time, emulating real-time backpressure.
    pub fn set_byte_delay(&self, delay: Duration) {
        *self.byte_delay.lock() = delay;
    }

    /// The next write to cross `bytes` more accepted bytes fails outright.
    pub fn fail_after(&self, bytes: usize) {
        *self.fault.lock() = Some(Fault::Fail(bytes));
    }

    /// The next write to cross `bytes` more accepted bytes is cut short at that point.
    pub fn short_write_after(&self, bytes: usize) {
        *self.fault.lock() = Some(Fault::ShortWrite(bytes));
    }

    /// Returns a copy of every byte accepted so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().iter().map(|(_, byte)| *byte).collect()
    }

    /// Returns the write batch of every byte accepted so far. Batches are numbered from zero in
    /// the order write() was called.
    pub fn batches(&self) -> Vec<usize> {
        self.written.lock().iter().map(|(batch, _)| *batch).collect()
    }

    /// Number of calls to write that reached the device.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// The largest number of writers ever observed inside write() at the same time.
    pub fn max_concurrent_writers(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Works out how many of `len` bytes to accept, consuming the fault if it fires.
    fn accept(&self, len: usize) -> Result<usize, DeviceError> {
        let mut fault = self.fault.lock();
        match *fault {
            Some(Fault::Fail(remaining)) if remaining < len => {
                *fault = None;
                Err(DeviceError::Write("mock failure".to_string()))
            }
            Some(Fault::ShortWrite(remaining)) if remaining < len => {
                *fault = None;
                Ok(remaining)
            }
            Some(Fault::Fail(remaining)) => {
                *fault = Some(Fault::Fail(remaining - len));
                Ok(len)
            }
            Some(Fault::ShortWrite(remaining)) => {
                *fault = Some(Fault::ShortWrite(remaining - len));
                Ok(len)
            }
            None => Ok(len),
        }
    }
}

/// Decrements the in-flight writer count on every exit from write().
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl super::Sink for Sink {
    fn write(&self, bytes: &[u8]) -> Result<usize, DeviceError> {
        if self.is_closed() {
            return Err(DeviceError::Closed);
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let batch = self.writes.fetch_add(1, Ordering::Relaxed);

        let accepted = self.accept(bytes.len())?;
        let delay = *self.byte_delay.lock();
        for byte in &bytes[..accepted] {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            if self.is_closed() {
                return Err(DeviceError::Closed);
            }
            self.written.lock().push((batch, *byte));
        }

        Ok(accepted)
    }

    fn close(&self) {
        let span = span!(Level::INFO, "sink (mock)");
        let _enter = span.enter();

        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(sink = self.name, "Closed mock sink.");
        }
    }

    fn format(&self) -> SinkFormat {
        self.format
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
