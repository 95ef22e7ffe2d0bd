//! # Interrupt Emitter
//!
//! Converts requested trigger times (or samples) into `trig` messages
//! published when the host clock reaches them, so slow control logic can
//! react "at" a stream instant.
//!
//! Stream time is tracked as host-clock time minus an offset. The offset
//! starts at the clock reading at construction (stream time 0) and is
//! corrected by every `rx_time` tag: the last sample of a batch is assumed
//! to arrive "now", so the tagged sample was expected at
//! `now - (end - offset) / rate`; the difference to the tagged time is
//! folded into the offset. Batches without a tag are checked against the
//! host clock instead: when the time spent since the previous batch differs
//! from the batch's sample duration by more than [`DRIFT_THRESHOLD`]
//! (accumulated across batches), the difference is folded in the same way.
//!
//! `set` requests:
//!
//! | Value                     | Meaning                  |
//! |---------------------------|--------------------------|
//! | `UInt(sample)`            | trigger at stream sample |
//! | `Tuple[UInt, real, ..]`   | trigger at stream time   |
//! | anything else             | ignored                  |
//!
//! A request already in the past is dropped when `drop_late` is set and
//! otherwise fires immediately, stamped with the current time. Requests in
//! the future are armed and fire from the first [`SyncBlock::work`] or
//! [`InterruptHandle::poll`] at or after their deadline.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::clock::MockClock;
//! use r4w_timing::interrupt_emitter::InterruptEmitter;
//! use r4w_timing::stream_tags::TagValue;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = Arc::new(MockClock::at_ns(5_000_000_000));
//! let emitter = InterruptEmitter::new(1000.0, false, clock.clone());
//! let handle = emitter.handle();
//!
//! handle.set(&TagValue::UInt(250));
//! assert_eq!(handle.poll(), 0);
//!
//! clock.advance(Duration::from_millis(250));
//! assert_eq!(handle.poll(), 1);
//! let trig = handle.drain_triggers().remove(0);
//! assert_eq!(trig.value().dict_ref("trigger_sample"), Some(&TagValue::UInt(250)));
//! ```

use crate::block::{SyncBlock, WorkIo};
use crate::clock::{Clock, SystemClock};
use crate::config::InterruptConfig;
use crate::message_port::{Message, MessagePort};
use crate::stream_tags::{keys, TagValue};
use crate::time_spec::TimeSpec;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output port and message key.
pub const TRIG: &str = "trig";

/// Accumulated batch-timing error (seconds) tolerated before the stream
/// clock is corrected in the absence of `rx_time` tags.
pub const DRIFT_THRESHOLD: f64 = 200e-6;

/// Counters for an emitter instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptStats {
    pub requests: u64,
    pub ignored: u64,
    pub dropped_late: u64,
    pub fired: u64,
    pub time_corrections: u64,
    pub drift_corrections: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct ArmedInterrupt {
    /// Stream time at which to fire
    deadline: f64,
}

struct EmitterState {
    clock: Arc<dyn Clock>,
    sample_rate: f64,
    drop_late: bool,
    /// Host-clock seconds minus stream seconds
    time_offset: f64,
    /// First sample after the last processed batch
    start_sample: u64,
    /// Stream time of `start_sample`
    start_time: f64,
    /// Stream time at the end of the previous batch
    last_time: f64,
    /// Sub-threshold timing error carried to the next batch
    last_error: f64,
    armed: Vec<ArmedInterrupt>,
    trig_port: MessagePort,
    stats: InterruptStats,
}

impl fmt::Debug for EmitterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterState")
            .field("sample_rate", &self.sample_rate)
            .field("drop_late", &self.drop_late)
            .field("time_offset", &self.time_offset)
            .field("start_sample", &self.start_sample)
            .field("start_time", &self.start_time)
            .field("last_error", &self.last_error)
            .field("armed", &self.armed.len())
            .finish()
    }
}

impl EmitterState {
    fn stream_now(&self) -> f64 {
        self.clock.now_secs_f64() - self.time_offset
    }

    fn samples_to_time(&self, sample: u64) -> TimeSpec {
        let elapsed = (sample as f64 - self.start_sample as f64) / self.sample_rate;
        TimeSpec::from_secs_f64((elapsed + self.start_time).max(0.0))
    }

    fn time_to_samples(&self, time: f64) -> u64 {
        let delta = ((time - self.start_time) * self.sample_rate).trunc() as i64;
        (self.start_sample as i64).saturating_add(delta).max(0) as u64
    }

    fn handle_set(&mut self, msg: &TagValue) {
        self.stats.requests += 1;
        let trigger_time = match msg {
            TagValue::UInt(sample) => self.samples_to_time(*sample),
            TagValue::Tuple(_) => match TimeSpec::from_tag_value(msg) {
                Ok(time) => time,
                Err(err) => {
                    self.stats.ignored += 1;
                    debug!(%err, "ignoring interrupt request");
                    return;
                }
            },
            other => {
                self.stats.ignored += 1;
                debug!(value = %other, "ignoring interrupt request");
                return;
            }
        };

        let deadline = trigger_time.as_secs_f64();
        let now = self.stream_now();
        if deadline < now {
            if self.drop_late {
                self.stats.dropped_late += 1;
                warn!(late_by = now - deadline, "dropping late interrupt request");
            } else {
                debug!(late_by = now - deadline, "firing late interrupt");
                self.fire(now);
            }
        } else {
            debug!(deadline, wait = deadline - now, "arming interrupt");
            self.armed.push(ArmedInterrupt { deadline });
            self.armed
                .sort_by(|a, b| a.deadline.total_cmp(&b.deadline));
        }
    }

    /// Publish a trigger for stream time `time`.
    fn fire(&mut self, time: f64) {
        let trigger_time = TimeSpec::from_secs_f64(time.max(0.0));
        let trigger_sample = self.time_to_samples(time);
        let value = TagValue::dict([
            ("trigger_time", trigger_time.to_tag_value()),
            ("trigger_sample", TagValue::UInt(trigger_sample)),
        ]);
        self.trig_port.send(Message::new(TRIG, value));
        self.stats.fired += 1;
    }

    fn poll(&mut self) -> usize {
        let now = self.stream_now();
        let due = self.armed.partition_point(|a| a.deadline <= now);
        let fired: Vec<ArmedInterrupt> = self.armed.drain(..due).collect();
        for interrupt in &fired {
            self.fire(interrupt.deadline);
        }
        fired.len()
    }

    fn anchor(&mut self, end_sample: u64) {
        self.start_sample = end_sample;
        self.start_time = self.stream_now();
    }

    fn correct_from_tag(&mut self, offset: u64, value: &TagValue) {
        let tagged = match TimeSpec::from_tag_value(value) {
            Ok(t) => t.as_secs_f64(),
            Err(err) => {
                warn!(%err, offset, "ignoring time tag");
                return;
            }
        };
        let behind = self.start_sample.saturating_sub(offset) as f64 / self.sample_rate;
        let expected = self.start_time - behind;
        let error = expected - tagged;
        self.time_offset += error;
        self.start_time -= error;
        self.stats.time_corrections += 1;
        debug!(error, offset, "stream clock corrected");
    }

    /// Compare the host time spent on the last batch with its sample
    /// duration and fold the accumulated error into the offset once it
    /// exceeds [`DRIFT_THRESHOLD`].
    fn correct_drift(&mut self, n: usize) {
        if self.time_offset <= 0.0 {
            return;
        }
        let buffer_time = n as f64 / self.sample_rate;
        let elapsed = self.start_time - self.last_time;
        let error = elapsed - buffer_time + self.last_error;
        if error.abs() > DRIFT_THRESHOLD {
            self.time_offset += error;
            self.start_time -= error;
            self.last_error = 0.0;
            self.stats.drift_corrections += 1;
            debug!(error_ms = error * 1e3, items = n, "stream clock drift corrected");
        } else {
            self.last_error = error;
        }
    }
}

/// Cloneable handle for the message side of an [`InterruptEmitter`].
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    shared: Arc<Mutex<EmitterState>>,
}

impl InterruptHandle {
    /// Deliver a `set` request.
    pub fn set(&self, msg: &TagValue) {
        self.shared.lock().handle_set(msg);
    }

    /// Fire every armed interrupt whose deadline has passed. Returns the
    /// number fired.
    pub fn poll(&self) -> usize {
        self.shared.lock().poll()
    }

    /// Take every `trig` message published so far.
    pub fn drain_triggers(&self) -> Vec<Message> {
        self.shared.lock().trig_port.drain()
    }

    pub fn armed(&self) -> usize {
        self.shared.lock().armed.len()
    }
}

/// Block relating stream samples to host time and emitting `trig` messages.
#[derive(Debug)]
pub struct InterruptEmitter {
    shared: Arc<Mutex<EmitterState>>,
}

impl InterruptEmitter {
    pub fn new(sample_rate: f64, drop_late: bool, clock: Arc<dyn Clock>) -> Self {
        let time_offset = clock.now_secs_f64();
        info!(rate = sample_rate, drop_late, "interrupt emitter configured");
        let state = EmitterState {
            clock,
            sample_rate,
            drop_late,
            time_offset,
            start_sample: 0,
            start_time: 0.0,
            last_time: 0.0,
            last_error: 0.0,
            armed: Vec::new(),
            trig_port: MessagePort::new(TRIG),
            stats: InterruptStats::default(),
        };
        Self {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    /// Emitter driven by the system wall clock.
    pub fn with_system_clock(sample_rate: f64, drop_late: bool) -> Self {
        Self::new(sample_rate, drop_late, Arc::new(SystemClock))
    }

    pub fn from_config(config: &InterruptConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.sample_rate, config.drop_late, clock)
    }

    pub fn handle(&self) -> InterruptHandle {
        InterruptHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn set(&self, msg: &TagValue) {
        self.shared.lock().handle_set(msg);
    }

    pub fn poll(&self) -> usize {
        self.shared.lock().poll()
    }

    pub fn drain_triggers(&self) -> Vec<Message> {
        self.shared.lock().trig_port.drain()
    }

    /// Current stream time according to the host clock.
    pub fn stream_time(&self) -> TimeSpec {
        TimeSpec::from_secs_f64(self.shared.lock().stream_now().max(0.0))
    }

    /// Stream time of absolute sample `sample`, from the latest anchor.
    pub fn samples_to_time(&self, sample: u64) -> TimeSpec {
        self.shared.lock().samples_to_time(sample)
    }

    /// Absolute sample at stream time `time`, from the latest anchor.
    pub fn time_to_samples(&self, time: TimeSpec) -> u64 {
        self.shared.lock().time_to_samples(time.as_secs_f64())
    }

    pub fn stats(&self) -> InterruptStats {
        self.shared.lock().stats
    }
}

impl SyncBlock for InterruptEmitter {
    fn name(&self) -> &str {
        "interrupt_emitter"
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> usize {
        io.pass_through();
        let n = io.noutput_items();

        let mut state = self.shared.lock();
        state.anchor(io.nitems_read() + n as u64);

        match io.tags_in_window(0, n, keys::RX_TIME).last() {
            Some(tag) => state.correct_from_tag(tag.offset, &tag.value),
            None => state.correct_drift(n),
        }
        state.last_time = state.start_time;
        state.poll();
        n
    }
}
