//! # Timed Retune Scheduler
//!
//! Turns asynchronous retune commands into stream tags placed on the exact
//! sample where the retune must take effect, so a downstream tuner can switch
//! frequency sample-accurately.
//!
//! ## Signal Flow
//!
//! ```text
//!                  command dict ──► RetuneCommandPort::post
//!                  {lo_offset, time?}        │
//!                                            ├──► "freq" port: (freq, -lo_offset)
//!                                            ▼
//!                                  ┌──────────────────┐
//!   samples + rx_time tags ───────►│ RetuneScheduler  │──► samples + set_freq tags
//!                                  └──────────────────┘
//! ```
//!
//! ## Scheduling Rules
//!
//! A command's `time = (secs, frac)` is mapped to an absolute sample with the
//! current reference (see [`TimeReference::sample_at_time`]). Commands without
//! a time fire at the start of the next batch. For a batch `[R, R+N)` the
//! queue head is serviced repeatedly:
//!
//! | Head target          | Action                      |
//! |----------------------|-----------------------------|
//! | immediate            | tag at R, dequeue           |
//! | target < R           | tag at R, dequeue (late)    |
//! | R ≤ target < R+N     | tag at target, dequeue      |
//! | target ≥ R+N         | stop until a later batch    |
//!
//! Only the head is inspected, so queued commands fire in arrival order even
//! when their targets are not monotonic.
//!
//! The reference time starts at the configured origin (valid at sample 0)
//! and is replaced by the last `rx_time` tag seen in each input batch, before
//! the queue is serviced.
//!
//! ## Concurrency
//!
//! The reference, queue and output port live in one state struct behind a
//! single mutex. The stream thread's [`SyncBlock::work`] and any number of
//! [`RetuneCommandPort`] clones on other threads each hold the lock for their
//! whole body, so a command never observes a half-updated reference.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::flowgraph::Flowgraph;
//! use r4w_timing::retune_scheduler::RetuneScheduler;
//! use r4w_timing::stream_tags::TagValue;
//! use r4w_timing::time_spec::TimeSpec;
//! use r4w_timing::types::IQSample;
//!
//! let scheduler = RetuneScheduler::new(1000.0, "lo_offset", TimeSpec::new(100, 0.0));
//! let commands = scheduler.command_port();
//!
//! let mut fg = Flowgraph::new().with_batch_size(256);
//! fg.connect(scheduler);
//!
//! // Retune 25 kHz at t = 100.5 s, i.e. sample 500
//! commands.post(&TagValue::dict([
//!     ("lo_offset", TagValue::Float(25e3)),
//!     ("time", TagValue::time_tuple(100, 0.5)),
//! ]));
//! fg.run(&vec![IQSample::default(); 1024]);
//!
//! let tags = fg.tags().by_key("set_freq");
//! assert_eq!(tags[0].offset, 500);
//! assert_eq!(tags[0].value, TagValue::Float(-25e3));
//! assert_eq!(commands.drain_freq_messages()[0].as_float(), Some(-25e3));
//! ```

use crate::block::{SyncBlock, WorkIo};
use crate::config::{KeyName, RetuneConfig};
use crate::message_port::{Message, MessagePort};
use crate::retune_queue::{PendingRetune, RetuneQueue, RetuneTarget};
use crate::stream_tags::{keys, TagValue};
use crate::time_spec::{TimeReference, TimeSpec};
use crate::types::{TimingError, TimingResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters for a scheduler instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Commands delivered to the command port
    pub commands_received: u64,
    /// Commands discarded as malformed
    pub commands_rejected: u64,
    /// Commands discarded because the queue was full
    pub commands_dropped: u64,
    /// Retune tags attached to the stream
    pub retunes_tagged: u64,
    /// Reference updates taken from `rx_time` tags
    pub reference_updates: u64,
    /// `rx_time` tags that could not be parsed
    pub invalid_time_tags: u64,
    /// `freq` messages evicted because nobody drained the port
    pub freq_messages_evicted: u64,
}

/// Undrained `freq` messages kept before the oldest is evicted.
pub const FREQ_PORT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct SchedulerState {
    sample_rate: f64,
    dict_key: KeyName,
    tag_key: KeyName,
    reference: TimeReference,
    queue: RetuneQueue,
    freq_port: MessagePort,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn handle_command(&mut self, msg: &TagValue) {
        self.stats.commands_received += 1;
        let pending = match self.accept_command(msg) {
            Ok(pending) => pending,
            Err(err) => {
                self.stats.commands_rejected += 1;
                warn!(%err, "discarding retune command");
                return;
            }
        };

        let target = pending.target;
        match self.queue.push(pending) {
            Ok(()) => debug!(%target, pending = self.queue.len(), "retune queued"),
            Err(err) => {
                self.stats.commands_dropped += 1;
                debug!(%err, %target, "retune dropped");
            }
        }
    }

    /// Publish the frequency correction and work out where the retune lands.
    fn accept_command(&mut self, msg: &TagValue) -> TimingResult<PendingRetune> {
        if !msg.is_dict() {
            return Err(TimingError::CommandParse(format!(
                "expected dict, got {}",
                msg.type_name()
            )));
        }
        let offset = msg
            .dict_ref(self.dict_key.as_str())
            .ok_or_else(|| {
                TimingError::CommandParse(format!("missing key '{}'", self.dict_key))
            })?
            .as_float()
            .ok_or_else(|| {
                TimingError::CommandParse(format!("'{}' must be numeric", self.dict_key))
            })?;

        let correction = -offset;
        self.freq_port.send(Message::float(keys::FREQ, correction));

        let target = match msg.dict_ref(keys::TIME) {
            Some(time) => {
                let time = TimeSpec::from_tag_value(time)
                    .map_err(|e| TimingError::CommandParse(e.to_string()))?;
                RetuneTarget::AtSample(self.reference.sample_at_time(time, self.sample_rate))
            }
            None => RetuneTarget::Immediate,
        };
        Ok(PendingRetune::new(target, TagValue::Float(correction)))
    }

    fn observe_time_tag(&mut self, offset: u64, value: &TagValue) {
        match TimeSpec::from_tag_value(value) {
            Ok(time) => {
                self.reference = TimeReference { offset, time };
                self.stats.reference_updates += 1;
                debug!(reference = %self.reference, "reference time updated");
            }
            Err(err) => {
                self.stats.invalid_time_tags += 1;
                warn!(%err, offset, "ignoring time tag");
            }
        }
    }
}

/// Handle for delivering commands to a [`RetuneScheduler`] from any thread.
#[derive(Debug, Clone)]
pub struct RetuneCommandPort {
    shared: Arc<Mutex<SchedulerState>>,
}

impl RetuneCommandPort {
    /// Deliver one command. Malformed commands are logged and discarded;
    /// commands arriving while 64 are pending are dropped.
    pub fn post(&self, msg: &TagValue) {
        self.shared.lock().handle_command(msg);
    }

    /// Take every message published on the `freq` port so far.
    ///
    /// The port keeps the newest [`FREQ_PORT_CAPACITY`] messages; older ones
    /// are evicted (logged at debug, counted in
    /// [`SchedulerStats::freq_messages_evicted`]) if nobody drains it.
    pub fn drain_freq_messages(&self) -> Vec<Message> {
        self.shared.lock().freq_port.drain()
    }

    /// Number of commands waiting for their sample.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

/// Sync block converting timed retune commands into `set_freq` tags.
#[derive(Debug)]
pub struct RetuneScheduler {
    shared: Arc<Mutex<SchedulerState>>,
}

impl RetuneScheduler {
    /// `origin` is the absolute time of sample 0 until an `rx_time` tag arrives.
    pub fn new(sample_rate: f64, dict_key: impl Into<KeyName>, origin: TimeSpec) -> Self {
        let dict_key = dict_key.into();
        info!(rate = sample_rate, dict_key = %dict_key, origin = %origin, "retune scheduler configured");
        let state = SchedulerState {
            sample_rate,
            dict_key,
            tag_key: KeyName::from(keys::SET_FREQ),
            reference: TimeReference::at_origin(origin),
            queue: RetuneQueue::new(),
            freq_port: MessagePort::with_capacity(keys::FREQ, FREQ_PORT_CAPACITY),
            stats: SchedulerStats::default(),
        };
        Self {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    pub fn from_config(config: &RetuneConfig) -> Self {
        let scheduler = Self::new(config.sample_rate, config.dict_key.clone(), config.origin);
        scheduler.shared.lock().tag_key = config.tag_key.clone();
        scheduler
    }

    /// A cloneable handle for posting commands from other threads.
    pub fn command_port(&self) -> RetuneCommandPort {
        RetuneCommandPort {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Deliver one command (same as posting through a command port).
    pub fn handle_command(&self, msg: &TagValue) {
        self.shared.lock().handle_command(msg);
    }

    /// Change the frequency-offset key. Non-string values are converted
    /// with a warning.
    pub fn set_dict_key(&self, key: &TagValue) {
        self.shared.lock().dict_key = KeyName::coerce("dict_key", key);
    }

    /// Change the output tag key. Non-string values are converted with a
    /// warning.
    pub fn set_tag_key(&self, key: &TagValue) {
        self.shared.lock().tag_key = KeyName::coerce("tag_key", key);
    }

    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.shared.lock().sample_rate = sample_rate;
    }

    /// Replace the reference: `(secs, frac)` is the time of sample `offset`.
    pub fn set_ref_time(&self, offset: u64, secs: u64, frac: f64) {
        let reference = TimeReference::new(offset, secs, frac);
        info!(reference = %reference, "setting reference time");
        self.shared.lock().reference = reference;
    }

    pub fn reference(&self) -> TimeReference {
        self.shared.lock().reference
    }

    pub fn dict_key(&self) -> KeyName {
        self.shared.lock().dict_key.clone()
    }

    pub fn tag_key(&self) -> KeyName {
        self.shared.lock().tag_key.clone()
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Targets of the pending commands, oldest first.
    pub fn pending_targets(&self) -> Vec<RetuneTarget> {
        self.shared.lock().queue.iter().map(|p| p.target).collect()
    }

    /// See [`RetuneCommandPort::drain_freq_messages`].
    pub fn drain_freq_messages(&self) -> Vec<Message> {
        self.shared.lock().freq_port.drain()
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.lock();
        SchedulerStats {
            freq_messages_evicted: state.freq_port.messages_dropped(),
            ..state.stats
        }
    }
}

impl SyncBlock for RetuneScheduler {
    fn name(&self) -> &str {
        "retune_scheduler"
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> usize {
        io.pass_through();
        let n = io.noutput_items();
        let start = io.nitems_read();

        let mut state = self.shared.lock();

        let last_time_tag = io
            .tags_in_window(0, n, keys::RX_TIME)
            .last()
            .map(|tag| (tag.offset, tag.value.clone()));
        if let Some((offset, value)) = last_time_tag {
            state.observe_time_tag(offset, &value);
        }

        let due = state.queue.drain_due(start, n);
        state.stats.retunes_tagged += due.len() as u64;
        for (offset, entry) in due {
            debug!(offset, target = %entry.target, value = %entry.value, "retune tagged");
            io.add_item_tag(offset, state.tag_key.as_str(), entry.value);
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::WorkIo;
    use crate::retune_queue::RETUNE_QUEUE_CAPACITY;
    use crate::stream_tags::{StreamTag, TagStore};
    use crate::types::IQSample;

    const RATE: f64 = 1000.0;

    fn command(offset: f64, time: Option<(u64, f64)>) -> TagValue {
        let mut entries = vec![("lo_offset".to_string(), TagValue::Float(offset))];
        if let Some((secs, frac)) = time {
            entries.push(("time".to_string(), TagValue::time_tuple(secs, frac)));
        }
        TagValue::Dict(entries)
    }

    /// Run one batch of `len` samples starting at `start`.
    fn run_batch(
        block: &mut RetuneScheduler,
        start: u64,
        len: usize,
        input_tags: &TagStore,
    ) -> Vec<StreamTag> {
        let input: Vec<IQSample> = (0..len).map(|i| IQSample::new(i as f64, -(i as f64))).collect();
        let mut output = vec![IQSample::default(); len];
        let mut out_tags = TagStore::new();
        let produced = {
            let mut io = WorkIo::new(&input, &mut output, start, input_tags, &mut out_tags, "test");
            block.work(&mut io)
        };
        assert_eq!(produced, len);
        assert_eq!(output, input);
        out_tags.all().into_iter().cloned().collect()
    }

    fn scheduler() -> RetuneScheduler {
        RetuneScheduler::new(RATE, "lo_offset", TimeSpec::new(10, 0.0))
    }

    #[test]
    fn test_immediate_command_fires_at_batch_start() {
        let mut block = scheduler();
        block.handle_command(&command(5e3, None));
        assert_eq!(block.pending_targets(), vec![RetuneTarget::Immediate]);

        let tags = run_batch(&mut block, 300, 100, &TagStore::new());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].offset, 300);
        assert_eq!(tags[0].key, "set_freq");
        assert_eq!(tags[0].value, TagValue::Float(-5e3));

        let msgs = block.drain_freq_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].key(), "freq");
        assert_eq!(msgs[0].as_float(), Some(-5e3));
    }

    #[test]
    fn test_timed_command_lands_on_exact_sample() {
        let mut block = scheduler();
        // 10.137 s -> sample 137
        block.handle_command(&command(1e3, Some((10, 0.137))));
        assert!(run_batch(&mut block, 0, 100, &TagStore::new()).is_empty());
        assert_eq!(block.pending(), 1);

        let tags = run_batch(&mut block, 100, 100, &TagStore::new());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].offset, 137);
        assert_eq!(block.pending(), 0);
    }

    #[test]
    fn test_late_command_fires_immediately() {
        let mut block = scheduler();
        block.handle_command(&command(1e3, Some((10, 0.05))));
        let tags = run_batch(&mut block, 400, 100, &TagStore::new());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].offset, 400);
    }

    #[test]
    fn test_command_before_reference_time_fires_immediately() {
        let mut block = scheduler();
        block.handle_command(&command(1e3, Some((9, 0.5))));
        assert_eq!(block.pending_targets(), vec![RetuneTarget::AtSample(-500)]);
        let tags = run_batch(&mut block, 0, 10, &TagStore::new());
        assert_eq!(tags[0].offset, 0);
    }

    #[test]
    fn test_fifo_head_blocks_earlier_targets() {
        let mut block = scheduler();
        block.handle_command(&command(1.0, Some((10, 0.250))));
        block.handle_command(&command(2.0, Some((10, 0.120))));

        // Second target (120) is inside this batch but waits behind 250
        assert!(run_batch(&mut block, 100, 100, &TagStore::new()).is_empty());
        // Head fires on its sample, the overdue one at the batch start
        let tags = run_batch(&mut block, 200, 100, &TagStore::new());
        assert_eq!(tags.len(), 2);
        assert_eq!((tags[0].offset, &tags[0].value), (200, &TagValue::Float(-2.0)));
        assert_eq!((tags[1].offset, &tags[1].value), (250, &TagValue::Float(-1.0)));
        assert_eq!(block.stats().retunes_tagged, 2);
    }

    #[test]
    fn test_queue_overflow_drops_new_commands() {
        let block = scheduler();
        for i in 0..RETUNE_QUEUE_CAPACITY {
            block.handle_command(&command(i as f64, Some((20, 0.0))));
        }
        assert_eq!(block.pending(), 64);
        block.handle_command(&command(999.0, None));
        assert_eq!(block.pending(), 64);
        assert!(block
            .pending_targets()
            .iter()
            .all(|t| *t == RetuneTarget::AtSample(10_000)));

        let stats = block.stats();
        assert_eq!(stats.commands_received, 65);
        assert_eq!(stats.commands_dropped, 1);
        // The freq message still goes out for the dropped command
        assert_eq!(block.drain_freq_messages().len(), 65);
    }

    #[test]
    fn test_undrained_freq_port_keeps_newest() {
        let block = scheduler();
        for i in 0..FREQ_PORT_CAPACITY + 10 {
            block.handle_command(&TagValue::dict([("lo_offset", TagValue::Float(i as f64))]));
        }
        assert_eq!(block.stats().freq_messages_evicted, 10);

        let msgs = block.command_port().drain_freq_messages();
        assert_eq!(msgs.len(), FREQ_PORT_CAPACITY);
        assert_eq!(msgs[0].as_float(), Some(-10.0));
        assert_eq!(block.stats().freq_messages_evicted, 10);
    }

    #[test]
    fn test_time_tag_updates_reference() {
        let mut block = scheduler();
        let mut tags = TagStore::new();
        tags.add(20, "rx_time", TagValue::time_tuple(50, 0.0));
        tags.add(80, "rx_time", TagValue::time_tuple(60, 0.0));
        tags.add(90, "rx_rate", TagValue::Float(RATE));
        run_batch(&mut block, 0, 100, &tags);
        assert_eq!(block.reference(), TimeReference::new(80, 60, 0.0));
        assert_eq!(block.stats().reference_updates, 1);

        // 60.5 s is 500 samples after the sample-80 anchor
        block.handle_command(&command(1.0, Some((60, 0.5))));
        assert_eq!(block.pending_targets(), vec![RetuneTarget::AtSample(580)]);
    }

    #[test]
    fn test_reference_update_precedes_queue_service() {
        let mut block = scheduler();
        block.handle_command(&command(1.0, None));
        let mut tags = TagStore::new();
        tags.add(5, "rx_time", TagValue::time_tuple(99, 0.0));
        let out = run_batch(&mut block, 0, 10, &tags);
        assert_eq!(out.len(), 1);
        assert_eq!(block.reference().offset, 5);
    }

    #[test]
    fn test_far_future_command_waits() {
        let mut block = RetuneScheduler::new(1e6, "lo_offset", TimeSpec::default());
        block.set_ref_time(10, 0, 0.0);
        block.handle_command(&command(1.0, Some((10_000_000_000_000, 0.5))));
        assert_eq!(block.pending_targets(), vec![RetuneTarget::AtSample(i64::MAX)]);

        assert!(run_batch(&mut block, 0, 100, &TagStore::new()).is_empty());
        assert!(run_batch(&mut block, 1 << 40, 100, &TagStore::new()).is_empty());
        assert_eq!(block.pending(), 1);
    }

    #[test]
    fn test_far_past_command_fires_at_batch_start() {
        let mut block = RetuneScheduler::new(1e6, "lo_offset", TimeSpec::default());
        block.set_ref_time(10, 10_000_000_000_000, 0.0);
        block.handle_command(&command(1.0, Some((0, 0.5))));
        assert_eq!(block.pending_targets(), vec![RetuneTarget::AtSample(i64::MIN)]);

        let tags = run_batch(&mut block, 200, 100, &TagStore::new());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].offset, 200);
    }

    #[test]
    fn test_malformed_time_tag_keeps_reference() {
        let mut block = scheduler();
        let mut tags = TagStore::new();
        tags.add(3, "rx_time", TagValue::Float(12.5));
        run_batch(&mut block, 0, 10, &tags);
        assert_eq!(block.reference(), TimeReference::new(0, 10, 0.0));
        assert_eq!(block.stats().invalid_time_tags, 1);
    }

    #[test]
    fn test_malformed_commands_are_discarded() {
        let block = scheduler();
        block.handle_command(&TagValue::Float(1.0));
        block.handle_command(&TagValue::dict([("other", TagValue::Float(1.0))]));
        block.handle_command(&TagValue::dict([("lo_offset", TagValue::String("x".into()))]));
        assert_eq!(block.pending(), 0);
        assert!(block.drain_freq_messages().is_empty());
        assert_eq!(block.stats().commands_rejected, 3);
    }

    #[test]
    fn test_malformed_time_publishes_but_does_not_queue() {
        let block = scheduler();
        block.handle_command(&TagValue::dict([
            ("lo_offset", TagValue::Float(7.0)),
            ("time", TagValue::String("soon".into())),
        ]));
        assert_eq!(block.pending(), 0);
        assert_eq!(block.drain_freq_messages()[0].as_float(), Some(-7.0));
        assert_eq!(block.stats().commands_rejected, 1);
    }

    #[test]
    fn test_integer_offset_and_time() {
        let block = scheduler();
        block.handle_command(&TagValue::dict([
            ("lo_offset", TagValue::Int(-200)),
            ("time", TagValue::Tuple(vec![TagValue::Int(11), TagValue::Int(0)])),
        ]));
        assert_eq!(block.pending_targets(), vec![RetuneTarget::AtSample(1000)]);
        assert_eq!(block.drain_freq_messages()[0].as_float(), Some(200.0));
    }

    #[test]
    fn test_set_dict_key_converts_non_strings() {
        let block = scheduler();
        block.set_dict_key(&TagValue::Int(7));
        assert_eq!(block.dict_key().as_str(), "7");
        block.handle_command(&TagValue::dict([("7", TagValue::Float(1.0))]));
        assert_eq!(block.pending(), 1);

        block.set_tag_key(&TagValue::String("tune".into()));
        assert_eq!(block.tag_key().as_str(), "tune");
    }

    #[test]
    fn test_set_ref_time_and_rate() {
        let block = scheduler();
        block.set_ref_time(1000, 20, 0.0);
        block.set_sample_rate(2000.0);
        block.handle_command(&command(1.0, Some((21, 0.0))));
        assert_eq!(block.pending_targets(), vec![RetuneTarget::AtSample(3000)]);
    }

    #[test]
    fn test_from_config_uses_tag_key() {
        let config = RetuneConfig {
            tag_key: "tune".into(),
            ..Default::default()
        };
        let mut block = RetuneScheduler::from_config(&config);
        block.handle_command(&command(1.0, None));
        let tags = run_batch(&mut block, 0, 4, &TagStore::new());
        assert_eq!(tags[0].key, "tune");
    }
}
