//! System Time Diff
//!
//! Consumer for the `system_time` tags written by
//! [`SystemTimeTagger`](crate::system_time_tagger::SystemTimeTagger): on every
//! such tag it reads the host clock and measures how long the sample took to
//! travel from the tagger to this block.
//!
//! Three switches shape the output:
//!
//! | Flag          | Effect                                                        |
//! |---------------|---------------------------------------------------------------|
//! | `output_data` | pass samples through; when off the output is zero-filled      |
//! | `update_time` | re-stamp `system_time` at the same offset with the current time |
//! | `output_diff` | attach `system_time_diff = Float(seconds)` at the tag offset  |
//!
//! Every measured difference is also published on the `diff` message port as
//! `Dict{offset: UInt, diff: Float}`. A re-stamped tag is added after the
//! incoming one, so downstream readers taking the last tag at an offset see
//! the fresh time.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::clock::MockClock;
//! use r4w_timing::flowgraph::Flowgraph;
//! use r4w_timing::system_time_diff::SystemTimeDiff;
//! use r4w_timing::system_time_tagger::SystemTimeTagger;
//! use r4w_timing::types::IQSample;
//! use std::sync::Arc;
//!
//! let clock = Arc::new(MockClock::at_ns(3_000_000_000));
//! let mut fg = Flowgraph::new().with_batch_size(100);
//! fg.connect(SystemTimeTagger::new(100, clock.clone()))
//!     .connect(SystemTimeDiff::new(true, false, true, clock));
//! fg.run(&vec![IQSample::default(); 300]);
//!
//! assert_eq!(fg.tags().by_key("system_time_diff").len(), 3);
//! ```

use crate::block::{SyncBlock, WorkIo};
use crate::clock::{Clock, SystemClock};
use crate::config::SystemTimeDiffConfig;
use crate::message_port::{Message, MessagePort};
use crate::stream_tags::{keys, TagValue};
use crate::time_spec::TimeSpec;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output message port and key.
pub const DIFF: &str = "diff";

/// Latency statistics over the tags seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiffStats {
    pub tags_seen: u64,
    pub invalid_tags: u64,
    pub last_diff: Option<f64>,
    pub max_diff: Option<f64>,
}

pub struct SystemTimeDiff {
    clock: Arc<dyn Clock>,
    output_data: bool,
    update_time: bool,
    output_diff: bool,
    diff_port: MessagePort,
    stats: DiffStats,
}

impl SystemTimeDiff {
    pub fn new(output_data: bool, update_time: bool, output_diff: bool, clock: Arc<dyn Clock>) -> Self {
        info!(output_data, update_time, output_diff, "system time diff configured");
        Self {
            clock,
            output_data,
            update_time,
            output_diff,
            diff_port: MessagePort::new(DIFF),
            stats: DiffStats::default(),
        }
    }

    pub fn with_system_clock(output_data: bool, update_time: bool, output_diff: bool) -> Self {
        Self::new(output_data, update_time, output_diff, Arc::new(SystemClock))
    }

    pub fn from_config(config: &SystemTimeDiffConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.output_data, config.update_time, config.output_diff, clock)
    }

    /// Take every `diff` message published so far.
    pub fn drain_diffs(&mut self) -> Vec<Message> {
        self.diff_port.drain()
    }

    pub fn stats(&self) -> DiffStats {
        self.stats
    }
}

impl fmt::Debug for SystemTimeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTimeDiff")
            .field("output_data", &self.output_data)
            .field("update_time", &self.update_time)
            .field("output_diff", &self.output_diff)
            .field("stats", &self.stats)
            .finish()
    }
}

impl SyncBlock for SystemTimeDiff {
    fn name(&self) -> &str {
        "system_time_diff"
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> usize {
        let n = io.noutput_items();
        if self.output_data {
            io.pass_through();
        } else {
            io.output().fill(Default::default());
        }

        let stamped: Vec<(u64, TagValue)> = io
            .tags_in_window(0, n, keys::SYSTEM_TIME)
            .into_iter()
            .map(|tag| (tag.offset, tag.value.clone()))
            .collect();
        if stamped.is_empty() {
            return n;
        }

        let now = self.clock.now_time_spec();
        for (offset, value) in stamped {
            let then = match TimeSpec::from_tag_value(&value) {
                Ok(t) => t,
                Err(err) => {
                    self.stats.invalid_tags += 1;
                    warn!(%err, offset, "ignoring system time tag");
                    continue;
                }
            };
            let diff = (now.secs as f64 - then.secs as f64) + (now.frac - then.frac);
            self.stats.tags_seen += 1;
            self.stats.last_diff = Some(diff);
            self.stats.max_diff = Some(self.stats.max_diff.map_or(diff, |m| m.max(diff)));
            debug!(offset, diff, "system time difference");

            self.diff_port.send(Message::new(
                DIFF,
                TagValue::dict([("offset", TagValue::UInt(offset)), ("diff", TagValue::Float(diff))]),
            ));
            if self.update_time {
                io.add_item_tag(offset, keys::SYSTEM_TIME, now.to_tag_value());
            }
            if self.output_diff {
                io.add_item_tag(offset, keys::SYSTEM_TIME_DIFF, TagValue::Float(diff));
            }
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::stream_tags::TagStore;
    use crate::types::IQSample;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    fn run_batch(block: &mut SystemTimeDiff, start: u64, tags: &TagStore) -> (Vec<IQSample>, TagStore) {
        let input: Vec<IQSample> = (0..10).map(|i| IQSample::new(i as f64, 1.0)).collect();
        let mut output = vec![IQSample::new(9.0, 9.0); 10];
        let mut out_tags = TagStore::new();
        {
            let mut io = WorkIo::new(&input, &mut output, start, tags, &mut out_tags, "test");
            assert_eq!(block.work(&mut io), 10);
        }
        (output, out_tags)
    }

    fn stamped(offset: u64, secs: u64, frac: f64) -> TagStore {
        let mut tags = TagStore::new();
        tags.add(offset, "system_time", TagValue::time_tuple(secs, frac));
        tags
    }

    #[test]
    fn test_diff_tag_and_message() {
        let clock = Arc::new(MockClock::at_ns(10_500_000_000));
        let mut block = SystemTimeDiff::new(true, false, true, clock);
        let (output, tags) = run_batch(&mut block, 100, &stamped(104, 10, 0.25));

        assert_eq!(output[3], IQSample::new(3.0, 1.0));
        let diffs = tags.by_key("system_time_diff");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].offset, 104);
        assert_abs_diff_eq!(diffs[0].value.as_float().unwrap(), 0.25, epsilon = 1e-12);
        assert!(tags.by_key("system_time").is_empty());

        let msgs = block.drain_diffs();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].value().dict_ref("offset"), Some(&TagValue::UInt(104)));
        assert_eq!(block.stats().tags_seen, 1);
    }

    #[test]
    fn test_update_time_restamps() {
        let clock = Arc::new(MockClock::at_ns(20_000_000_000));
        let mut block = SystemTimeDiff::new(true, true, false, clock.clone());
        clock.advance(Duration::from_millis(750));
        let (_, tags) = run_batch(&mut block, 0, &stamped(0, 19, 0.5));

        let restamped = tags.by_key("system_time");
        assert_eq!(restamped.len(), 1);
        assert_eq!(restamped[0].value, TagValue::time_tuple(20, 0.75));
        assert!(tags.by_key("system_time_diff").is_empty());
        assert_abs_diff_eq!(block.stats().last_diff.unwrap(), 1.25, epsilon = 1e-12);
    }

    #[test]
    fn test_output_data_off_zero_fills() {
        let clock = Arc::new(MockClock::at_ns(1_000_000_000));
        let mut block = SystemTimeDiff::new(false, false, false, clock);
        let (output, tags) = run_batch(&mut block, 0, &TagStore::new());
        assert!(output.iter().all(|s| *s == IQSample::default()));
        assert!(tags.is_empty());
        assert_eq!(block.stats(), DiffStats::default());
    }

    #[test]
    fn test_max_diff_and_malformed_tags() {
        let clock = Arc::new(MockClock::at_ns(5_000_000_000));
        let mut block = SystemTimeDiff::new(true, false, false, clock);
        let mut tags = stamped(1, 4, 0.0);
        tags.add(2, "system_time", TagValue::time_tuple(4, 0.5));
        tags.add(3, "system_time", TagValue::Float(4.0));
        run_batch(&mut block, 0, &tags);

        let stats = block.stats();
        assert_eq!(stats.tags_seen, 2);
        assert_eq!(stats.invalid_tags, 1);
        assert_abs_diff_eq!(stats.max_diff.unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.last_diff.unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_from_config_flags() {
        let config = SystemTimeDiffConfig {
            output_data: false,
            update_time: true,
            output_diff: true,
        };
        let clock = Arc::new(MockClock::at_ns(2_000_000_000));
        let mut block = SystemTimeDiff::from_config(&config, clock);
        let (output, tags) = run_batch(&mut block, 0, &stamped(5, 1, 0.0));
        assert_eq!(output[5], IQSample::default());
        assert_eq!(tags.by_key("system_time").len(), 1);
        assert_eq!(tags.by_key("system_time_diff").len(), 1);
    }
}
