//! Periodic Offset Tagger
//!
//! Pass-through block that stamps the stream with absolute-time markers at a
//! fixed sample interval. Each marker is an `rx_time_offset` tag carrying
//!
//! ```text
//! (UInt secs, Float frac, UInt offset, Float rate)
//! ```
//!
//! where `(secs, frac)` is the reference time advanced by
//! `(offset - ref.offset) / rate`. The very first sample of the stream is
//! always marked, whatever the interval; with `interval == 0` that is the
//! only marker ever produced.
//!
//! The reference is fixed at construction. The tagger never re-synchronizes
//! from upstream `rx_time` tags; it only advances the reference by elapsed
//! sample time, so markers stay on an exact `interval / rate` grid.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::flowgraph::Flowgraph;
//! use r4w_timing::offset_tagger::OffsetTagger;
//! use r4w_timing::time_spec::TimeSpec;
//! use r4w_timing::types::IQSample;
//!
//! let mut fg = Flowgraph::new().with_batch_size(50);
//! fg.connect(OffsetTagger::new(1000.0, 250, TimeSpec::new(100, 0.0)));
//! fg.run(&vec![IQSample::default(); 1000]);
//!
//! let offsets: Vec<u64> = fg.tags().all().iter().map(|t| t.offset).collect();
//! assert_eq!(offsets, vec![0, 250, 500, 750]);
//! ```

use crate::block::{SyncBlock, WorkIo};
use crate::config::OffsetTaggerConfig;
use crate::stream_tags::{keys, TagValue};
use crate::time_spec::{TimeReference, TimeSpec};
use tracing::{debug, info};

/// Periodic absolute-time tagger.
#[derive(Debug, Clone)]
pub struct OffsetTagger {
    sample_rate: f64,
    interval: u64,
    reference: TimeReference,
    tag_key: String,
}

impl OffsetTagger {
    /// Tag every `interval` samples, with `origin` as the time of sample 0.
    pub fn new(sample_rate: f64, interval: u64, origin: TimeSpec) -> Self {
        Self::with_reference(sample_rate, interval, TimeReference::at_origin(origin))
    }

    /// Tag every `interval` samples against an arbitrary anchor.
    pub fn with_reference(sample_rate: f64, interval: u64, reference: TimeReference) -> Self {
        info!(rate = sample_rate, interval, reference = %reference, "offset tagger configured");
        Self {
            sample_rate,
            interval,
            reference,
            tag_key: keys::RX_TIME_OFFSET.to_string(),
        }
    }

    pub fn from_config(config: &OffsetTaggerConfig) -> Self {
        let mut tagger = Self::with_reference(
            config.sample_rate,
            config.interval,
            TimeReference {
                offset: config.reference_offset,
                time: config.origin,
            },
        );
        tagger.tag_key = config.tag_key.as_str().to_string();
        tagger
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn reference(&self) -> TimeReference {
        self.reference
    }

    pub fn tag_key(&self) -> &str {
        &self.tag_key
    }

    /// Marker value for absolute sample `offset`.
    pub fn marker_value(&self, offset: u64) -> TagValue {
        let t = self.reference.time_at_sample(offset, self.sample_rate);
        TagValue::Tuple(vec![
            TagValue::UInt(t.secs),
            TagValue::Float(t.frac),
            TagValue::UInt(offset),
            TagValue::Float(self.sample_rate),
        ])
    }

    fn marker_offsets(&self, start: u64, end: u64) -> Vec<u64> {
        periodic_offsets(start, end, self.interval)
    }
}

/// Absolute offsets in [start, end) on the grid `0, interval, 2*interval, ..`.
/// Sample 0 is always included; `interval == 0` yields only sample 0.
pub(crate) fn periodic_offsets(start: u64, end: u64, interval: u64) -> Vec<u64> {
    let mut offsets = Vec::new();
    if start == 0 && end > 0 {
        offsets.push(0);
    }
    if interval > 0 {
        let mut at = start.div_ceil(interval) * interval;
        if at == 0 {
            at = interval;
        }
        while at < end {
            offsets.push(at);
            at += interval;
        }
    }
    offsets
}

impl SyncBlock for OffsetTagger {
    fn name(&self) -> &str {
        "offset_tagger"
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> usize {
        io.pass_through();
        let n = io.noutput_items();
        let start = io.nitems_read();

        for offset in self.marker_offsets(start, start + n as u64) {
            let value = self.marker_value(offset);
            debug!(offset, %value, "time offset marker");
            io.add_item_tag(offset, &self.tag_key, value);
        }
        n
    }
}
