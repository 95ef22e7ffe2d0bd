//! UHD Stream-Start Tag Emulator
//!
//! A UHD receive streamer marks the first sample of a stream with
//! `rx_time`, `rx_rate` and `rx_freq`. This pass-through block reproduces
//! those three tags so file or simulated sources can feed blocks that expect
//! a hardware time reference.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::flowgraph::Flowgraph;
//! use r4w_timing::uhd_tags::UhdTagEmulator;
//! use r4w_timing::time_spec::TimeSpec;
//! use r4w_timing::types::IQSample;
//!
//! let mut fg = Flowgraph::new();
//! fg.connect(UhdTagEmulator::new(1090e6, 250e3, TimeSpec::new(0, 0.98765)));
//! fg.run(&vec![IQSample::default(); 100]);
//! assert_eq!(fg.tags().at(0).len(), 3);
//! ```

use crate::block::{SyncBlock, WorkIo};
use crate::config::UhdTagConfig;
use crate::stream_tags::{keys, TagValue};
use crate::time_spec::TimeSpec;
use tracing::debug;

/// Attaches UHD-style `rx_time`/`rx_rate`/`rx_freq` tags to sample 0.
#[derive(Debug, Clone)]
pub struct UhdTagEmulator {
    center_freq: f64,
    sample_rate: f64,
    origin: TimeSpec,
}

impl UhdTagEmulator {
    pub fn new(center_freq: f64, sample_rate: f64, origin: TimeSpec) -> Self {
        Self {
            center_freq,
            sample_rate,
            origin,
        }
    }

    pub fn from_config(config: &UhdTagConfig) -> Self {
        Self::new(config.center_freq, config.sample_rate, config.origin)
    }

    pub fn center_freq(&self) -> f64 {
        self.center_freq
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn origin(&self) -> TimeSpec {
        self.origin
    }
}

impl SyncBlock for UhdTagEmulator {
    fn name(&self) -> &str {
        "uhd_tags"
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> usize {
        io.pass_through();
        let n = io.noutput_items();
        if io.nitems_read() == 0 && n > 0 {
            debug!(origin = %self.origin, rate = self.sample_rate, "tagging stream start");
            io.add_item_tag(0, keys::RX_TIME, self.origin.to_tag_value());
            io.add_item_tag(0, keys::RX_RATE, TagValue::Float(self.sample_rate));
            io.add_item_tag(0, keys::RX_FREQ, TagValue::Float(self.center_freq));
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgraph::Flowgraph;
    use crate::types::IQSample;

    #[test]
    fn test_tags_only_first_sample() {
        let mut fg = Flowgraph::new().with_batch_size(16);
        fg.connect(UhdTagEmulator::new(915e6, 1e6, TimeSpec::new(42, 0.25)));
        let input: Vec<IQSample> = (0..100).map(|i| IQSample::new(i as f64, 1.0)).collect();
        let output = fg.run(&input);

        assert_eq!(output, input);
        assert_eq!(fg.tags().len(), 3);
        let time = fg.tags().by_key("rx_time");
        assert_eq!(time[0].offset, 0);
        assert_eq!(TimeSpec::from_tag_value(&time[0].value).unwrap(), TimeSpec::new(42, 0.25));
        assert_eq!(fg.tags().by_key("rx_rate")[0].value, TagValue::Float(1e6));
        assert_eq!(fg.tags().by_key("rx_freq")[0].value, TagValue::Float(915e6));
    }

    #[test]
    fn test_accessors() {
        let block = UhdTagEmulator::new(1.0, 2.0, TimeSpec::new(3, 0.0));
        assert_eq!(block.center_freq(), 1.0);
        assert_eq!(block.sample_rate(), 2.0);
        assert_eq!(block.origin().secs, 3);
    }
}
