//! System Time Tagger
//!
//! Pass-through block that stamps the stream with the host clock reading
//! every `interval` samples, for measuring how far processing lags behind
//! real time. Sample 0 is always stamped; `interval == 0` stamps only
//! sample 0.

use crate::block::{SyncBlock, WorkIo};
use crate::clock::{Clock, SystemClock};
use crate::config::SystemTimeConfig;
use crate::offset_tagger::periodic_offsets;
use crate::stream_tags::keys;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SystemTimeTagger {
    clock: Arc<dyn Clock>,
    interval: u64,
}

impl SystemTimeTagger {
    pub fn new(interval: u64, clock: Arc<dyn Clock>) -> Self {
        info!(interval, "system time tagger configured");
        Self { clock, interval }
    }

    pub fn with_system_clock(interval: u64) -> Self {
        Self::new(interval, Arc::new(SystemClock))
    }

    pub fn from_config(config: &SystemTimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.interval, clock)
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Takes effect from the next batch.
    pub fn set_interval(&mut self, interval: u64) {
        self.interval = interval;
    }
}

impl fmt::Debug for SystemTimeTagger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTimeTagger")
            .field("interval", &self.interval)
            .finish()
    }
}

impl SyncBlock for SystemTimeTagger {
    fn name(&self) -> &str {
        "system_time_tagger"
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> usize {
        io.pass_through();
        let n = io.noutput_items();
        let start = io.nitems_read();

        let offsets = periodic_offsets(start, start + n as u64, self.interval);
        if !offsets.is_empty() {
            let now = self.clock.now_time_spec();
            debug!(count = offsets.len(), time = %now, "system time tags");
            for offset in offsets {
                io.add_item_tag(offset, keys::SYSTEM_TIME, now.to_tag_value());
            }
        }
        n
    }
}
