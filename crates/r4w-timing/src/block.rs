//! # Sync Block Interface
//!
//! Minimal host contract for 1:1 streaming blocks. The host calls
//! [`SyncBlock::work`] with equally sized input/output batches and a
//! [`WorkIo`] context exposing:
//!
//! - the absolute index of the first input sample (`nitems_read`),
//! - the tags already present on the input window,
//! - a sink for tags the block attaches to its output.
//!
//! Offsets are always absolute (stream-wide), never batch-relative, so a
//! block can reason about positions across call boundaries.

use crate::stream_tags::{StreamTag, TagStore, TagValue};
use crate::types::IQSample;

/// A streaming block producing exactly one output sample per input sample.
pub trait SyncBlock: Send {
    /// Block name, used for tag source attribution and logging.
    fn name(&self) -> &str;

    /// Process one batch. Returns the number of output items produced.
    fn work(&mut self, io: &mut WorkIo<'_>) -> usize;
}

/// Per-invocation view of one batch.
pub struct WorkIo<'a> {
    input: &'a [IQSample],
    output: &'a mut [IQSample],
    nitems_read: u64,
    input_tags: &'a TagStore,
    output_tags: &'a mut TagStore,
    source: &'a str,
}

impl<'a> WorkIo<'a> {
    /// `input` and `output` must have the same length.
    pub fn new(
        input: &'a [IQSample],
        output: &'a mut [IQSample],
        nitems_read: u64,
        input_tags: &'a TagStore,
        output_tags: &'a mut TagStore,
        source: &'a str,
    ) -> Self {
        debug_assert_eq!(input.len(), output.len());
        Self {
            input,
            output,
            nitems_read,
            input_tags,
            output_tags,
            source,
        }
    }

    /// Input samples of this batch.
    pub fn input(&self) -> &[IQSample] {
        self.input
    }

    /// Output buffer of this batch.
    pub fn output(&mut self) -> &mut [IQSample] {
        self.output
    }

    /// Copy input to output unchanged.
    pub fn pass_through(&mut self) {
        self.output.copy_from_slice(self.input);
    }

    /// Absolute index of the first sample in this batch.
    pub fn nitems_read(&self) -> u64 {
        self.nitems_read
    }

    /// Number of items in this batch.
    pub fn noutput_items(&self) -> usize {
        self.output.len()
    }

    /// Input tags with `key` in the batch-relative window [rel_start, rel_end),
    /// ascending by absolute offset.
    pub fn tags_in_window(&self, rel_start: usize, rel_end: usize, key: &str) -> Vec<&StreamTag> {
        let start = self.nitems_read + rel_start as u64;
        let end = self.nitems_read + rel_end as u64;
        self.input_tags.range_key(start, end, key)
    }

    /// Attach a tag at an absolute output offset.
    pub fn add_item_tag(&mut self, offset: u64, key: &str, value: TagValue) {
        self.output_tags
            .add_tag(StreamTag::with_source(offset, key, value, self.source));
    }
}
