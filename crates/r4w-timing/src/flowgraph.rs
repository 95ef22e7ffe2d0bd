//! # Flowgraph
//!
//! A linear chain of [`SyncBlock`]s fed from a sample vector. Each batch
//! travels through every block in order; tags follow the samples
//! (all-to-all propagation, offsets unchanged since every block is 1:1).
//!
//! The batch schedule is configurable so tests can exercise carry-over
//! across uneven call boundaries.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::flowgraph::Flowgraph;
//! use r4w_timing::offset_tagger::OffsetTagger;
//! use r4w_timing::time_spec::TimeSpec;
//! use r4w_timing::types::IQSample;
//!
//! let mut fg = Flowgraph::new().with_batch_sizes(vec![7, 64, 13]);
//! fg.connect(OffsetTagger::new(1000.0, 100, TimeSpec::default()));
//!
//! let input = vec![IQSample::new(1.0, 0.0); 1000];
//! let output = fg.run(&input);
//! assert_eq!(output, input);
//! assert_eq!(fg.tags().by_key("rx_time_offset").len(), 10);
//! ```

use crate::block::{SyncBlock, WorkIo};
use crate::stream_tags::TagStore;
use crate::types::{IQBuffer, IQSample};
use tracing::warn;

/// Default batch size in samples.
pub const DEFAULT_BATCH_SIZE: usize = 4096;

/// Samples and tags leaving the last block for one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    pub samples: IQBuffer,
    pub tags: TagStore,
}

/// Linear chain of sync blocks.
pub struct Flowgraph {
    blocks: Vec<Box<dyn SyncBlock>>,
    batch_sizes: Vec<usize>,
    next_batch: usize,
    nitems: u64,
    tags: TagStore,
}

impl Flowgraph {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            batch_sizes: vec![DEFAULT_BATCH_SIZE],
            next_batch: 0,
            nitems: 0,
            tags: TagStore::new(),
        }
    }

    /// Use a fixed batch size.
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        self.with_batch_sizes(vec![batch_size])
    }

    /// Cycle through the given batch sizes. Zero entries are ignored.
    pub fn with_batch_sizes(mut self, sizes: Vec<usize>) -> Self {
        let sizes: Vec<usize> = sizes.into_iter().filter(|&n| n > 0).collect();
        self.batch_sizes = if sizes.is_empty() {
            vec![DEFAULT_BATCH_SIZE]
        } else {
            sizes
        };
        self
    }

    /// Append a block to the end of the chain.
    pub fn connect(&mut self, block: impl SyncBlock + 'static) -> &mut Self {
        self.blocks.push(Box::new(block));
        self
    }

    /// Number of blocks in the chain.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Absolute index of the next sample to be processed.
    pub fn nitems(&self) -> u64 {
        self.nitems
    }

    /// Every tag that has left the last block so far.
    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    /// Hand over the accumulated output tags, leaving the store empty.
    /// Long-running graphs call this periodically to bound memory.
    pub fn take_tags(&mut self) -> TagStore {
        std::mem::take(&mut self.tags)
    }

    /// Push one batch through the chain.
    pub fn process_batch(&mut self, input: &[IQSample]) -> BatchOutput {
        let start = self.nitems;
        let mut samples = input.to_vec();
        let mut tags = TagStore::new();

        for block in &mut self.blocks {
            let mut output = vec![IQSample::default(); samples.len()];
            let mut out_tags = TagStore::new();
            out_tags.merge(&tags);

            let name = block.name().to_string();
            let produced = {
                let mut io = WorkIo::new(&samples, &mut output, start, &tags, &mut out_tags, &name);
                block.work(&mut io)
            };
            if produced != samples.len() {
                warn!(
                    block = %name,
                    produced,
                    expected = samples.len(),
                    "sync block produced unexpected item count"
                );
            }

            samples = output;
            tags = out_tags;
        }

        self.nitems += input.len() as u64;
        self.tags.merge(&tags);
        BatchOutput { samples, tags }
    }

    /// Run the whole input through the chain using the batch schedule.
    pub fn run(&mut self, input: &[IQSample]) -> IQBuffer {
        let mut output = Vec::with_capacity(input.len());
        let mut pos = 0;
        while pos < input.len() {
            let size = self.batch_sizes[self.next_batch % self.batch_sizes.len()];
            self.next_batch += 1;
            let end = (pos + size).min(input.len());
            let batch = self.process_batch(&input[pos..end]);
            output.extend_from_slice(&batch.samples);
            pos = end;
        }
        output
    }
}

impl Default for Flowgraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Flowgraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flowgraph")
            .field(
                "blocks",
                &self.blocks.iter().map(|b| b.name().to_string()).collect::<Vec<_>>(),
            )
            .field("batch_sizes", &self.batch_sizes)
            .field("nitems", &self.nitems)
            .field("tags", &self.tags.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_tags::TagValue;

    /// Tags the first sample of every batch it sees.
    struct BatchMarker;

    impl SyncBlock for BatchMarker {
        fn name(&self) -> &str {
            "batch_marker"
        }

        fn work(&mut self, io: &mut WorkIo<'_>) -> usize {
            io.pass_through();
            let at = io.nitems_read();
            io.add_item_tag(at, "batch", TagValue::UInt(io.noutput_items() as u64));
            io.noutput_items()
        }
    }

    /// Counts tags it sees on its input.
    struct TagCounter {
        seen: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl SyncBlock for TagCounter {
        fn name(&self) -> &str {
            "tag_counter"
        }

        fn work(&mut self, io: &mut WorkIo<'_>) -> usize {
            io.pass_through();
            let n = io.noutput_items();
            let seen = io.tags_in_window(0, n, "batch").len();
            self.seen
                .fetch_add(seen, std::sync::atomic::Ordering::SeqCst);
            n
        }
    }

    #[test]
    fn test_batch_schedule_and_offsets() {
        let mut fg = Flowgraph::new().with_batch_sizes(vec![3, 5]);
        fg.connect(BatchMarker);
        let input: Vec<IQSample> = (0..20).map(|i| IQSample::new(i as f64, 0.0)).collect();
        let output = fg.run(&input);

        assert_eq!(output, input);
        assert_eq!(fg.nitems(), 20);
        let offsets: Vec<u64> = fg.tags().all().iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 3, 8, 11, 16, 19]);
    }

    #[test]
    fn test_tags_propagate_downstream() {
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut fg = Flowgraph::new().with_batch_size(10);
        fg.connect(BatchMarker).connect(TagCounter { seen: seen.clone() });
        assert_eq!(fg.num_blocks(), 2);

        fg.run(&vec![IQSample::default(); 35]);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert_eq!(fg.tags().len(), 4);
    }

    #[test]
    fn test_take_tags_drains_accumulated() {
        let mut fg = Flowgraph::new().with_batch_size(10);
        fg.connect(BatchMarker);
        fg.run(&vec![IQSample::default(); 25]);

        let taken = fg.take_tags();
        assert_eq!(taken.len(), 3);
        assert!(fg.tags().is_empty());

        fg.run(&vec![IQSample::default(); 10]);
        let offsets: Vec<u64> = fg.tags().all().iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![25]);
    }

    #[test]
    fn test_zero_batch_sizes_fall_back() {
        let mut fg = Flowgraph::new().with_batch_sizes(vec![0]);
        fg.connect(BatchMarker);
        fg.run(&vec![IQSample::default(); 10]);
        assert_eq!(fg.tags().len(), 1);
    }
}
