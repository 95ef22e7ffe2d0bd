//! # R4W Timing
//!
//! Sample-accurate timing blocks for SDR receive chains: relate stream
//! samples to absolute time and schedule frequency retunes on exact samples.
//!
//! ## Overview
//!
//! Blocks are synchronous (one output sample per input sample) and pass
//! samples through unchanged. They communicate through stream tags attached
//! to absolute sample offsets and through message ports:
//!
//! - **Offset Tagger**: periodic `rx_time_offset` markers `(secs, frac, offset, rate)`
//! - **Retune Scheduler**: turns timed `{lo_offset, time}` commands into `set_freq` tags
//! - **UHD Tags**: emulates the `rx_time`/`rx_rate`/`rx_freq` tags a USRP source emits
//! - **Interrupt Emitter**: publishes `trig` messages when the host clock reaches a stream time
//! - **System Time Tagger**: stamps the host clock reading into the stream
//! - **System Time Diff**: measures host-clock latency of `system_time` stamps
//! - **Tag Debug**: collects and formats tags for inspection
//!
//! ## Signal Flow
//!
//! ```text
//! UhdTagEmulator → OffsetTagger → RetuneScheduler → TagDebug
//!   rx_time          rx_time_offset   set_freq
//!                                        ▲
//!                      command thread ───┘ (RetuneCommandPort)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::{Flowgraph, OffsetTagger, RetuneScheduler, TagDebug, TagValue, TimeSpec, UhdTagEmulator};
//! use r4w_timing::types::IQSample;
//!
//! let origin = TimeSpec::new(1_700_000_000, 0.25);
//! let scheduler = RetuneScheduler::new(250e3, "lo_offset", TimeSpec::default());
//! let commands = scheduler.command_port();
//!
//! let mut fg = Flowgraph::new();
//! fg.connect(UhdTagEmulator::new(1090e6, 250e3, origin))
//!     .connect(OffsetTagger::new(250e3, 1000, origin))
//!     .connect(scheduler);
//!
//! commands.post(&TagValue::dict([("lo_offset", TagValue::Float(10e3))]));
//! fg.run(&vec![IQSample::default(); 5000]);
//!
//! let mut debug = TagDebug::with_key_filter("retunes", "set_freq");
//! let tags = debug.process(fg.tags(), 0, 5000);
//! assert_eq!(tags.len(), 1);
//! assert_eq!(tags[0].offset, 0);
//! ```

pub mod block;
pub mod clock;
pub mod config;
pub mod flowgraph;
pub mod interrupt_emitter;
pub mod logging;
pub mod message_port;
pub mod offset_tagger;
pub mod retune_queue;
pub mod retune_scheduler;
pub mod stream_tags;
pub mod system_time_diff;
pub mod system_time_tagger;
pub mod tag_debug;
pub mod time_spec;
pub mod types;
pub mod uhd_tags;

pub use block::{SyncBlock, WorkIo};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{KeyName, TimingConfig};
pub use flowgraph::Flowgraph;
pub use interrupt_emitter::{InterruptEmitter, InterruptHandle};
pub use message_port::{Message, MessagePort};
pub use offset_tagger::OffsetTagger;
pub use retune_queue::{RetuneQueue, RetuneTarget, RETUNE_QUEUE_CAPACITY};
pub use retune_scheduler::{RetuneCommandPort, RetuneScheduler};
pub use stream_tags::{StreamTag, TagStore, TagValue};
pub use system_time_diff::SystemTimeDiff;
pub use system_time_tagger::SystemTimeTagger;
pub use tag_debug::TagDebug;
pub use time_spec::{TimeReference, TimeSpec};
pub use types::{IQSample, TimingError, TimingResult};
pub use uhd_tags::UhdTagEmulator;
