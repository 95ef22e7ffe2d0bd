//! Tag Debug
//!
//! Captures stream tags leaving a flowgraph for inspection, optionally
//! filtered by key, and optionally logging each one as it is captured.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::tag_debug::TagDebug;
//! use r4w_timing::stream_tags::{TagStore, TagValue};
//!
//! let mut debug = TagDebug::new("my_debug");
//! let mut tags = TagStore::new();
//! tags.add(0, "rx_freq", TagValue::Float(1090e6));
//! tags.add(10, "set_freq", TagValue::Float(-5e3));
//!
//! let captured = debug.process(&tags, 0, 20);
//! assert_eq!(captured.len(), 2);
//! assert_eq!(debug.num_tags(), 2);
//! ```

use crate::stream_tags::{StreamTag, TagStore};
use tracing::info;

/// Captures and formats tags for inspection.
#[derive(Debug, Clone)]
pub struct TagDebug {
    name: String,
    /// Optional key filter (None = capture all)
    key_filter: Option<String>,
    /// Log every captured tag
    display: bool,
    collected: Vec<StreamTag>,
}

impl TagDebug {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_filter: None,
            display: false,
            collected: Vec::new(),
        }
    }

    pub fn with_key_filter(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key_filter: Some(key.into()),
            ..Self::new(name)
        }
    }

    /// Enable or disable logging of captured tags.
    pub fn set_display(&mut self, display: bool) {
        self.display = display;
    }

    /// Capture matching tags in range [start, end).
    pub fn process(&mut self, tags: &TagStore, start: u64, end: u64) -> Vec<StreamTag> {
        let matching: Vec<StreamTag> = tags
            .range(start, end)
            .into_iter()
            .filter(|t| match self.key_filter {
                Some(ref filter) => &t.key == filter,
                None => true,
            })
            .cloned()
            .collect();

        if self.display {
            for tag in &matching {
                info!(block = %self.name, "{}", Self::format_tag(tag));
            }
        }
        self.collected.extend(matching.iter().cloned());
        matching
    }

    /// All tags captured so far.
    pub fn current_tags(&self) -> &[StreamTag] {
        &self.collected
    }

    /// Number of tags captured so far.
    pub fn num_tags(&self) -> usize {
        self.collected.len()
    }

    /// Format a single tag for display.
    pub fn format_tag(tag: &StreamTag) -> String {
        format!("[offset={}] {} = {}", tag.offset, tag.key, tag.value)
    }

    pub fn summary(&self) -> String {
        let mut keys: Vec<&str> = self.collected.iter().map(|t| t.key.as_str()).collect();
        keys.sort();
        keys.dedup();
        format!(
            "{}: {} tags captured, keys: [{}]",
            self.name,
            self.collected.len(),
            keys.join(", ")
        )
    }

    pub fn reset(&mut self) {
        self.collected.clear();
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
