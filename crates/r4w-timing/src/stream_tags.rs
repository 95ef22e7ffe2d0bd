//! Stream Tags: Metadata Attached to Sample Offsets
//!
//! Carries key-value metadata alongside sample streams. Tags are attached to
//! absolute sample offsets and propagate downstream unchanged through sync
//! blocks. The same [`TagValue`] type is used for asynchronous message
//! payloads, so a command value can be attached to the stream as-is.
//!
//! ## Tag Keys Used by the Timing Blocks
//!
//! | Key              | Value                               | Producer            |
//! |------------------|-------------------------------------|---------------------|
//! | `rx_time`        | Tuple(UInt secs, Float frac)        | receiver / emulator |
//! | `rx_rate`        | Float (Hz)                          | receiver / emulator |
//! | `rx_freq`        | Float (Hz)                          | receiver / emulator |
//! | `rx_time_offset` | Tuple(UInt, Float, UInt, Float)     | `OffsetTagger`      |
//! | `set_freq`       | Float (Hz, negated command offset)  | `RetuneScheduler`   |
//! | `system_time`    | Tuple(UInt secs, Float frac)        | `SystemTimeTagger`  |
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::stream_tags::{TagStore, TagValue};
//!
//! let mut tags = TagStore::new();
//! tags.add(0, "rx_time", TagValue::time_tuple(12, 0.5));
//! tags.add(0, "rx_rate", TagValue::Float(1e6));
//! tags.add(4096, "set_freq", TagValue::Float(-25e3));
//!
//! assert_eq!(tags.range(0, 1).len(), 2);
//! assert_eq!(tags.range_key(0, 8192, "set_freq").len(), 1);
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// Typed metadata attached to a sample offset or carried by a message.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// Signed integer
    Int(i64),
    /// Unsigned integer (whole seconds, sample offsets)
    UInt(u64),
    /// Floating-point value (frequency, fractional seconds, rate)
    Float(f64),
    /// String value
    String(String),
    /// Ordered tuple; a two-element tuple doubles as a pair
    Tuple(Vec<TagValue>),
    /// Associative container, insertion ordered
    Dict(Vec<(String, TagValue)>),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::UInt(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v:.6}"),
            TagValue::String(v) => write!(f, "\"{v}\""),
            TagValue::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            TagValue::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl TagValue {
    /// Build the `(UInt secs, Float frac)` tuple used for absolute times.
    pub fn time_tuple(secs: u64, frac: f64) -> Self {
        TagValue::Tuple(vec![TagValue::UInt(secs), TagValue::Float(frac)])
    }

    /// Build a dict from `(key, value)` pairs.
    pub fn dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, TagValue)>) -> Self {
        TagValue::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            TagValue::Int(_) => "int",
            TagValue::UInt(_) => "uint",
            TagValue::Float(_) => "float",
            TagValue::String(_) => "string",
            TagValue::Tuple(_) => "tuple",
            TagValue::Dict(_) => "dict",
        }
    }

    /// Try to get as signed integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) => Some(*v),
            TagValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as unsigned integer. Negative integers and floats are rejected.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            TagValue::UInt(v) => Some(*v),
            TagValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as float. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            TagValue::Float(v) => Some(*v),
            TagValue::Int(v) => Some(*v as f64),
            TagValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Element `index` of a tuple.
    pub fn tuple_ref(&self, index: usize) -> Option<&TagValue> {
        match self {
            TagValue::Tuple(items) => items.get(index),
            _ => None,
        }
    }

    /// Value stored under `key` in a dict. `None` for missing keys and non-dicts.
    pub fn dict_ref(&self, key: &str) -> Option<&TagValue> {
        match self {
            TagValue::Dict(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Check if this is a dict.
    pub fn is_dict(&self) -> bool {
        matches!(self, TagValue::Dict(_))
    }
}

/// A single stream tag: key-value pair at a sample offset.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTag {
    /// Absolute sample offset where the tag applies.
    pub offset: u64,
    /// Tag key (e.g., "rx_time", "set_freq").
    pub key: String,
    /// Tag value.
    pub value: TagValue,
    /// Block that generated the tag (optional).
    pub source: Option<String>,
}

impl StreamTag {
    /// Create a new stream tag.
    pub fn new(offset: u64, key: impl Into<String>, value: TagValue) -> Self {
        Self {
            offset,
            key: key.into(),
            value,
            source: None,
        }
    }

    /// Create a tag with source attribution.
    pub fn with_source(
        offset: u64,
        key: impl Into<String>,
        value: TagValue,
        source: impl Into<String>,
    ) -> Self {
        Self {
            offset,
            key: key.into(),
            value,
            source: Some(source.into()),
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}: {} = {}", self.offset, self.key, self.value)?;
        if let Some(ref src) = self.source {
            write!(f, " (from {src})")?;
        }
        Ok(())
    }
}

/// Ordered collection of stream tags.
///
/// Tags are kept sorted by offset; tags sharing an offset keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct TagStore {
    tags: BTreeMap<(u64, u64), StreamTag>,
    seq: u64,
}

impl TagStore {
    /// Create an empty tag store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag at the given sample offset.
    pub fn add(&mut self, offset: u64, key: impl Into<String>, value: TagValue) {
        self.add_tag(StreamTag::new(offset, key, value));
    }

    /// Add a pre-built StreamTag.
    pub fn add_tag(&mut self, tag: StreamTag) {
        self.tags.insert((tag.offset, self.seq), tag);
        self.seq += 1;
    }

    /// Get all tags at a specific offset.
    pub fn at(&self, offset: u64) -> Vec<&StreamTag> {
        self.tags
            .range((offset, 0)..=(offset, u64::MAX))
            .map(|(_, tag)| tag)
            .collect()
    }

    /// Get all tags in a range [start, end).
    pub fn range(&self, start: u64, end: u64) -> Vec<&StreamTag> {
        if start >= end {
            return Vec::new();
        }
        self.tags
            .range((start, 0)..(end, 0))
            .map(|(_, tag)| tag)
            .collect()
    }

    /// Get tags with `key` in [start, end), ascending by offset.
    pub fn range_key(&self, start: u64, end: u64, key: &str) -> Vec<&StreamTag> {
        self.range(start, end)
            .into_iter()
            .filter(|tag| tag.key == key)
            .collect()
    }

    /// Get all tags with a specific key.
    pub fn by_key(&self, key: &str) -> Vec<&StreamTag> {
        self.tags.values().filter(|tag| tag.key == key).collect()
    }

    /// Get all tags (sorted by offset).
    pub fn all(&self) -> Vec<&StreamTag> {
        self.tags.values().collect()
    }

    /// Number of tags in the store.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Clear all tags.
    pub fn clear(&mut self) {
        self.tags.clear();
        self.seq = 0;
    }

    /// Merge tags from another store.
    pub fn merge(&mut self, other: &TagStore) {
        for tag in other.all() {
            self.add_tag(tag.clone());
        }
    }
}

/// Well-known tag and message key constants.
pub mod keys {
    /// Absolute reception time (Tuple(UInt secs, Float frac)).
    pub const RX_TIME: &str = "rx_time";
    /// Sample rate in Hz (Float).
    pub const RX_RATE: &str = "rx_rate";
    /// Center frequency in Hz (Float).
    pub const RX_FREQ: &str = "rx_freq";
    /// Periodic time marker (Tuple(UInt secs, Float frac, UInt offset, Float rate)).
    pub const RX_TIME_OFFSET: &str = "rx_time_offset";
    /// Retune request consumed by the downstream tuner (Float).
    pub const SET_FREQ: &str = "set_freq";
    /// Host wall-clock time (Tuple(UInt secs, Float frac)).
    pub const SYSTEM_TIME: &str = "system_time";
    /// Seconds between a `system_time` stamp and its arrival downstream (Float).
    pub const SYSTEM_TIME_DIFF: &str = "system_time_diff";
    /// Target time inside a command dict (Tuple(UInt secs, Float frac)).
    pub const TIME: &str = "time";
    /// Frequency correction message key / port name.
    pub const FREQ: &str = "freq";
}
