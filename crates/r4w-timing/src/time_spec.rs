//! # Time / Sample Offset Arithmetic
//!
//! Absolute times are carried the way UHD reports them: whole seconds plus a
//! fractional part. A [`TimeReference`] anchors such a time to a sample
//! offset in the stream, which is enough to move between the two domains:
//!
//! ```text
//!   time ──────────────●───────────────────────▶
//!                 (secs, frac)
//!                      │  anchor
//!   samples ───────────●───────────────────────▶
//!                   offset      offset + (t - t_ref) * rate
//! ```
//!
//! Two directions are needed and they round differently:
//!
//! - **sample → time** ([`TimeReference::time_at_sample`]) is used by the
//!   periodic tagger and must be exact enough that successive markers differ
//!   by `interval / rate` to double precision.
//! - **time → sample** ([`TimeReference::sample_at_time`]) truncates each of
//!   the whole-second and fractional contributions toward zero separately.
//!   Retune tags land on exactly the sample this produces.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::time_spec::{TimeReference, TimeSpec};
//!
//! let reference = TimeReference::new(1000, 10, 0.5);
//! let t = TimeSpec::new(11, 0.0);
//! assert_eq!(reference.sample_at_time(t, 1000.0), 1500);
//!
//! let back = reference.time_at_sample(1500, 1000.0);
//! assert_eq!(back.secs, 11);
//! ```

use crate::stream_tags::TagValue;
use crate::types::{TimingError, TimingResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute time as whole seconds plus fractional seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSpec {
    /// Whole seconds
    pub secs: u64,
    /// Fractional seconds, [0, 1) once normalized
    pub frac: f64,
}

impl TimeSpec {
    /// Create a time spec without normalizing.
    pub fn new(secs: u64, frac: f64) -> Self {
        Self { secs, frac }
    }

    /// Create from real seconds.
    pub fn from_secs_f64(seconds: f64) -> Self {
        let whole = seconds.floor();
        Self {
            secs: whole as u64,
            frac: seconds - whole,
        }
    }

    /// Total seconds as a float. Loses sub-nanosecond precision for large `secs`.
    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.frac
    }

    /// Carry whole seconds out of `frac` so that `frac` lands in [0, 1).
    pub fn normalized(self) -> Self {
        let carry = self.frac.floor();
        let secs = if carry >= 0.0 {
            self.secs.saturating_add(carry as u64)
        } else {
            self.secs.saturating_sub((-carry) as u64)
        };
        Self {
            secs,
            frac: self.frac - carry,
        }
    }

    /// Parse the `(UInt secs, real frac)` tuple used by `rx_time` tags and
    /// command `time` entries. Extra tuple elements are ignored.
    pub fn from_tag_value(value: &TagValue) -> TimingResult<Self> {
        let secs = value
            .tuple_ref(0)
            .ok_or_else(|| TimingError::TagValueParse(format!("expected (secs, frac), got {value}")))?
            .as_uint()
            .ok_or_else(|| {
                TimingError::TagValueParse(format!("whole seconds must be unsigned, got {value}"))
            })?;
        let frac = value
            .tuple_ref(1)
            .ok_or_else(|| TimingError::TagValueParse(format!("missing fractional seconds in {value}")))?
            .as_float()
            .ok_or_else(|| {
                TimingError::TagValueParse(format!("fractional seconds must be real, got {value}"))
            })?;
        Ok(Self { secs, frac })
    }

    /// Render as the `(UInt secs, Float frac)` tuple.
    pub fn to_tag_value(&self) -> TagValue {
        TagValue::time_tuple(self.secs, self.frac)
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:.9}s", self.secs, self.frac)
    }
}

/// Absolute time anchored to a stream sample offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeReference {
    /// Sample offset at which `time` was valid
    pub offset: u64,
    /// Absolute time at `offset`
    pub time: TimeSpec,
}

impl TimeReference {
    pub fn new(offset: u64, secs: u64, frac: f64) -> Self {
        Self {
            offset,
            time: TimeSpec::new(secs, frac),
        }
    }

    /// Anchor `time` to sample 0.
    pub fn at_origin(time: TimeSpec) -> Self {
        Self { offset: 0, time }
    }

    /// Absolute time of `sample`, normalized.
    ///
    /// The whole-second part of the elapsed time is split off before adding
    /// so the fractional field keeps full precision.
    pub fn time_at_sample(&self, sample: u64, sample_rate: f64) -> TimeSpec {
        let delta = sample as i128 - self.offset as i128;
        let elapsed = delta as f64 / sample_rate;
        let whole = elapsed.floor();
        let secs = if whole >= 0.0 {
            self.time.secs.saturating_add(whole as u64)
        } else {
            self.time.secs.saturating_sub((-whole) as u64)
        };
        TimeSpec::new(secs, self.time.frac + (elapsed - whole)).normalized()
    }

    /// Sample index at which `time` occurs.
    ///
    /// Whole-second and fractional differences are each scaled by the rate and
    /// truncated toward zero before summing. The result may be negative or lie
    /// behind the current read position; it saturates at the `i64` bounds.
    pub fn sample_at_time(&self, time: TimeSpec, sample_rate: f64) -> i64 {
        let secs = (time.secs as i128 - self.time.secs as i128) as f64;
        let frac = time.frac - self.time.frac;
        let sample = (secs * sample_rate) as i128
            + (frac * sample_rate) as i128
            + self.offset as i128;
        sample.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl fmt::Display for TimeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ sample {}", self.time, self.offset)
    }
}
