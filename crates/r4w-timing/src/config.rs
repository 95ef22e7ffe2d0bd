//! # Configuration System
//!
//! YAML configuration for the timing blocks. Every section is optional and
//! falls back to defaults, so a file only needs the fields it changes.
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `R4W_TIMING_CONFIG` environment variable
//! 2. `./r4w-timing.yaml` (current directory)
//!
//! ## Example Configuration
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: compact
//!
//! uhd_tags:
//!   center_freq: 1090e6
//!   sample_rate: 250e3
//!   origin: { secs: 0, frac: 0.98765 }
//!
//! offset_tagger:
//!   sample_rate: 250e3
//!   interval: 173
//!
//! retune:
//!   sample_rate: 250e3
//!   dict_key: lo_offset
//!   origin: { secs: 1500000000, frac: 0.0 }
//! ```
//!
//! ## Key Names
//!
//! Keys such as `dict_key` are symbols. A key written as another YAML scalar
//! (`dict_key: 42`) is accepted and converted to its string form with a
//! warning rather than rejected.

use crate::logging::LogConfig;
use crate::stream_tags::{keys, TagValue};
use crate::time_spec::TimeSpec;
use crate::types::{TimingError, TimingResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A dictionary or tag key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyName(String);

impl KeyName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Coerce an arbitrary value into a key. Strings are taken as-is; any
    /// other representation is converted to its display form and reported
    /// as a `ConfigurationType` warning.
    pub fn coerce(field: &str, value: &TagValue) -> Self {
        match value {
            TagValue::String(s) => Self(s.clone()),
            other => {
                let name = match other {
                    TagValue::Float(f) => f.to_string(),
                    _ => other.to_string(),
                };
                let err = TimingError::ConfigurationType {
                    field: field.to_string(),
                    found: other.type_name().to_string(),
                };
                warn!(%err, key = %name);
                Self(name)
            }
        }
    }

    fn from_yaml(field: &str, value: &serde_yaml::Value) -> Self {
        use serde_yaml::Value;
        let (name, found) = match value {
            Value::String(s) => return Self(s.clone()),
            Value::Number(n) => (n.to_string(), "number"),
            Value::Bool(b) => (b.to_string(), "bool"),
            Value::Null => ("~".to_string(), "null"),
            Value::Sequence(_) => (yaml_inline(value), "sequence"),
            Value::Mapping(_) => (yaml_inline(value), "mapping"),
            Value::Tagged(t) => (yaml_inline(&t.value), "tagged"),
        };
        let err = TimingError::ConfigurationType {
            field: field.to_string(),
            found: found.to_string(),
        };
        warn!(%err, key = %name);
        Self(name)
    }
}

fn yaml_inline(value: &serde_yaml::Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().replace('\n', " "))
        .unwrap_or_default()
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for KeyName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for KeyName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for KeyName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        Ok(Self::from_yaml("key", &value))
    }
}

/// UHD stream-start tag emulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UhdTagConfig {
    /// Center frequency in Hz (tag metadata only)
    pub center_freq: f64,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Time of the first sample
    pub origin: TimeSpec,
}

impl Default for UhdTagConfig {
    fn default() -> Self {
        Self {
            center_freq: 1090e6,
            sample_rate: 250e3,
            origin: TimeSpec::default(),
        }
    }
}

/// Periodic offset tagger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetTaggerConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Marker interval in samples (0 = first sample only)
    pub interval: u64,
    /// Time at `reference_offset`
    pub origin: TimeSpec,
    /// Sample at which `origin` is valid
    pub reference_offset: u64,
    /// Output tag key
    pub tag_key: KeyName,
}

impl Default for OffsetTaggerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 250e3,
            interval: 0,
            origin: TimeSpec::default(),
            reference_offset: 0,
            tag_key: KeyName::from(keys::RX_TIME_OFFSET),
        }
    }
}

/// Timed retune scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetuneConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Frequency-offset key looked up in incoming commands
    pub dict_key: KeyName,
    /// Initial reference time, valid at sample 0
    pub origin: TimeSpec,
    /// Output tag key; the downstream tuner listens for this
    pub tag_key: KeyName,
}

impl Default for RetuneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 250e3,
            dict_key: KeyName::from("lo_offset"),
            origin: TimeSpec::default(),
            tag_key: KeyName::from(keys::SET_FREQ),
        }
    }
}

/// Interrupt emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Drop requests whose time has already passed instead of firing them now
    pub drop_late: bool,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            sample_rate: 250e3,
            drop_late: false,
        }
    }
}

/// System time tagger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemTimeConfig {
    /// Tag interval in samples (0 = first sample only)
    pub interval: u64,
}

impl Default for SystemTimeConfig {
    fn default() -> Self {
        Self { interval: 1000 }
    }
}

/// System time difference block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemTimeDiffConfig {
    /// Pass samples through (false = zero-filled output)
    pub output_data: bool,
    /// Re-stamp `system_time` tags with the current host time
    pub update_time: bool,
    /// Attach `system_time_diff` tags
    pub output_diff: bool,
}

impl Default for SystemTimeDiffConfig {
    fn default() -> Self {
        Self {
            output_data: true,
            update_time: false,
            output_diff: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub logging: LogConfig,
    pub uhd_tags: UhdTagConfig,
    pub offset_tagger: OffsetTaggerConfig,
    pub retune: RetuneConfig,
    pub interrupt: InterruptConfig,
    pub system_time: SystemTimeConfig,
    pub system_time_diff: SystemTimeDiffConfig,
}

impl TimingConfig {
    /// Load configuration from the search path, or defaults if none is found.
    pub fn load() -> TimingResult<Self> {
        if let Ok(path) = std::env::var("R4W_TIMING_CONFIG") {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }

        for path in Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> TimingResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TimingError::ConfigRead(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> TimingResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TimingError::ConfigParse(e.to_string()))
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> TimingResult<String> {
        serde_yaml::to_string(self).map_err(|e| TimingError::ConfigParse(e.to_string()))
    }

    pub fn config_search_paths() -> Vec<PathBuf> {
        vec![PathBuf::from("./r4w-timing.yaml")]
    }

    /// Validate the configuration.
    pub fn validate(&self) -> TimingResult<()> {
        let rates = [
            ("uhd_tags.sample_rate", self.uhd_tags.sample_rate),
            ("offset_tagger.sample_rate", self.offset_tagger.sample_rate),
            ("retune.sample_rate", self.retune.sample_rate),
            ("interrupt.sample_rate", self.interrupt.sample_rate),
        ];
        for (field, rate) in rates {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(TimingError::ConfigInvalid(format!(
                    "{field} must be positive, got {rate}"
                )));
            }
        }

        let origins = [
            ("uhd_tags.origin", self.uhd_tags.origin),
            ("offset_tagger.origin", self.offset_tagger.origin),
            ("retune.origin", self.retune.origin),
        ];
        for (field, origin) in origins {
            if !(0.0..1.0).contains(&origin.frac) {
                return Err(TimingError::ConfigInvalid(format!(
                    "{field}.frac must be in [0, 1), got {}",
                    origin.frac
                )));
            }
        }

        if self.retune.dict_key.as_str().is_empty() {
            return Err(TimingError::ConfigInvalid(
                "retune.dict_key must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
