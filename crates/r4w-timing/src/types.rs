//! Core types for timed stream tagging
//!
//! Sample aliases shared by every block in this crate and the error taxonomy
//! used by the tagging and scheduling paths.
//!
//! ## Failure Policy
//!
//! None of these errors ever stop the sample stream. Blocks catch them at the
//! boundary where they occur, log them through `tracing`, and carry on:
//!
//! | Error                 | Raised by                      | Recovery                        |
//! |-----------------------|--------------------------------|---------------------------------|
//! | `ConfigurationType`   | key coercion in `config`       | auto-convert, warn              |
//! | `CommandParse`        | retune / interrupt commands    | drop the command, warn          |
//! | `TagValueParse`       | `rx_time` reference tags       | keep previous reference, warn   |
//! | `QueueOverflow`       | `RetuneQueue::push`            | drop the new command silently   |

use num_complex::Complex64;

/// A single I/Q sample point
pub type IQSample = Complex64;

/// A buffer of I/Q samples
pub type IQBuffer = Vec<IQSample>;

/// Result type for timing operations
pub type TimingResult<T> = Result<T, TimingError>;

/// Errors that can occur while tagging or scheduling
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimingError {
    #[error("{field} should be a symbol, got {found}; converted automatically")]
    ConfigurationType { field: String, found: String },

    #[error("Malformed command: {0}")]
    CommandParse(String),

    #[error("Invalid time tag value: {0}")]
    TagValueParse(String),

    #[error("Pending queue full ({capacity} entries)")]
    QueueOverflow { capacity: usize },

    #[error("Failed to read config: {0}")]
    ConfigRead(String),

    #[error("Failed to parse config: {0}")]
    ConfigParse(String),

    #[error("Invalid config: {0}")]
    ConfigInvalid(String),
}
